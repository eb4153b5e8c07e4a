use crate::error::GameError;
use crate::types::{Prompt, PromptId};
use rand::Rng;

/// The prompt pool. Selection prefers prompts the party hasn't played
/// yet and favors lower difficulties.
pub struct PromptCatalog {
    prompts: Vec<Prompt>,
}

impl PromptCatalog {
    pub fn new(prompts: Vec<Prompt>) -> Self {
        Self { prompts }
    }

    /// Catalog preloaded with the built-in prompt set.
    pub fn with_seed_corpus() -> Self {
        Self::new(seed_corpus())
    }

    pub fn get(&self, id: PromptId) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Enable or disable a prompt. Returns false if the id is unknown.
    pub fn set_enabled(&mut self, id: PromptId, enabled: bool) -> bool {
        match self.prompts.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Pick a prompt for a new round. Prompts in `used` are excluded
    /// unless every enabled prompt has already been played, in which
    /// case the whole enabled pool is fair game again.
    pub fn select<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        used: &[PromptId],
    ) -> Result<&Prompt, GameError> {
        let enabled: Vec<&Prompt> = self.prompts.iter().filter(|p| p.enabled).collect();
        if enabled.is_empty() {
            return Err(GameError::NoPromptsAvailable);
        }

        let unused: Vec<&Prompt> = enabled
            .iter()
            .copied()
            .filter(|p| !used.contains(&p.id))
            .collect();

        let pool = if unused.is_empty() { &enabled } else { &unused };
        Ok(pick_weighted(rng, pool))
    }
}

/// Difficulty 1 = weight 5, difficulty 5 = weight 1.
fn weight(difficulty: u8) -> f64 {
    f64::from(6 - difficulty.min(5))
}

fn pick_weighted<'a, R: Rng + ?Sized>(rng: &mut R, pool: &[&'a Prompt]) -> &'a Prompt {
    let total: f64 = pool.iter().map(|p| weight(p.difficulty)).sum();
    let mut draw = rng.random::<f64>() * total;

    for prompt in pool {
        draw -= weight(prompt.difficulty);
        if draw <= 0.0 {
            return prompt;
        }
    }

    // Float drift can leave a sliver of the range unclaimed.
    pool[pool.len() - 1]
}

fn seed_corpus() -> Vec<Prompt> {
    const SEED: &[(&str, &str, &str, u8)] = &[
        ("Movies", "Name a Pixar movie.", "Name an animated movie.", 1),
        ("Movies", "Name a Marvel movie.", "Name a superhero movie.", 1),
        ("Movies", "Name a James Bond movie.", "Name a spy movie.", 2),
        (
            "Movies",
            "Name a movie with Tom Hanks.",
            "Name a movie with Tom Cruise.",
            2,
        ),
        (
            "Movies",
            "Name a Quentin Tarantino movie.",
            "Name a violent movie.",
            3,
        ),
        ("Foods", "Name a type of pasta.", "Name an Italian food.", 1),
        ("Foods", "Name a citrus fruit.", "Name a sour fruit.", 1),
        ("Foods", "Name a type of cheese.", "Name a dairy product.", 2),
        ("Foods", "Name a root vegetable.", "Name a vegetable.", 2),
        ("Foods", "Name a type of mushroom.", "Name a fungus.", 3),
        (
            "Cities",
            "Name a city in California.",
            "Name a city in the US.",
            1,
        ),
        (
            "Cities",
            "Name a European capital.",
            "Name a capital city.",
            2,
        ),
        ("Cities", "Name a city in Japan.", "Name a city in Asia.", 2),
        (
            "Cities",
            "Name a city in Australia.",
            "Name a city in Oceania.",
            3,
        ),
        (
            "Cities",
            "Name a city with over 10 million people.",
            "Name a large city.",
            3,
        ),
        ("Animals", "Name a type of bear.", "Name a large mammal.", 1),
        ("Animals", "Name a bird of prey.", "Name a bird.", 2),
        (
            "Animals",
            "Name a marine mammal.",
            "Name an ocean animal.",
            2,
        ),
        (
            "Animals",
            "Name a marsupial.",
            "Name an Australian animal.",
            3,
        ),
        (
            "Animals",
            "Name a venomous snake.",
            "Name a dangerous animal.",
            3,
        ),
        (
            "Sports",
            "Name a sport played with a ball.",
            "Name a team sport.",
            1,
        ),
        (
            "Sports",
            "Name an Olympic sport.",
            "Name a competitive sport.",
            2,
        ),
        (
            "Sports",
            "Name a winter sport.",
            "Name a cold weather sport.",
            2,
        ),
        ("Sports", "Name a combat sport.", "Name a fighting sport.", 3),
        (
            "Sports",
            "Name a sport with a net.",
            "Name a court sport.",
            3,
        ),
        (
            "Technology",
            "Name a programming language.",
            "Name a computer language.",
            2,
        ),
        (
            "Technology",
            "Name a social media platform.",
            "Name a website.",
            1,
        ),
        (
            "Technology",
            "Name a video game console.",
            "Name a gaming device.",
            2,
        ),
        (
            "Technology",
            "Name a smartphone brand.",
            "Name a tech company.",
            2,
        ),
        (
            "Technology",
            "Name a cloud computing service.",
            "Name an internet service.",
            4,
        ),
        (
            "Music",
            "Name a Beatles song.",
            "Name a classic rock song.",
            2,
        ),
        (
            "Music",
            "Name a musical instrument.",
            "Name something that makes music.",
            1,
        ),
        ("Music", "Name a music genre.", "Name a type of music.", 2),
        (
            "Music",
            "Name a Grammy-winning artist.",
            "Name a famous musician.",
            3,
        ),
        (
            "Music",
            "Name a classical composer.",
            "Name a famous composer.",
            4,
        ),
        ("Nature", "Name a type of tree.", "Name a plant.", 1),
        (
            "Nature",
            "Name a natural disaster.",
            "Name something dangerous.",
            2,
        ),
        (
            "Nature",
            "Name a type of rock.",
            "Name something found underground.",
            3,
        ),
        (
            "Nature",
            "Name a constellation.",
            "Name something in the sky.",
            4,
        ),
        (
            "Nature",
            "Name a chemical element.",
            "Name something scientific.",
            4,
        ),
        (
            "Entertainment",
            "Name a TV show on Netflix.",
            "Name a streaming show.",
            2,
        ),
        (
            "Entertainment",
            "Name a Broadway musical.",
            "Name a musical.",
            3,
        ),
        ("Entertainment", "Name a podcast.", "Name an audio show.", 2),
        (
            "Entertainment",
            "Name a YouTube channel.",
            "Name an online channel.",
            3,
        ),
        (
            "Entertainment",
            "Name a comedy special.",
            "Name a comedy show.",
            3,
        ),
    ];

    SEED.iter()
        .enumerate()
        .map(|(i, (category, text_true, text_decoy, difficulty))| Prompt {
            id: (i + 1) as PromptId,
            category: category.to_string(),
            text_true: text_true.to_string(),
            text_decoy: text_decoy.to_string(),
            difficulty: *difficulty,
            enabled: true,
        })
        .collect()
}
