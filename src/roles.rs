use crate::types::{Assignment, PlayerId, PlayerRole, PromptVariant, RoundId};
use rand::Rng;

/// Chance that a round has no liar at all.
pub const NO_LIAR_CHANCE: f64 = 0.10;

/// Outcome of the per-round role draw.
pub struct RoundRoles {
    pub liar_id: Option<PlayerId>,
    pub assignments: Vec<Assignment>,
}

/// Draws the round's roles: first a Bernoulli trial decides whether the
/// round has a liar, then the liar is picked uniformly among eligible
/// players. The prompt creator (custom mode) is never eligible. A round
/// with no eligible players degrades to a no-liar round.
///
/// Every player gets exactly one assignment row, creator included.
pub fn assign_roles<R: Rng + ?Sized>(
    rng: &mut R,
    round_id: &RoundId,
    players: &[PlayerId],
    creator: Option<&PlayerId>,
) -> RoundRoles {
    let eligible: Vec<&PlayerId> = players.iter().filter(|p| Some(*p) != creator).collect();

    let liar_id = if rng.random::<f64>() < NO_LIAR_CHANCE || eligible.is_empty() {
        None
    } else {
        Some(eligible[rng.random_range(0..eligible.len())].clone())
    };

    let assignments = players
        .iter()
        .map(|player_id| {
            let is_liar = liar_id.as_ref() == Some(player_id);
            Assignment {
                round_id: round_id.clone(),
                player_id: player_id.clone(),
                role: if is_liar {
                    PlayerRole::Liar
                } else {
                    PlayerRole::Truth
                },
                variant: if is_liar {
                    PromptVariant::Decoy
                } else {
                    PromptVariant::True
                },
            }
        })
        .collect();

    RoundRoles {
        liar_id,
        assignments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn players(n: usize) -> Vec<PlayerId> {
        (0..n).map(|i| format!("player-{i}")).collect()
    }

    #[test]
    fn every_player_gets_one_assignment() {
        let mut rng = rand::rng();
        let roster = players(5);
        let roles = assign_roles(&mut rng, &"round-1".to_string(), &roster, None);

        assert_eq!(roles.assignments.len(), 5);
        let liars = roles
            .assignments
            .iter()
            .filter(|a| a.role == PlayerRole::Liar)
            .count();
        match roles.liar_id {
            Some(_) => assert_eq!(liars, 1),
            None => assert_eq!(liars, 0),
        }
    }

    #[test]
    fn liar_gets_the_decoy_variant() {
        let mut rng = rand::rng();
        let roster = players(4);

        // Draw until we land on a round with a liar.
        loop {
            let roles = assign_roles(&mut rng, &"round-1".to_string(), &roster, None);
            if let Some(liar) = &roles.liar_id {
                let a = roles
                    .assignments
                    .iter()
                    .find(|a| &a.player_id == liar)
                    .unwrap();
                assert_eq!(a.role, PlayerRole::Liar);
                assert_eq!(a.variant, PromptVariant::Decoy);
                assert!(roles
                    .assignments
                    .iter()
                    .filter(|a| &a.player_id != liar)
                    .all(|a| a.role == PlayerRole::Truth && a.variant == PromptVariant::True));
                break;
            }
        }
    }

    #[test]
    fn creator_is_never_the_liar() {
        let mut rng = rand::rng();
        let roster = players(4);
        let creator = roster[0].clone();

        for _ in 0..2_000 {
            let roles = assign_roles(&mut rng, &"round-1".to_string(), &roster, Some(&creator));
            assert_ne!(roles.liar_id.as_ref(), Some(&creator));
            // The creator still gets an assignment row, as a truth-teller.
            let a = roles
                .assignments
                .iter()
                .find(|a| a.player_id == creator)
                .unwrap();
            assert_eq!(a.role, PlayerRole::Truth);
        }
    }

    #[test]
    fn no_eligible_players_degrades_to_no_liar() {
        let mut rng = rand::rng();
        let roster = players(1);
        let creator = roster[0].clone();

        for _ in 0..100 {
            let roles = assign_roles(&mut rng, &"round-1".to_string(), &roster, Some(&creator));
            assert!(roles.liar_id.is_none());
        }
    }

    #[test]
    fn role_draw_converges_to_expected_rates() {
        let mut rng = rand::rng();
        let roster = players(5);
        let trials = 100_000u32;

        let mut no_liar = 0u32;
        let mut liar_counts: HashMap<PlayerId, u32> = HashMap::new();

        for _ in 0..trials {
            let roles = assign_roles(&mut rng, &"round-1".to_string(), &roster, None);
            match roles.liar_id {
                None => no_liar += 1,
                Some(liar) => *liar_counts.entry(liar).or_insert(0) += 1,
            }
        }

        // No-liar rate should sit near 10%.
        let rate = f64::from(no_liar) / f64::from(trials);
        assert!(
            (0.09..0.11).contains(&rate),
            "no-liar rate drifted to {rate}"
        );

        // Liar picks should be uniform across the roster. With ~90k liar
        // rounds and 5 players, expected count per player is ~18k with a
        // standard deviation of ~120; a 1000 band is far beyond noise.
        let expected = f64::from(trials - no_liar) / roster.len() as f64;
        for player in &roster {
            let count = f64::from(*liar_counts.get(player).unwrap_or(&0));
            assert!(
                (count - expected).abs() < 1_000.0,
                "liar draw not uniform: {player} got {count}, expected {expected}"
            );
        }
    }
}
