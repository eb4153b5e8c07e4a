use super::AppState;
use crate::error::GameError;
use crate::protocol::PartySnapshot;
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Records a player's answer for the current round. One answer per
    /// player per round; resubmission is rejected. Returns the snapshot
    /// and whether every eligible player has now answered.
    pub async fn submit_answer(
        &self,
        code: &str,
        conn_id: &str,
        text: String,
    ) -> Result<(PartySnapshot, bool), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        let player_id = store
            .player_by_conn(conn_id)
            .filter(|p| p.party_id == party_id)
            .map(|p| p.id.clone())
            .ok_or(GameError::PlayerNotFound)?;

        let round = store
            .current_round(&party_id)
            .ok_or(GameError::RoundNotFound)?;
        if round.phase != RoundPhase::Answer {
            return Err(GameError::InvalidPhase {
                action: "submit an answer",
                phase: round.phase,
            });
        }
        // The prompt creator knows both texts and sits the round out.
        if round.prompt_creator_id.as_ref() == Some(&player_id) {
            return Err(GameError::InvalidPhase {
                action: "answer as the prompt creator",
                phase: round.phase,
            });
        }
        let round_id = round.id.clone();

        let responses = store.responses.entry(round_id.clone()).or_default();
        if responses.iter().any(|r| r.player_id == player_id) {
            return Err(GameError::AlreadySubmitted);
        }
        responses.push(ResponseRecord {
            round_id: round_id.clone(),
            player_id,
            text,
            submitted_at: Utc::now(),
        });

        let all_answered = {
            let count = store.responses.get(&round_id).map(Vec::len).unwrap_or(0);
            count >= store.eligible_count(&party_id, &round_id)
        };
        Ok((store.snapshot(&party_id)?, all_answered))
    }

    /// Records or replaces a player's vote during the `Reveal` phase.
    /// The upsert keeps the original arrival position, so re-voting
    /// doesn't change the tally's tie-break order.
    pub async fn submit_vote(
        &self,
        code: &str,
        conn_id: &str,
        choice: VoteChoice,
    ) -> Result<(PartySnapshot, bool), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        let voter_id = store
            .player_by_conn(conn_id)
            .filter(|p| p.party_id == party_id)
            .map(|p| p.id.clone())
            .ok_or(GameError::PlayerNotFound)?;

        let round = store
            .current_round(&party_id)
            .ok_or(GameError::RoundNotFound)?;
        if round.phase != RoundPhase::Reveal {
            return Err(GameError::InvalidPhase {
                action: "vote",
                phase: round.phase,
            });
        }
        if round.prompt_creator_id.as_ref() == Some(&voter_id) {
            return Err(GameError::InvalidPhase {
                action: "vote as the prompt creator",
                phase: round.phase,
            });
        }
        let round_id = round.id.clone();

        if let VoteChoice::Accuse(accused) = &choice {
            match store.players.get(accused) {
                Some(p) if p.party_id == party_id => {}
                _ => return Err(GameError::PlayerNotFound),
            }
        }

        let votes = store.votes.entry(round_id.clone()).or_default();
        match votes.iter_mut().find(|v| v.voter_id == voter_id) {
            Some(existing) => {
                existing.choice = choice;
                existing.submitted_at = Utc::now();
            }
            None => votes.push(Vote {
                round_id: round_id.clone(),
                voter_id,
                choice,
                submitted_at: Utc::now(),
            }),
        }

        let all_voted = {
            let count = store.votes.get(&round_id).map(Vec::len).unwrap_or(0);
            count >= store.eligible_count(&party_id, &round_id)
        };
        Ok((store.snapshot(&party_id)?, all_voted))
    }

    /// The prompt text the requesting player should see. During the
    /// answer phase the liar gets the decoy text but is told they are a
    /// truth-teller; from the reveal onward the real role is reported.
    pub async fn prompt_for_player(
        &self,
        round_id: &str,
        conn_id: &str,
    ) -> Result<(String, PlayerRole), GameError> {
        let store = self.store.read().await;
        let round = store.rounds.get(round_id).ok_or(GameError::RoundNotFound)?;
        let player = store
            .player_by_conn(conn_id)
            .ok_or(GameError::PlayerNotFound)?;

        let assignment = store
            .assignments
            .get(round_id)
            .and_then(|rows| rows.iter().find(|a| a.player_id == player.id))
            .ok_or(GameError::AssignmentNotFound)?;

        let (text_true, text_decoy) = self.prompt_texts(round).await?;

        if round.phase == RoundPhase::Answer {
            let text = match assignment.variant {
                PromptVariant::True => text_true,
                PromptVariant::Decoy => text_decoy,
            };
            // The liar must not learn their role yet.
            return Ok((text, PlayerRole::Truth));
        }

        let text = match assignment.variant {
            PromptVariant::True => text_true,
            PromptVariant::Decoy => text_decoy,
        };
        Ok((text, assignment.role))
    }

    /// Both texts, for the results display.
    pub async fn true_prompt(&self, round_id: &str) -> Result<(String, String), GameError> {
        let store = self.store.read().await;
        let round = store.rounds.get(round_id).ok_or(GameError::RoundNotFound)?;
        self.prompt_texts(round).await
    }

    async fn prompt_texts(&self, round: &Round) -> Result<(String, String), GameError> {
        match &round.prompt {
            RoundPrompt::Catalog { prompt_id } => {
                let catalog = self.catalog.read().await;
                let prompt = catalog
                    .get(*prompt_id)
                    .ok_or(GameError::NoPromptsAvailable)?;
                Ok((prompt.text_true.clone(), prompt.text_decoy.clone()))
            }
            RoundPrompt::Custom {
                text_true,
                text_decoy,
            } => Ok((text_true.clone(), text_decoy.clone())),
            RoundPrompt::Pending => Err(GameError::InvalidPhase {
                action: "read the prompt",
                phase: round.phase,
            }),
        }
    }
}

impl super::Store {
    /// How many players must answer/vote this round: active players,
    /// minus the prompt creator in custom mode.
    pub(crate) fn eligible_count(&self, party_id: &str, round_id: &str) -> usize {
        let creator = self
            .rounds
            .get(round_id)
            .and_then(|r| r.prompt_creator_id.clone());
        self.active_player_ids(party_id)
            .into_iter()
            .filter(|id| Some(id) != creator.as_ref())
            .count()
    }
}
