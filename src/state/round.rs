use super::AppState;
use crate::error::GameError;
use crate::protocol::{PartySnapshot, PlayerInfo};
use crate::roles::assign_roles;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};

pub const MIN_PLAYERS: usize = 2;

/// Result of starting a round. `prompt_creator` is set in custom mode.
pub struct StartedRound {
    pub snapshot: PartySnapshot,
    pub prompt_creator: Option<PlayerInfo>,
}

/// Which transition an `advance_phase` command performed.
pub enum PhaseAdvance {
    SequentialRevealEntered {
        start_at: DateTime<Utc>,
        response_count: usize,
    },
    RevealEntered,
    ResultsEntered,
}

impl AppState {
    /// Starts a new round (host only). Classic mode draws a catalog
    /// prompt; custom mode picks a prompt creator by roster rotation and
    /// waits in `PromptCreation` for their texts.
    pub async fn start_round(
        &self,
        code: &str,
        conn_id: &str,
        mode: GameMode,
    ) -> Result<StartedRound, GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.require_active_host(&party_id, conn_id)?;

        // A running round must reach Results before the next one starts.
        if let Some(round) = store.current_round(&party_id) {
            if round.phase != RoundPhase::Results {
                return Err(GameError::InvalidPhase {
                    action: "start a round",
                    phase: round.phase,
                });
            }
        }

        let active = store.active_player_ids(&party_id);
        if active.len() < MIN_PLAYERS {
            return Err(GameError::NeedMorePlayers(MIN_PLAYERS));
        }

        let number = store
            .rounds
            .values()
            .filter(|r| r.party_id == party_id)
            .map(|r| r.number)
            .max()
            .unwrap_or(0)
            + 1;

        let round_id: RoundId = ulid::Ulid::new().to_string();

        let (phase, prompt, creator_id) = match mode {
            GameMode::Classic => {
                let used = store
                    .parties
                    .get(&party_id)
                    .map(|p| p.used_prompt_ids.clone())
                    .unwrap_or_default();
                // The thread-local rng is not Send, so it is built inline
                // and never held across an await.
                let prompt_id = {
                    let catalog = self.catalog.read().await;
                    catalog.select(&mut rand::rng(), &used)?.id
                };
                (
                    RoundPhase::Answer,
                    RoundPrompt::Catalog { prompt_id },
                    None,
                )
            }
            GameMode::Custom => {
                // Rotate creatorship through the join-ordered roster,
                // starting at the host.
                let host_id = store
                    .parties
                    .get(&party_id)
                    .and_then(|p| p.host_id.clone())
                    .ok_or(GameError::HostNotFound)?;
                let host_index = active.iter().position(|id| *id == host_id).unwrap_or(0);
                let creator =
                    active[(host_index + number as usize - 1) % active.len()].clone();
                (RoundPhase::PromptCreation, RoundPrompt::Pending, Some(creator))
            }
        };

        let roles = assign_roles(&mut rand::rng(), &round_id, &active, creator_id.as_ref());

        let round = Round {
            id: round_id.clone(),
            party_id: party_id.clone(),
            number,
            phase,
            liar_id: roles.liar_id,
            prompt_creator_id: creator_id.clone(),
            prompt: prompt.clone(),
            reveal_index: 0,
            started_at: Utc::now(),
            ended_at: None,
        };

        tracing::info!(%code, round = number, ?mode, "round started");

        store.rounds.insert(round_id.clone(), round);
        store.assignments.insert(round_id.clone(), roles.assignments);

        let party = store
            .parties
            .get_mut(&party_id)
            .ok_or(GameError::PartyNotFound)?;
        party.status = PartyStatus::Playing;
        party.mode = mode;
        party.current_round_id = Some(round_id);
        if let RoundPrompt::Catalog { prompt_id } = prompt {
            party.used_prompt_ids.push(prompt_id);
        }

        let prompt_creator = creator_id
            .and_then(|id| store.players.get(&id))
            .map(PlayerInfo::from);

        Ok(StartedRound {
            snapshot: store.snapshot(&party_id)?,
            prompt_creator,
        })
    }

    /// Installs the creator's prompt pair and moves the round to
    /// `Answer`.
    pub async fn submit_custom_prompt(
        &self,
        code: &str,
        conn_id: &str,
        text_true: String,
        text_decoy: String,
    ) -> Result<PartySnapshot, GameError> {
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
        if round.phase != RoundPhase::PromptCreation {
            return Err(GameError::InvalidPhase {
                action: "submit a prompt",
                phase: round.phase,
            });
        }
        if round.prompt_creator_id.as_ref() != Some(&player_id) {
            return Err(GameError::NotPromptCreator);
        }

        let round_id = round.id.clone();
        let round = store
            .rounds
            .get_mut(&round_id)
            .ok_or(GameError::RoundNotFound)?;
        round.prompt = RoundPrompt::Custom {
            text_true,
            text_decoy,
        };
        round.phase = RoundPhase::Answer;

        tracing::info!(%code, "custom prompt installed");
        store.snapshot(&party_id)
    }

    /// Advances the round's phase (host only). A request to leave
    /// `Answer` is routed through the reveal sequence first; the request
    /// out of `Reveal` computes the results before flipping the phase.
    pub async fn advance_phase(
        &self,
        code: &str,
        conn_id: &str,
        target: RoundPhase,
    ) -> Result<(PartySnapshot, PhaseAdvance), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.require_active_host(&party_id, conn_id)?;

        let round = store
            .current_round(&party_id)
            .ok_or(GameError::RoundNotFound)?;
        let round_id = round.id.clone();
        let current = round.phase;

        let event = match (current, target) {
            // The answer phase always flows through the reveal sequence,
            // even when the client asks for Reveal directly.
            (RoundPhase::Answer, RoundPhase::SequentialReveal)
            | (RoundPhase::Answer, RoundPhase::Reveal) => {
                let response_count = store
                    .responses
                    .get(&round_id)
                    .map(Vec::len)
                    .unwrap_or(0);
                let start_at = Utc::now()
                    + Duration::milliseconds(self.config.reveal.start_delay_ms as i64);
                let round = store
                    .rounds
                    .get_mut(&round_id)
                    .ok_or(GameError::RoundNotFound)?;
                round.phase = RoundPhase::SequentialReveal;
                round.reveal_index = 0;
                PhaseAdvance::SequentialRevealEntered {
                    start_at,
                    response_count,
                }
            }
            (RoundPhase::SequentialReveal, RoundPhase::Reveal) => {
                let round = store
                    .rounds
                    .get_mut(&round_id)
                    .ok_or(GameError::RoundNotFound)?;
                round.phase = RoundPhase::Reveal;
                PhaseAdvance::RevealEntered
            }
            (RoundPhase::Reveal, RoundPhase::Results) => {
                store.finish_round(&round_id)?;
                let round = store
                    .rounds
                    .get_mut(&round_id)
                    .ok_or(GameError::RoundNotFound)?;
                round.phase = RoundPhase::Results;
                round.ended_at = Some(Utc::now());
                PhaseAdvance::ResultsEntered
            }
            _ => {
                return Err(GameError::InvalidPhase {
                    action: "advance",
                    phase: current,
                })
            }
        };

        tracing::info!(%code, from = ?current, to = ?target, "phase advanced");
        Ok((store.snapshot(&party_id)?, event))
    }

    /// Shows the next answer in the reveal sequence (host only). Returns
    /// the 0-based index just shown.
    pub async fn reveal_next(
        &self,
        code: &str,
        conn_id: &str,
    ) -> Result<(usize, PartySnapshot), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.require_active_host(&party_id, conn_id)?;

        let round = store
            .current_round(&party_id)
            .ok_or(GameError::RoundNotFound)?;
        if round.phase != RoundPhase::SequentialReveal {
            return Err(GameError::InvalidPhase {
                action: "step the reveal",
                phase: round.phase,
            });
        }
        let round_id = round.id.clone();
        let count = store
            .responses
            .get(&round_id)
            .map(Vec::len)
            .unwrap_or(0);

        let round = store
            .rounds
            .get_mut(&round_id)
            .ok_or(GameError::RoundNotFound)?;
        if round.reveal_index >= count {
            return Err(GameError::InvalidPhase {
                action: "step past the end of the reveal",
                phase: round.phase,
            });
        }
        let shown = round.reveal_index;
        round.reveal_index += 1;

        Ok((shown, store.snapshot(&party_id)?))
    }

    /// Wipes the round history and puts the party back in the lobby
    /// (host only). Player scores survive.
    pub async fn return_to_lobby(
        &self,
        code: &str,
        conn_id: &str,
    ) -> Result<PartySnapshot, GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.require_active_host(&party_id, conn_id)?;

        store.delete_party_rounds(&party_id);
        if let Some(party) = store.parties.get_mut(&party_id) {
            party.status = PartyStatus::Lobby;
        }

        tracing::info!(%code, "party returned to lobby");
        store.snapshot(&party_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn party_of(state: &AppState, n: usize) -> String {
        let (snapshot, _) = state
            .create_party("p0".to_string(), String::new(), "conn-0")
            .await
            .unwrap();
        for i in 1..n {
            state
                .join_party(
                    &snapshot.code,
                    format!("p{i}"),
                    String::new(),
                    &format!("conn-{i}"),
                )
                .await
                .unwrap();
        }
        snapshot.code
    }

    #[tokio::test]
    async fn classic_round_starts_in_answer_phase() {
        let state = AppState::new();
        let code = party_of(&state, 3).await;

        let started = state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();
        assert!(started.prompt_creator.is_none());

        let round = started.snapshot.current_round.unwrap();
        assert_eq!(round.phase, RoundPhase::Answer);
        assert_eq!(round.number, 1);
        assert_eq!(started.snapshot.status, PartyStatus::Playing);

        // The drawn prompt is now reserved for this party.
        let store = state.store.read().await;
        let party = store.parties.values().next().unwrap();
        assert_eq!(party.used_prompt_ids.len(), 1);
    }

    #[tokio::test]
    async fn start_round_runs_on_a_spawned_task() {
        // tokio::spawn requires a Send future, which the command futures
        // must satisfy for the connection tasks.
        let state = std::sync::Arc::new(AppState::new());
        let code = party_of(&state, 2).await;

        let handle = tokio::spawn({
            let state = state.clone();
            async move { state.start_round(&code, "conn-0", GameMode::Classic).await }
        });
        let started = handle.await.unwrap().unwrap();
        assert_eq!(
            started.snapshot.current_round.unwrap().phase,
            RoundPhase::Answer
        );
    }

    #[tokio::test]
    async fn start_round_requires_host() {
        let state = AppState::new();
        let code = party_of(&state, 3).await;

        let result = state.start_round(&code, "conn-1", GameMode::Classic).await;
        assert!(matches!(result, Err(GameError::NotHost)));
    }

    #[tokio::test]
    async fn start_round_needs_two_active_players() {
        let state = AppState::new();
        let code = party_of(&state, 1).await;

        let result = state.start_round(&code, "conn-0", GameMode::Classic).await;
        assert!(matches!(result, Err(GameError::NeedMorePlayers(_))));
    }

    #[tokio::test]
    async fn cannot_start_over_a_running_round() {
        let state = AppState::new();
        let code = party_of(&state, 3).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        let result = state.start_round(&code, "conn-0", GameMode::Classic).await;
        assert!(matches!(result, Err(GameError::InvalidPhase { .. })));
    }

    #[tokio::test]
    async fn custom_round_rotates_creator_from_host() {
        let state = AppState::new();
        let code = party_of(&state, 3).await;

        let started = state
            .start_round(&code, "conn-0", GameMode::Custom)
            .await
            .unwrap();
        let creator = started.prompt_creator.unwrap();
        // Round 1: the host writes the prompts.
        assert_eq!(creator.nickname, "p0");
        assert_eq!(
            started.snapshot.current_round.unwrap().phase,
            RoundPhase::PromptCreation
        );
    }

    #[tokio::test]
    async fn only_the_creator_may_submit_the_prompt() {
        let state = AppState::new();
        let code = party_of(&state, 3).await;
        state
            .start_round(&code, "conn-0", GameMode::Custom)
            .await
            .unwrap();

        let result = state
            .submit_custom_prompt(&code, "conn-1", "t".to_string(), "d".to_string())
            .await;
        assert!(matches!(result, Err(GameError::NotPromptCreator)));

        let snapshot = state
            .submit_custom_prompt(&code, "conn-0", "t".to_string(), "d".to_string())
            .await
            .unwrap();
        assert_eq!(
            snapshot.current_round.unwrap().phase,
            RoundPhase::Answer
        );
    }

    #[tokio::test]
    async fn answer_phase_routes_through_sequential_reveal() {
        let state = AppState::new();
        let code = party_of(&state, 2).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        // Asking for Reveal out of Answer lands in SequentialReveal.
        let (snapshot, event) = state
            .advance_phase(&code, "conn-0", RoundPhase::Reveal)
            .await
            .unwrap();
        assert!(matches!(
            event,
            PhaseAdvance::SequentialRevealEntered { .. }
        ));
        assert_eq!(
            snapshot.current_round.unwrap().phase,
            RoundPhase::SequentialReveal
        );

        // A second request completes the move to Reveal.
        let (snapshot, event) = state
            .advance_phase(&code, "conn-0", RoundPhase::Reveal)
            .await
            .unwrap();
        assert!(matches!(event, PhaseAdvance::RevealEntered));
        assert_eq!(snapshot.current_round.unwrap().phase, RoundPhase::Reveal);
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let state = AppState::new();
        let code = party_of(&state, 2).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        let result = state
            .advance_phase(&code, "conn-0", RoundPhase::Results)
            .await;
        assert!(matches!(result, Err(GameError::InvalidPhase { .. })));
    }

    #[tokio::test]
    async fn reveal_steps_are_bounded_by_response_count() {
        let state = AppState::new();
        let code = party_of(&state, 2).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();
        state
            .submit_answer(&code, "conn-0", "a".to_string())
            .await
            .unwrap();
        state
            .advance_phase(&code, "conn-0", RoundPhase::SequentialReveal)
            .await
            .unwrap();

        let (shown, _) = state.reveal_next(&code, "conn-0").await.unwrap();
        assert_eq!(shown, 0);
        let result = state.reveal_next(&code, "conn-0").await;
        assert!(matches!(result, Err(GameError::InvalidPhase { .. })));
    }

    #[tokio::test]
    async fn return_to_lobby_clears_rounds_but_keeps_scores() {
        let state = AppState::new();
        let code = party_of(&state, 2).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        // Give a player some points to verify they survive.
        {
            let mut store = state.store.write().await;
            let id = store
                .players
                .values()
                .next()
                .map(|p| p.id.clone())
                .unwrap();
            store.players.get_mut(&id).unwrap().score = 7;
        }

        let snapshot = state.return_to_lobby(&code, "conn-0").await.unwrap();
        assert_eq!(snapshot.status, PartyStatus::Lobby);
        assert!(snapshot.current_round.is_none());
        assert!(snapshot.players.iter().any(|p| p.score == 7));

        let store = state.store.read().await;
        assert!(store.rounds.is_empty());
    }
}
