mod membership;
mod round;
mod score;
mod submission;

pub use membership::{KickOutcome, LeaveOutcome};
pub use round::{PhaseAdvance, StartedRound, MIN_PLAYERS};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::prompts::PromptCatalog;
use crate::protocol::{AnswerInfo, PartySnapshot, PlayerInfo, RoundInfo, SummaryInfo};
use crate::types::*;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// All game tables. Commands take the write lock once and run their
/// whole read-then-write cascade inside it, so every command is atomic
/// and commands against the same party are serialized.
pub struct Store {
    pub parties: HashMap<PartyId, Party>,
    /// Party code -> party id reservation.
    pub codes: HashMap<String, PartyId>,
    pub players: HashMap<PlayerId, Player>,
    pub rounds: HashMap<RoundId, Round>,
    pub assignments: HashMap<RoundId, Vec<Assignment>>,
    pub responses: HashMap<RoundId, Vec<ResponseRecord>>,
    pub votes: HashMap<RoundId, Vec<Vote>>,
    pub summaries: HashMap<RoundId, RoundSummary>,
}

impl Store {
    fn new() -> Self {
        Self {
            parties: HashMap::new(),
            codes: HashMap::new(),
            players: HashMap::new(),
            rounds: HashMap::new(),
            assignments: HashMap::new(),
            responses: HashMap::new(),
            votes: HashMap::new(),
            summaries: HashMap::new(),
        }
    }

    pub fn party_id_by_code(&self, code: &str) -> Option<PartyId> {
        self.codes.get(code).cloned()
    }

    /// Party members in join order (ties broken by id for determinism).
    pub fn members_ordered(&self, party_id: &str) -> Vec<&Player> {
        let mut members: Vec<&Player> = self
            .players
            .values()
            .filter(|p| p.party_id == party_id)
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        members
    }

    pub fn active_player_ids(&self, party_id: &str) -> Vec<PlayerId> {
        self.members_ordered(party_id)
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| p.id.clone())
            .collect()
    }

    /// The active player bound to this connection, if any.
    pub fn player_by_conn(&self, conn_id: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.is_active && p.conn_id.as_deref() == Some(conn_id))
    }

    pub fn current_round(&self, party_id: &str) -> Option<&Round> {
        let party = self.parties.get(party_id)?;
        let round_id = party.current_round_id.as_ref()?;
        self.rounds.get(round_id)
    }

    /// Resolves the connection to an active host of the given party.
    pub(crate) fn require_active_host(
        &self,
        party_id: &str,
        conn_id: &str,
    ) -> Result<&Player, GameError> {
        let player = self
            .player_by_conn(conn_id)
            .ok_or(GameError::HostNotFound)?;
        if player.party_id != party_id {
            return Err(GameError::NotInParty);
        }
        if !player.is_host {
            return Err(GameError::NotHost);
        }
        Ok(player)
    }

    /// Heals the single-host invariant: if several active players carry
    /// the host flag, the earliest-joined one keeps it; if nobody holds
    /// the flag at all, the earliest-joined active player inherits it.
    /// The party's host reference is realigned to the surviving flag.
    /// Returns true if anything changed.
    pub fn ensure_single_host(&mut self, party_id: &str) -> bool {
        let flagged: Vec<PlayerId> = self
            .members_ordered(party_id)
            .into_iter()
            .filter(|p| p.is_host)
            .map(|p| p.id.clone())
            .collect();

        // A hostless party can happen when the host left while everyone
        // else was disconnected; the next active player takes over.
        if flagged.is_empty() {
            let Some(successor) = self.active_player_ids(party_id).first().cloned() else {
                return false;
            };
            if let Some(p) = self.players.get_mut(&successor) {
                p.is_host = true;
            }
            if let Some(party) = self.parties.get_mut(party_id) {
                party.host_id = Some(successor.clone());
            }
            tracing::info!(party_id = %party_id, new_host = %successor, "host restored");
            return true;
        }

        let active_hosts: Vec<PlayerId> = flagged
            .into_iter()
            .filter(|id| {
                self.players
                    .get(id)
                    .map(|p| p.is_active)
                    .unwrap_or(false)
            })
            .collect();

        let Some(keeper) = active_hosts.first().cloned() else {
            return false;
        };

        let mut changed = false;
        for extra in active_hosts.iter().skip(1) {
            if let Some(p) = self.players.get_mut(extra) {
                p.is_host = false;
                changed = true;
                tracing::warn!(player_id = %extra, "demoted duplicate host");
            }
        }

        if let Some(party) = self.parties.get_mut(party_id) {
            if party.host_id.as_ref() != Some(&keeper) {
                party.host_id = Some(keeper);
                changed = true;
            }
        }
        changed
    }

    /// Deletes a round and every row hanging off it. If the party's
    /// current-round pointer referenced it, the pointer falls back to
    /// the latest remaining round.
    pub(crate) fn delete_round_cascade(&mut self, round_id: &str) {
        let Some(round) = self.rounds.remove(round_id) else {
            return;
        };
        self.assignments.remove(round_id);
        self.responses.remove(round_id);
        self.votes.remove(round_id);
        self.summaries.remove(round_id);

        if let Some(party) = self.parties.get_mut(&round.party_id) {
            if party.current_round_id.as_deref() == Some(round_id) {
                party.current_round_id = self
                    .rounds
                    .values()
                    .filter(|r| r.party_id == round.party_id)
                    .max_by_key(|r| r.number)
                    .map(|r| r.id.clone());
            }
        }
    }

    /// Deletes all rounds of a party, pointer included.
    pub(crate) fn delete_party_rounds(&mut self, party_id: &str) {
        let round_ids: Vec<RoundId> = self
            .rounds
            .values()
            .filter(|r| r.party_id == party_id)
            .map(|r| r.id.clone())
            .collect();
        for round_id in round_ids {
            self.delete_round_cascade(&round_id);
        }
        if let Some(party) = self.parties.get_mut(party_id) {
            party.current_round_id = None;
        }
    }

    /// Full-state document for one party.
    pub fn snapshot(&self, party_id: &str) -> Result<PartySnapshot, GameError> {
        let party = self.parties.get(party_id).ok_or(GameError::PartyNotFound)?;
        let players: Vec<PlayerInfo> = self
            .members_ordered(party_id)
            .into_iter()
            .map(PlayerInfo::from)
            .collect();

        let current_round = party
            .current_round_id
            .as_ref()
            .and_then(|round_id| self.rounds.get(round_id))
            .map(|round| self.round_info(round));

        Ok(PartySnapshot {
            id: party.id.clone(),
            code: party.code.clone(),
            status: party.status.clone(),
            mode: party.mode,
            host_id: party.host_id.clone(),
            players,
            current_round,
        })
    }

    fn round_info(&self, round: &Round) -> RoundInfo {
        let responses = self
            .responses
            .get(&round.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let votes = self.votes.get(&round.id).map(Vec::as_slice).unwrap_or(&[]);

        let answers_visible = matches!(
            round.phase,
            RoundPhase::SequentialReveal | RoundPhase::Reveal | RoundPhase::Results
        );
        let answers = if answers_visible {
            responses.iter().map(AnswerInfo::from).collect()
        } else {
            Vec::new()
        };

        let results = round.phase == RoundPhase::Results;
        RoundInfo {
            id: round.id.clone(),
            number: round.number,
            phase: round.phase,
            prompt_creator_id: round.prompt_creator_id.clone(),
            responded: responses.iter().map(|r| r.player_id.clone()).collect(),
            voted: votes.iter().map(|v| v.voter_id.clone()).collect(),
            answers,
            reveal_index: round.reveal_index,
            liar_id: if results { round.liar_id.clone() } else { None },
            summary: if results {
                self.summaries.get(&round.id).map(SummaryInfo::from)
            } else {
                None
            },
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: RwLock<Store>,
    pub catalog: RwLock<PromptCatalog>,
    pub broadcaster: Broadcaster,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            store: RwLock::new(Store::new()),
            catalog: RwLock::new(PromptCatalog::with_seed_corpus()),
            broadcaster: Broadcaster::new(),
            config,
        }
    }

    /// Current party state by code. Heals the host invariant on the way
    /// out, so a snapshot request is also an opportunistic repair.
    pub async fn party_snapshot(&self, code: &str) -> Result<PartySnapshot, GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.ensure_single_host(&party_id);
        store.snapshot(&party_id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
