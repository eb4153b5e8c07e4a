use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type PartyId = String;
pub type PlayerId = String;
pub type RoundId = String;
pub type ConnId = String;
pub type PromptId = u32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Lobby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum RoundPhase {
    PromptCreation,
    Answer,
    SequentialReveal,
    Reveal,
    Results,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Liar,
    Truth,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    True,
    Decoy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WinType {
    PerfectLie,
    GroupWin,
    LiarEscaped,
    MissedNoLiar,
}

/// A vote either accuses a specific player or asserts that nobody lied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Accuse(PlayerId),
    NoLiar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub code: String,
    pub status: PartyStatus,
    pub mode: GameMode,
    pub host_id: Option<PlayerId>,
    pub current_round_id: Option<RoundId>,
    /// Catalog prompts already played in this party, in play order.
    pub used_prompt_ids: Vec<PromptId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub party_id: PartyId,
    pub nickname: String,
    pub avatar: String,
    pub is_host: bool,
    pub is_active: bool,
    pub score: u32,
    /// Current WebSocket connection, if any.
    pub conn_id: Option<ConnId>,
    pub joined_at: DateTime<Utc>,
}

/// How the round got its prompt pair. `Pending` only exists while a
/// custom round is waiting for its creator to write the texts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundPrompt {
    Catalog { prompt_id: PromptId },
    Custom { text_true: String, text_decoy: String },
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub party_id: PartyId,
    pub number: u32,
    pub phase: RoundPhase,
    pub liar_id: Option<PlayerId>,
    /// Set only in custom mode: the player who writes this round's prompts.
    pub prompt_creator_id: Option<PlayerId>,
    pub prompt: RoundPrompt,
    /// Position in the one-by-one answer reveal (0-based, next to show).
    pub reveal_index: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One row per (round, player): which prompt variant they saw and
/// whether they are the liar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub round_id: RoundId,
    pub player_id: PlayerId,
    pub role: PlayerRole,
    pub variant: PromptVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub round_id: RoundId,
    pub player_id: PlayerId,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub round_id: RoundId,
    pub voter_id: PlayerId,
    pub choice: VoteChoice,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryAnswer {
    pub player_id: PlayerId,
    /// Empty string if the player never answered.
    pub text: String,
    pub is_liar: bool,
}

/// Immutable record of a finished round. Written exactly once when the
/// round enters `Results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round_id: RoundId,
    pub liar_caught: bool,
    pub win_type: WinType,
    pub scores_delta: std::collections::HashMap<PlayerId, u32>,
    pub answers: Vec<SummaryAnswer>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub category: String,
    pub text_true: String,
    pub text_decoy: String,
    /// 1 (easy, picked often) through 5 (hard, picked rarely).
    pub difficulty: u8,
    pub enabled: bool,
}
