use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateParty {
        nickname: String,
        /// Empty string means "pick one for me".
        #[serde(default)]
        avatar: String,
    },
    JoinParty {
        code: String,
        nickname: String,
        #[serde(default)]
        avatar: String,
    },
    ReconnectParty {
        code: String,
        player_id: PlayerId,
    },
    LeaveParty {
        player_id: PlayerId,
    },
    KickPlayer {
        code: String,
        player_id: PlayerId,
    },
    StartRound {
        code: String,
        mode: GameMode,
    },
    SubmitCustomPrompt {
        code: String,
        text_true: String,
        text_decoy: String,
    },
    SubmitAnswer {
        code: String,
        text: String,
    },
    SubmitVote {
        code: String,
        choice: VoteChoice,
    },
    AdvancePhase {
        code: String,
        phase: RoundPhase,
    },
    RevealNext {
        code: String,
    },
    ReturnToLobby {
        code: String,
    },
    GetPartyState {
        code: String,
    },
    GetPrompt {
        round_id: RoundId,
    },
    GetTruePrompt {
        round_id: RoundId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    PartyCreated {
        party: PartySnapshot,
        player: PlayerInfo,
    },
    PartyJoined {
        party: PartySnapshot,
        player: PlayerInfo,
    },
    Reconnected {
        party: PartySnapshot,
        player: PlayerInfo,
    },
    /// Idempotent full-state document; broadcast after every mutation
    /// and available on request.
    PartyState {
        party: PartySnapshot,
    },
    PartyLeft {
        success: bool,
    },
    KickAck {
        player_id: PlayerId,
    },
    /// Broadcast so the kicked client can drop its session.
    PlayerKicked {
        player_id: PlayerId,
    },
    RoundStarted {
        party: PartySnapshot,
    },
    PromptCreationPhase {
        party: PartySnapshot,
        prompt_creator: PlayerInfo,
    },
    PromptCreated {
        party: PartySnapshot,
    },
    PhaseChanged {
        party: PartySnapshot,
    },
    AnswerAccepted,
    AllAnswered,
    VoteAccepted,
    AllVoted,
    /// Clients sync their reveal animation to this wall-clock instant.
    RevealSequenceStarted {
        start_at: String,
        response_count: usize,
    },
    RevealResponseShown {
        index: usize,
    },
    ReturnedToLobby {
        party: PartySnapshot,
    },
    PromptText {
        text: String,
        role: PlayerRole,
    },
    TruePrompt {
        text_true: String,
        text_decoy: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Public player info (no connection handle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub nickname: String,
    pub avatar: String,
    pub is_host: bool,
    pub is_active: bool,
    pub score: u32,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            nickname: p.nickname.clone(),
            avatar: p.avatar.clone(),
            is_host: p.is_host,
            is_active: p.is_active,
            score: p.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInfo {
    pub player_id: PlayerId,
    pub text: String,
}

impl From<&ResponseRecord> for AnswerInfo {
    fn from(r: &ResponseRecord) -> Self {
        Self {
            player_id: r.player_id.clone(),
            text: r.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryInfo {
    pub liar_caught: bool,
    pub win_type: WinType,
    pub scores_delta: HashMap<PlayerId, u32>,
    pub answers: Vec<SummaryAnswer>,
}

impl From<&RoundSummary> for SummaryInfo {
    fn from(s: &RoundSummary) -> Self {
        Self {
            liar_caught: s.liar_caught,
            win_type: s.win_type.clone(),
            scores_delta: s.scores_delta.clone(),
            answers: s.answers.clone(),
        }
    }
}

/// Current-round view, reduced to what the receiving audience may see:
/// answer texts appear from the reveal sequence onward, the liar
/// identity and summary only once the round is in `Results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundInfo {
    pub id: RoundId,
    pub number: u32,
    pub phase: RoundPhase,
    pub prompt_creator_id: Option<PlayerId>,
    /// Who has answered so far, in submission order.
    pub responded: Vec<PlayerId>,
    pub voted: Vec<PlayerId>,
    pub answers: Vec<AnswerInfo>,
    pub reveal_index: usize,
    pub liar_id: Option<PlayerId>,
    pub summary: Option<SummaryInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub id: PartyId,
    pub code: String,
    pub status: PartyStatus,
    pub mode: GameMode,
    pub host_id: Option<PlayerId>,
    pub players: Vec<PlayerInfo>,
    pub current_round: Option<RoundInfo>,
}
