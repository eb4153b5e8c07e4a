use crate::types::RoundPhase;

/// Everything a game command can fail with. Each variant maps to a
/// stable wire code via [`GameError::code`]; none are retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("party not found")]
    PartyNotFound,

    #[error("player not found")]
    PlayerNotFound,

    #[error("no active round found")]
    RoundNotFound,

    #[error("assignment not found")]
    AssignmentNotFound,

    #[error("game is already in progress")]
    GameInProgress,

    /// The round is in a phase that doesn't allow this operation.
    #[error("cannot {action} during the {phase:?} phase")]
    InvalidPhase {
        action: &'static str,
        phase: RoundPhase,
    },

    #[error("need at least {0} players to start a round")]
    NeedMorePlayers(usize),

    #[error("only the host can do that")]
    NotHost,

    #[error("player does not belong to this party")]
    NotInParty,

    #[error("host not found")]
    HostNotFound,

    #[error("only the prompt creator can submit the prompt")]
    NotPromptCreator,

    #[error("already submitted for this round")]
    AlreadySubmitted,

    #[error("this connection is already in party {0}")]
    AlreadyConnected(String),

    #[error("nickname is already taken in this party")]
    NicknameTaken,

    #[error("player was removed from the party")]
    PlayerRemoved,

    #[error("no prompts available")]
    NoPromptsAvailable,

    #[error("could not generate a unique party code")]
    CodeGenerationFailed,
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PartyNotFound => "PARTY_NOT_FOUND",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",
            Self::RoundNotFound => "ROUND_NOT_FOUND",
            Self::AssignmentNotFound => "ASSIGNMENT_NOT_FOUND",
            Self::GameInProgress => "GAME_IN_PROGRESS",
            Self::InvalidPhase { .. } => "INVALID_PHASE",
            Self::NeedMorePlayers(_) => "NEED_MORE_PLAYERS",
            Self::NotHost => "NOT_HOST",
            Self::NotInParty => "NOT_IN_PARTY",
            Self::HostNotFound => "HOST_NOT_FOUND",
            Self::NotPromptCreator => "NOT_PROMPT_CREATOR",
            Self::AlreadySubmitted => "ALREADY_SUBMITTED",
            Self::AlreadyConnected(_) => "ALREADY_CONNECTED",
            Self::NicknameTaken => "NICKNAME_TAKEN",
            Self::PlayerRemoved => "PLAYER_REMOVED",
            Self::NoPromptsAvailable => "NO_PROMPTS_AVAILABLE",
            Self::CodeGenerationFailed => "CODE_GENERATION_FAILED",
        }
    }
}
