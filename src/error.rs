//! Failures surfaced by the session engine and the sync client.

use alloc::string::String;

/// Why a fleet placement was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum PlacementError {
    #[error("expected {expected} cells, got {got}")]
    WrongSize { expected: usize, got: usize },
    #[error("cell {0} is outside the grid")]
    OutOfBounds(usize),
    #[error("cell {0} is listed twice")]
    Duplicate(usize),
    #[error("fleet already placed")]
    AlreadyPlaced,
}

/// Typed failure of a session request.
///
/// Every variant except [`GameError::NetworkUnavailable`] and
/// [`GameError::Protocol`] is produced by the engine and leaves the session
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum GameError {
    #[error("session is full")]
    SessionFull,
    #[error("session not found")]
    SessionNotFound,
    #[error("invalid placement: {0}")]
    InvalidPlacement(PlacementError),
    #[error("session is not accepting fleets")]
    NotInSetupPhase,
    #[error("not your turn")]
    NotYourTurn,
    #[error("cell already attacked")]
    CellAlreadyAttacked,
    #[error("game is over")]
    GameOver,
    #[error("player is not seated in this session")]
    PlayerNotInSession,
    #[error("coordinates ({row}, {col}) are outside the grid")]
    OutOfBounds { row: usize, col: usize },
    /// Client-observed only: the request never got an answer.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GameError {
    /// Failures worth retrying on the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GameError::NetworkUnavailable(_))
    }

    /// Rejections the client treats as no-ops: the server has spoken and the
    /// current state simply gets re-displayed.
    pub fn is_authoritative_rejection(&self) -> bool {
        matches!(
            self,
            GameError::NotYourTurn | GameError::CellAlreadyAttacked | GameError::GameOver
        )
    }
}

impl From<PlacementError> for GameError {
    fn from(err: PlacementError) -> Self {
        GameError::InvalidPlacement(err)
    }
}
