//! Error types for the Quoridor engine

use thiserror::Error;

use crate::geometry::PlayerId;

/// Result type for engine, session and transport operations
pub type Result<T> = std::result::Result<T, QuoridorError>;

/// Outcome of submitting or probing a single action
pub type ActionResult = std::result::Result<(), Rejection>;

/// Hard failures: bad configuration, broken transport, protocol violations.
///
/// Illegal game actions are not errors in this sense, see [`Rejection`].
#[derive(Debug, Error)]
pub enum QuoridorError {
    /// Player count outside 2..=4
    #[error("Invalid player count: {0} (expected 2 to 4)")]
    InvalidPlayerCount(usize),

    /// Board side outside the supported range
    #[error("Invalid board size: {0}")]
    InvalidBoardSize(usize),

    /// Player id does not exist in this game
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// Other configuration problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent name not present in the registry
    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    /// Socket or channel failure
    #[error("IPC error: {0}")]
    IpcError(String),

    /// Malformed frame or unexpected message
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A blocking wait ran past its deadline
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for QuoridorError {
    fn from(err: serde_json::Error) -> Self {
        QuoridorError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for QuoridorError {
    fn from(err: std::io::Error) -> Self {
        QuoridorError::IpcError(err.to_string())
    }
}

/// Reason an action was refused. Rejections never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("game finished")]
    GameFinished,

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("not {got}'s turn (waiting on {expected})")]
    WrongTurn { expected: PlayerId, got: PlayerId },

    #[error("invalid action")]
    InvalidAction,

    #[error("out of bounds")]
    OutOfBounds,

    #[error("space occupied")]
    Occupied,

    #[error("blocked by wall")]
    BlockedByWall,

    #[error("illegal move distance")]
    IllegalDistance,

    #[error("illegal jump")]
    IllegalJump,

    #[error("no walls left")]
    NoWallsLeft,

    #[error("intersecting wall")]
    IntersectingWall,

    #[error("wall blocks {0}'s path")]
    BlocksPath(PlayerId),

    /// Reason string reported by a remote host
    #[error("{0}")]
    Remote(String),

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),
}
