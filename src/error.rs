//! Error types for the game engine

use thiserror::Error;

/// Errors surfaced by the engine and the conversation service adapter.
#[derive(Error, Debug)]
pub enum GameError {
    /// A turn was sent with no session started. This is a sequencing bug
    /// in the caller, never a recoverable condition.
    #[error("no active session")]
    NoActiveSession,

    #[error("unknown character: {0}")]
    UnknownCharacter(String),

    #[error("failed to start session: {0}")]
    StartFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("conversation service returned HTTP {status}")]
    Http { status: u16 },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GameError {
    /// True for failures a turn recovers from with a fallback line.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GameError::Transport(_)
                | GameError::Timeout(_)
                | GameError::Http { .. }
                | GameError::MalformedReply(_)
        )
    }
}

impl From<reqwest::Error> for GameError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GameError::MalformedReply(err.to_string())
        } else if let Some(status) = err.status() {
            GameError::Http {
                status: status.as_u16(),
            }
        } else {
            GameError::Transport(err.to_string())
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GameError>;
