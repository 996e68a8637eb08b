//! Game-level error types.
//!
//! Every variant here is a validation failure: it is reported to the acting
//! connection as an `error` event and leaves room state untouched.

use thiserror::Error;

/// Rejected intent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("Invalid username")]
    InvalidName,

    #[error("Already joined a room")]
    AlreadyJoined,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Not allowed while the room is {0}")]
    WrongPhase(&'static str),

    #[error("No active body")]
    NotPlaying,

    #[error("Too small to {action} (size {size:.1}, need more than {required:.1})")]
    TooSmall {
        action: &'static str,
        size: f32,
        required: f32,
    },

    #[error("Cannot {0} yet, cooldown active")]
    Cooldown(&'static str),

    #[error("Out of ammunition")]
    OutOfAmmo,

    #[error("Too many shots in flight")]
    TooManyShots,

    #[error("Scores are computed by the server")]
    ClientScoreRejected,
}
