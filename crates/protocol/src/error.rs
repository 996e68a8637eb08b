//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Non-finite value for {0}")]
    NonFinite(&'static str),

    #[error("Frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("Failed to encode packet: {0}")]
    Encode(#[source] serde_json::Error),
}
