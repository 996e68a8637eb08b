//! Shared protocol crate for the arena server.
//!
//! This crate contains:
//! - Identifier newtypes shared by server and clients
//! - Packet definitions (client intents and server events)
//! - The JSON frame codec

mod error;
pub mod packets;

pub use error::ProtocolError;
pub use packets::{ClientPacket, MoveIntent, ServerPacket};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Transport-level connection identifier, unique per process.
    SessionId
);
id_type!(
    /// Entity identifier, unique within one room.
    EntityId
);
id_type!(
    /// Room (lobby) identifier.
    RoomId
);
