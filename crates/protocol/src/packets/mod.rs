//! Packet definitions for the arena protocol.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. This module contains both
//! client->server intents and server->client events.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Upper bound on inbound frame size. Intents are tiny; anything bigger is noise.
pub const MAX_CLIENT_FRAME: usize = 4 * 1024;
