//! Arena match server library.

pub mod broadcast;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod lobby;
pub mod payout;
pub mod room;
pub mod server;
pub mod spawn;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::GameError;
pub use lobby::{Lobby, LobbyStats};
pub use payout::{LoggingPrizeService, MatchResult, PrizeService};
pub use server::{run, serve, spawn_game, spawn_game_with, ConnectionState, GameHandle, ServerStatus};
