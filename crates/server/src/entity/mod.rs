//! Room entities.
//!
//! Three record kinds live in a room's store: player-like bodies (players,
//! split fragments, the boss), food items and projectiles.

mod food;
mod player;
mod projectile;

pub use food::{Food, FoodState};
pub use player::{BodyKind, Heading, Player};
pub use projectile::{Projectile, ProjectileKind};

use protocol::EntityId;

/// A record that can be kept in a [`Registry`](crate::store::Registry).
pub trait Record {
    fn id(&self) -> EntityId;
}

impl Record for Player {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Record for Food {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Record for Projectile {
    fn id(&self) -> EntityId {
        self.id
    }
}
