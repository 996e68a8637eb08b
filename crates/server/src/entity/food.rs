//! Food items.

use glam::Vec2;
use protocol::EntityId;
use protocol::packets::{round2, FoodWire};

/// Food lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FoodState {
    /// On the map and eligible for absorption.
    Active,
    /// Absorbed; reappears at `respawn_at`.
    Pending { respawn_at: u64 },
}

/// A food item that players absorb.
#[derive(Debug, Clone)]
pub struct Food {
    pub id: EntityId,
    pub position: Vec2,
    /// Hue in degrees.
    pub hue: u16,
    pub state: FoodState,
}

impl Food {
    pub fn new(id: EntityId, position: Vec2, hue: u16) -> Self {
        Self {
            id,
            position,
            hue,
            state: FoodState::Active,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == FoodState::Active
    }

    /// Deactivate until `respawn_at`.
    pub fn consume(&mut self, respawn_at: u64) {
        self.state = FoodState::Pending { respawn_at };
    }

    /// Bring the item back at a new position.
    pub fn reactivate(&mut self, position: Vec2, hue: u16) {
        self.position = position;
        self.hue = hue;
        self.state = FoodState::Active;
    }

    pub fn to_wire(&self) -> FoodWire {
        FoodWire {
            id: self.id,
            x: round2(self.position.x),
            z: round2(self.position.y),
            hue: self.hue,
        }
    }
}
