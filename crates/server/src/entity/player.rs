//! Player-like bodies.

use crate::config::PlayerConfig;
use glam::Vec2;
use protocol::packets::{round2, BodyKindWire, PlayerWire};
use protocol::{EntityId, SessionId};

/// What a body is steering toward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Heading {
    #[default]
    Idle,
    /// Unit direction.
    Direction(Vec2),
    /// Absolute point on the plane.
    Target(Vec2),
}

/// Per-kind state of a body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyKind {
    /// The body a member controls.
    Primary {
        /// Laser shots left in this match.
        ammo: u32,
        /// Time of the last split, in room milliseconds.
        last_split_at: Option<u64>,
    },
    /// Half of a split, merges back into `origin`.
    Fragment {
        origin: EntityId,
        split_at: u64,
        /// Launch velocity in units per second, decays each tick.
        velocity: Vec2,
    },
    /// Server-controlled monster.
    Boss { expires_at: u64 },
}

/// A body on the arena plane.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: EntityId,
    /// Controlling connection. `None` for monsters.
    pub session: Option<SessionId>,
    pub name: String,
    pub position: Vec2,
    pub heading: Heading,
    /// Always > 0 while the record exists.
    pub size: f32,
    pub score: u64,
    pub skin: String,
    pub kind: BodyKind,
    /// Set when a projectile or the boss landed this tick.
    pub recently_hit: bool,
}

impl Player {
    /// Create a primary body with a full magazine.
    pub fn primary(
        id: EntityId,
        session: SessionId,
        name: String,
        position: Vec2,
        size: f32,
        skin: String,
        ammo: u32,
    ) -> Self {
        Self {
            id,
            session: Some(session),
            name,
            position,
            heading: Heading::Idle,
            size,
            score: 0,
            skin,
            kind: BodyKind::Primary {
                ammo,
                last_split_at: None,
            },
            recently_hit: false,
        }
    }

    /// Movement speed in units per second. Bigger bodies are slower.
    pub fn speed(&self, config: &PlayerConfig) -> f32 {
        let ratio = config.start_size / self.size.max(f32::EPSILON);
        (config.speed * ratio.powf(config.speed_exponent)).max(config.min_speed)
    }

    /// Collision radius.
    #[inline]
    pub fn radius(&self, config: &PlayerConfig) -> f32 {
        self.size * config.body_radius
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        matches!(self.kind, BodyKind::Primary { .. })
    }

    #[inline]
    pub fn is_boss(&self) -> bool {
        matches!(self.kind, BodyKind::Boss { .. })
    }

    /// Origin of a fragment.
    pub fn origin(&self) -> Option<EntityId> {
        match self.kind {
            BodyKind::Fragment { origin, .. } => Some(origin),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> PlayerWire {
        let kind = match self.kind {
            BodyKind::Primary { .. } => BodyKindWire::Player,
            BodyKind::Fragment { .. } => BodyKindWire::Fragment,
            BodyKind::Boss { .. } => BodyKindWire::Boss,
        };
        PlayerWire {
            id: self.id,
            session_id: self.session,
            name: self.name.clone(),
            x: round2(self.position.x),
            z: round2(self.position.y),
            size: round2(self.size),
            score: self.score,
            skin: self.skin.clone(),
            kind,
            origin: self.origin(),
            recently_hit: self.recently_hit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(size: f32) -> Player {
        let mut p = Player::primary(
            EntityId(1),
            SessionId(1),
            "a".into(),
            Vec2::ZERO,
            40.0,
            "skin".into(),
            3,
        );
        p.size = size;
        p
    }

    #[test]
    fn test_speed_decreases_with_size() {
        let config = PlayerConfig::default();
        let small = body(40.0).speed(&config);
        let big = body(160.0).speed(&config);
        assert!((small - config.speed).abs() < 1e-3);
        assert!(big < small);
    }

    #[test]
    fn test_speed_has_floor() {
        let config = PlayerConfig::default();
        assert_eq!(body(1.0e6).speed(&config), config.min_speed);
    }

    #[test]
    fn test_wire_kind() {
        let mut p = body(40.0);
        assert_eq!(p.to_wire().kind, BodyKindWire::Player);
        p.kind = BodyKind::Fragment {
            origin: EntityId(7),
            split_at: 0,
            velocity: Vec2::ZERO,
        };
        let wire = p.to_wire();
        assert_eq!(wire.kind, BodyKindWire::Fragment);
        assert_eq!(wire.origin, Some(EntityId(7)));
    }
}
