//! Ejected mass and laser shots.

use glam::Vec2;
use protocol::EntityId;
use protocol::packets::{round2, ProjectileKindWire, ProjectileWire};

/// Per-kind projectile state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileKind {
    /// Blob of mass; dissolves once it has covered `max_travel`.
    EjectedMass { travelled: f32, max_travel: f32 },
    /// Laser shot; disappears at `expires_at`.
    Laser { expires_at: u64 },
}

/// A projectile in flight.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    /// Shooter. May point at a body that no longer exists.
    pub owner: Option<EntityId>,
    pub position: Vec2,
    /// Position before the last `advance`, for swept hit tests.
    pub previous: Vec2,
    /// Units per second.
    pub velocity: Vec2,
    pub radius: f32,
    pub kind: ProjectileKind,
}

impl Projectile {
    /// Advance by `dt` seconds, applying `decay` to the velocity.
    /// Returns `false` once the projectile has run out of budget at `now`.
    pub fn advance(&mut self, dt: f32, decay: f32, now: u64) -> bool {
        let step = self.velocity * dt;
        self.previous = self.position;
        self.position += step;
        match &mut self.kind {
            ProjectileKind::EjectedMass {
                travelled,
                max_travel,
            } => {
                self.velocity *= decay;
                *travelled += step.length();
                *travelled < *max_travel && self.velocity.length_squared() > 1.0
            }
            ProjectileKind::Laser { expires_at } => now < *expires_at,
        }
    }

    pub fn to_wire(&self) -> ProjectileWire {
        ProjectileWire {
            id: self.id,
            owner: self.owner,
            x: round2(self.position.x),
            z: round2(self.position.y),
            vx: round2(self.velocity.x),
            vz: round2(self.velocity.y),
            kind: match self.kind {
                ProjectileKind::EjectedMass { .. } => ProjectileKindWire::Mass,
                ProjectileKind::Laser { .. } => ProjectileKindWire::Laser,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_stops_after_travel_budget() {
        let mut p = Projectile {
            id: EntityId(1),
            owner: None,
            position: Vec2::ZERO,
            previous: Vec2::ZERO,
            velocity: Vec2::new(400.0, 0.0),
            radius: 5.0,
            kind: ProjectileKind::EjectedMass {
                travelled: 0.0,
                max_travel: 30.0,
            },
        };
        let mut steps = 0;
        while p.advance(0.05, 1.0, 0) {
            steps += 1;
            assert!(steps < 100);
        }
        // 20 units per step: the second step crosses 30.
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_laser_expires_by_time() {
        let mut p = Projectile {
            id: EntityId(1),
            owner: Some(EntityId(2)),
            position: Vec2::ZERO,
            previous: Vec2::ZERO,
            velocity: Vec2::new(0.0, 3200.0),
            radius: 0.7,
            kind: ProjectileKind::Laser { expires_at: 70 },
        };
        assert!(p.advance(0.05, 1.0, 50));
        assert!(!p.advance(0.05, 1.0, 100));
        assert!((p.position.y - 320.0).abs() < 1e-3);
    }
}
