//! Body movement and gameplay intents.

use crate::collision::direction;
use crate::config::Config;
use crate::entity::{BodyKind, Heading, Player, Projectile, ProjectileKind};
use crate::error::GameError;
use crate::store::EntityStore;
use glam::Vec2;
use protocol::{EntityId, MoveIntent};
use std::collections::HashMap;

/// Facing used when a body has never been steered.
const DEFAULT_FACING: Vec2 = Vec2::new(0.0, -1.0);

/// Turn a `move` intent into a heading. Targets are pulled onto the map and
/// anything non-finite leaves the body idle.
pub fn heading_for(intent: MoveIntent, half_extent: f32) -> Heading {
    match intent {
        MoveIntent::Direction { dx, dz } => match direction(Vec2::new(dx, dz)) {
            Some(d) => Heading::Direction(d),
            None => Heading::Idle,
        },
        MoveIntent::Target { x, z } => {
            let target = Vec2::new(x, z);
            if target.is_finite() {
                Heading::Target(clamp_to_map(target, half_extent))
            } else {
                Heading::Idle
            }
        }
    }
}

/// Unit vector the body is currently facing.
fn facing(body: &Player) -> Vec2 {
    match body.heading {
        Heading::Direction(d) => d,
        Heading::Target(t) => direction(t - body.position).unwrap_or(DEFAULT_FACING),
        Heading::Idle => DEFAULT_FACING,
    }
}

/// Move `from` toward `to` by at most `max_step`.
#[inline]
fn step_toward(from: Vec2, to: Vec2, max_step: f32) -> Vec2 {
    let delta = to - from;
    match direction(delta) {
        Some(d) => from + d * max_step.min(delta.length()),
        None => to,
    }
}

#[inline]
fn clamp_to_map(p: Vec2, half_extent: f32) -> Vec2 {
    p.clamp(Vec2::splat(-half_extent), Vec2::splat(half_extent))
}

/// Integrate every body for `dt` seconds.
pub fn advance_bodies(store: &mut EntityStore, config: &Config, dt: f32, now: u64) {
    let positions: HashMap<EntityId, Vec2> = store
        .players
        .iter()
        .map(|p| (p.id, p.position))
        .collect();
    let prey: Vec<Vec2> = store
        .players
        .iter()
        .filter(|p| !p.is_boss())
        .map(|p| p.position)
        .collect();
    let half_extent = config.map.half_extent;
    let merge_delay = config.split.merge_delay_ms;

    for body in store.players.values_mut() {
        body.recently_hit = false;
        let speed = body.speed(&config.player) * dt;

        let next = match &mut body.kind {
            BodyKind::Boss { .. } => {
                let nearest = prey.iter().copied().min_by(|a, b| {
                    a.distance_squared(body.position)
                        .total_cmp(&b.distance_squared(body.position))
                });
                match nearest {
                    Some(target) => step_toward(body.position, target, config.boss.speed * dt),
                    None => body.position,
                }
            }
            BodyKind::Fragment {
                origin,
                split_at,
                velocity,
            } => {
                let launched = body.position + *velocity * dt;
                *velocity *= config.split.velocity_decay;
                let merge_ready = now >= split_at.saturating_add(merge_delay);
                match positions.get(&*origin) {
                    Some(&home) if merge_ready => step_toward(launched, home, speed),
                    _ => steer(launched, body.heading, speed),
                }
            }
            BodyKind::Primary { .. } => steer(body.position, body.heading, speed),
        };
        body.position = clamp_to_map(next, half_extent);
    }
}

fn steer(position: Vec2, heading: Heading, step: f32) -> Vec2 {
    match heading {
        Heading::Idle => position,
        Heading::Direction(d) => position + d * step,
        Heading::Target(t) => step_toward(position, t, step),
    }
}

/// Advance projectiles and drop the ones out of budget. Returns removed ids.
pub fn advance_projectiles(
    store: &mut EntityStore,
    config: &Config,
    dt: f32,
    now: u64,
) -> Vec<EntityId> {
    let mut expired = Vec::new();
    for projectile in store.projectiles.values_mut() {
        let decay = match projectile.kind {
            ProjectileKind::EjectedMass { .. } => config.eject.decay,
            ProjectileKind::Laser { .. } => 1.0,
        };
        if !projectile.advance(dt, decay, now) {
            expired.push(projectile.id);
        }
    }
    expired.retain(|id| store.projectiles.remove(*id).is_some());
    expired
}

/// Split `body_id` in two. The new half is launched forward as a fragment.
pub fn split(
    store: &mut EntityStore,
    body_id: EntityId,
    config: &Config,
    now: u64,
) -> Result<EntityId, GameError> {
    let fragment_id = store.allocate_id();
    let body = store.players.get_mut(body_id).ok_or(GameError::NotPlaying)?;
    let BodyKind::Primary { last_split_at, .. } = &mut body.kind else {
        return Err(GameError::NotPlaying);
    };
    if body.size <= config.split.min_size {
        return Err(GameError::TooSmall {
            action: "split",
            size: body.size,
            required: config.split.min_size,
        });
    }
    if last_split_at.is_some_and(|at| now < at.saturating_add(config.split.cooldown_ms)) {
        return Err(GameError::Cooldown("split"));
    }
    *last_split_at = Some(now);

    let half = body.size / 2.0;
    body.size = half;
    let dir = facing(body);
    let fragment = Player {
        id: fragment_id,
        session: body.session,
        name: body.name.clone(),
        position: clamp_to_map(
            body.position + dir * half * config.split.offset_factor,
            config.map.half_extent,
        ),
        heading: body.heading,
        size: half,
        score: 0,
        skin: body.skin.clone(),
        kind: BodyKind::Fragment {
            origin: body_id,
            split_at: now,
            velocity: dir * config.split.launch_speed,
        },
        recently_hit: false,
    };
    store
        .players
        .insert(fragment)
        .map_err(|_| GameError::NotPlaying)?;
    Ok(fragment_id)
}

/// Eject a blob of mass in the facing direction.
pub fn eject(
    store: &mut EntityStore,
    body_id: EntityId,
    config: &Config,
) -> Result<EntityId, GameError> {
    let projectile_id = store.allocate_id();
    let body = store.players.get_mut(body_id).ok_or(GameError::NotPlaying)?;
    if body.size <= config.eject.min_size {
        return Err(GameError::TooSmall {
            action: "eject",
            size: body.size,
            required: config.eject.min_size,
        });
    }
    body.size -= config.eject.mass;

    let dir = facing(body);
    let start = body.position + dir * (body.radius(&config.player) + config.eject.radius);
    let projectile = Projectile {
        id: projectile_id,
        owner: Some(body_id),
        position: start,
        previous: start,
        velocity: dir * config.eject.speed,
        radius: config.eject.radius,
        kind: ProjectileKind::EjectedMass {
            travelled: 0.0,
            max_travel: config.eject.max_travel,
        },
    };
    store
        .projectiles
        .insert(projectile)
        .map_err(|_| GameError::NotPlaying)?;
    Ok(projectile_id)
}

/// Fire a laser toward `(dx, dz)`, or the facing direction if that is zero.
pub fn shoot(
    store: &mut EntityStore,
    body_id: EntityId,
    dx: f32,
    dz: f32,
    config: &Config,
    now: u64,
) -> Result<EntityId, GameError> {
    let laser = &config.laser;
    let in_flight = store
        .projectiles
        .iter()
        .filter(|p| p.owner == Some(body_id) && matches!(p.kind, ProjectileKind::Laser { .. }))
        .count();
    let projectile_id = store.allocate_id();

    let body = store.players.get_mut(body_id).ok_or(GameError::NotPlaying)?;
    let dir = direction(Vec2::new(dx, dz)).unwrap_or_else(|| facing(body));
    let start = body.position + dir * body.radius(&config.player);
    let size = body.size;
    let BodyKind::Primary { ammo, .. } = &mut body.kind else {
        return Err(GameError::NotPlaying);
    };
    if size < laser.min_size {
        return Err(GameError::TooSmall {
            action: "shoot",
            size,
            required: laser.min_size,
        });
    }
    if *ammo == 0 {
        return Err(GameError::OutOfAmmo);
    }
    if in_flight >= laser.max_active {
        return Err(GameError::TooManyShots);
    }
    *ammo -= 1;

    let projectile = Projectile {
        id: projectile_id,
        owner: Some(body_id),
        position: start,
        previous: start,
        velocity: dir * laser.speed,
        radius: laser.radius,
        kind: ProjectileKind::Laser {
            expires_at: now.saturating_add(laser.lifetime_ms),
        },
    };
    store
        .projectiles
        .insert(projectile)
        .map_err(|_| GameError::NotPlaying)?;
    Ok(projectile_id)
}
