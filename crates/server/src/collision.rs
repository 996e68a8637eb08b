//! Collision detection and resolution.
//!
//! [`resolve`] runs once per tick over a room's store, in a fixed order:
//! - eliminations of bodies already below the size threshold
//! - split fragment merges
//! - food attraction and absorption
//! - projectile and boss hits
//! - a second elimination pass, so a body shrunk below the threshold never
//!   survives the tick

use crate::config::Config;
use crate::entity::ProjectileKind;
use crate::store::EntityStore;
use glam::Vec2;
use protocol::{EntityId, SessionId};
use std::collections::HashMap;

/// Shortest vector that still has a usable direction.
pub const DIRECTION_EPSILON: f32 = 1e-4;

/// Result of checking collision between two circles.
#[derive(Debug)]
pub struct CollisionResult {
    /// First body ID
    pub a: EntityId,
    /// Second body ID
    pub b: EntityId,
    /// Combined radius of both bodies
    pub r: f32,
    /// Distance X component
    pub dx: f32,
    /// Distance Z component
    pub dz: f32,
    /// Actual distance
    pub d: f32,
    /// Squared distance
    pub squared: f32,
}

impl CollisionResult {
    /// Check if the circles actually overlap.
    pub fn is_colliding(&self) -> bool {
        self.d < self.r
    }
}

/// Check collision between two circles.
#[inline]
pub fn check_collision(
    a_pos: Vec2,
    a_radius: f32,
    b_pos: Vec2,
    b_radius: f32,
    a: EntityId,
    b: EntityId,
) -> CollisionResult {
    let dx = b_pos.x - a_pos.x;
    let dz = b_pos.y - a_pos.y;
    let squared = dx * dx + dz * dz;
    CollisionResult {
        a,
        b,
        r: a_radius + b_radius,
        dx,
        dz,
        d: squared.sqrt(),
        squared,
    }
}

/// Unit vector of `v`, or `None` when `v` is too short to have a direction.
#[inline]
pub fn direction(v: Vec2) -> Option<Vec2> {
    if !v.is_finite() {
        return None;
    }
    // Scale large vectors down first so `length()` cannot overflow.
    let scale = v.abs().max_element().max(1.0);
    let v = v / scale;
    let len = v.length();
    (len * scale > DIRECTION_EPSILON).then(|| v / len)
}

/// Size gained per food item: `growth / (1 + size * falloff)`.
#[inline]
pub fn growth_increment(size: f32, growth: f32, falloff: f32) -> f32 {
    growth / (1.0 + size * falloff)
}

/// Distance from `p` to the segment `a..b`.
pub fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= DIRECTION_EPSILON * DIRECTION_EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// A body removed for falling below the size threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Elimination {
    pub id: EntityId,
    /// Last body that hit it this tick, if any.
    pub by: Option<EntityId>,
    pub session: Option<SessionId>,
    pub primary: bool,
    pub score: u64,
}

/// Everything one [`resolve`] call changed.
#[derive(Debug, Default)]
pub struct CollisionReport {
    pub eliminated: Vec<Elimination>,
    /// Fragments that merged back or lost their origin.
    pub removed: Vec<EntityId>,
    /// Food deactivated this tick; each needs a respawn job.
    pub absorbed_food: Vec<EntityId>,
    pub spent_projectiles: Vec<EntityId>,
    pub scores_changed: bool,
}

impl CollisionReport {
    pub fn is_empty(&self) -> bool {
        self.eliminated.is_empty()
            && self.removed.is_empty()
            && self.absorbed_food.is_empty()
            && self.spent_projectiles.is_empty()
    }
}

/// Run every collision pass for one tick.
pub fn resolve(store: &mut EntityStore, config: &Config, now: u64) -> CollisionReport {
    let mut report = CollisionReport::default();
    let mut hit_by: HashMap<EntityId, Option<EntityId>> = HashMap::new();

    eliminate(store, config.player.min_size, &hit_by, &mut report);
    merge_fragments(store, config, now, &mut report);
    absorb_food(store, config, now, &mut report);
    projectile_hits(store, config, &mut hit_by, &mut report);
    boss_contact(store, config, &mut hit_by);
    eliminate(store, config.player.min_size, &hit_by, &mut report);

    report
}

fn eliminate(
    store: &mut EntityStore,
    min_size: f32,
    hit_by: &HashMap<EntityId, Option<EntityId>>,
    report: &mut CollisionReport,
) {
    // NaN sizes fail the comparison and are removed too.
    let doomed = store.players.retain(|p| p.size >= min_size && p.size > 0.0);
    for body in doomed {
        if body.is_primary() {
            for fragment in store.fragments_of(body.id) {
                if store.players.remove(fragment).is_some() {
                    report.removed.push(fragment);
                }
            }
        }
        report.eliminated.push(Elimination {
            id: body.id,
            by: hit_by.get(&body.id).copied().flatten(),
            session: body.session,
            primary: body.is_primary(),
            score: body.score,
        });
    }
}

fn merge_fragments(
    store: &mut EntityStore,
    config: &Config,
    now: u64,
    report: &mut CollisionReport,
) {
    let mut merges = Vec::new();
    for fragment in store.players.iter() {
        let crate::entity::BodyKind::Fragment {
            origin, split_at, ..
        } = fragment.kind
        else {
            continue;
        };
        if now < split_at.saturating_add(config.split.merge_delay_ms) {
            continue;
        }
        match store.players.get(origin) {
            Some(target) => {
                if fragment.position.distance(target.position) < config.split.merge_distance {
                    merges.push((fragment.id, Some(origin), fragment.size));
                }
            }
            None => merges.push((fragment.id, None, 0.0)),
        }
    }

    for (id, origin, size) in merges {
        if store.players.remove(id).is_none() {
            continue;
        }
        if let Some(target) = origin.and_then(|o| store.players.get_mut(o)) {
            target.size += size;
        }
        report.removed.push(id);
    }
}

fn absorb_food(store: &mut EntityStore, config: &Config, now: u64, report: &mut CollisionReport) {
    let food_config = &config.food;
    // Pre-tick sizes: growth is additive and order independent.
    let bodies: Vec<(EntityId, Vec2, f32)> = store
        .players
        .iter()
        .filter(|p| !p.is_boss())
        .map(|p| (p.id, p.position, p.size))
        .collect();
    if bodies.is_empty() {
        return;
    }

    let respawn_at = now.saturating_add(food_config.respawn_delay_ms);
    let mut eaten: HashMap<EntityId, u32> = HashMap::new();

    for id in store.food.ids() {
        let Some(food) = store.food.get_mut(id) else {
            continue;
        };
        if !food.is_active() {
            continue;
        }

        let mut eater = None;
        let mut nearest: Option<(f32, Vec2)> = None;
        for &(body_id, position, size) in &bodies {
            let d = food.position.distance(position);
            if d < size * food_config.absorb_factor {
                eater = Some(body_id);
                break;
            }
            if d < size * food_config.attract_factor && nearest.is_none_or(|(best, _)| d < best) {
                nearest = Some((d, position));
            }
        }

        if let Some(body_id) = eater {
            food.consume(respawn_at);
            *eaten.entry(body_id).or_default() += 1;
            report.absorbed_food.push(id);
        } else if let Some((_, position)) = nearest {
            food.position = food.position.lerp(position, food_config.attract_pull);
        }
    }

    for (body_id, count) in eaten {
        let Some(body) = store.players.get_mut(body_id) else {
            continue;
        };
        body.size += count as f32
            * growth_increment(body.size, food_config.growth, food_config.growth_falloff);
        // Fragments score for the body they split from.
        let credit = body.origin().unwrap_or(body_id);
        if let Some(owner) = store.players.get_mut(credit) {
            owner.score += u64::from(count) * food_config.score;
            report.scores_changed = true;
        }
    }
}

fn projectile_hits(
    store: &mut EntityStore,
    config: &Config,
    hit_by: &mut HashMap<EntityId, Option<EntityId>>,
    report: &mut CollisionReport,
) {
    let body_radius = config.player.body_radius;
    for projectile_id in store.projectiles.ids() {
        let Some(projectile) = store.projectiles.get(projectile_id) else {
            continue;
        };
        let (start, end, radius, owner, kind) = (
            projectile.previous,
            projectile.position,
            projectile.radius,
            projectile.owner,
            projectile.kind,
        );
        let is_mass = matches!(kind, ProjectileKind::EjectedMass { .. });

        let target = store
            .players
            .iter()
            .find(|body| {
                let own = owner.is_some() && (Some(body.id) == owner || body.origin() == owner);
                if own || (is_mass && body.is_boss()) {
                    return false;
                }
                segment_distance(body.position, start, end) < body.size * body_radius + radius
            })
            .map(|body| body.id);

        let Some(target) = target else {
            continue;
        };
        let Some(body) = store.players.get_mut(target) else {
            continue;
        };
        match kind {
            ProjectileKind::EjectedMass { .. } => body.size += config.eject.growth,
            ProjectileKind::Laser { .. } => {
                body.size *= config.laser.hit_factor;
                body.recently_hit = true;
                hit_by.insert(target, owner);
            }
        }
        store.projectiles.remove(projectile_id);
        report.spent_projectiles.push(projectile_id);
    }
}

fn boss_contact(
    store: &mut EntityStore,
    config: &Config,
    hit_by: &mut HashMap<EntityId, Option<EntityId>>,
) {
    let body_radius = config.player.body_radius;
    let bosses: Vec<(EntityId, Vec2, f32)> = store
        .players
        .iter()
        .filter(|p| p.is_boss())
        .map(|p| (p.id, p.position, p.size * body_radius))
        .collect();

    for (boss_id, position, radius) in bosses {
        for body in store.players.values_mut() {
            if body.is_boss() {
                continue;
            }
            let hit = check_collision(
                body.position,
                body.size * body_radius,
                position,
                radius,
                body.id,
                boss_id,
            );
            if hit.is_colliding() {
                body.size *= config.boss.hit_factor;
                body.recently_hit = true;
                hit_by.insert(body.id, Some(boss_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BodyKind, Food, FoodState, Player, Projectile};
    use protocol::SessionId;

    fn add_player(store: &mut EntityStore, position: Vec2, size: f32) -> EntityId {
        let id = store.allocate_id();
        let mut player = Player::primary(
            id,
            SessionId(id.0),
            format!("p{}", id.0),
            position,
            size,
            "skin".into(),
            3,
        );
        player.size = size;
        store.players.insert(player).unwrap();
        id
    }

    fn add_food(store: &mut EntityStore, position: Vec2) -> EntityId {
        let id = store.allocate_id();
        store.food.insert(Food::new(id, position, 0)).unwrap();
        id
    }

    fn add_projectile(
        store: &mut EntityStore,
        owner: Option<EntityId>,
        from: Vec2,
        to: Vec2,
        kind: ProjectileKind,
    ) -> EntityId {
        let id = store.allocate_id();
        store
            .projectiles
            .insert(Projectile {
                id,
                owner,
                position: to,
                previous: from,
                velocity: Vec2::ZERO,
                radius: 0.7,
                kind,
            })
            .unwrap();
        id
    }

    const LASER: ProjectileKind = ProjectileKind::Laser { expires_at: 1000 };

    #[test]
    fn test_collision_check() {
        let result = check_collision(
            Vec2::new(0.0, 0.0),
            50.0,
            Vec2::new(30.0, 0.0),
            20.0,
            EntityId(1),
            EntityId(2),
        );

        assert!(result.is_colliding()); // 50 + 20 = 70, distance = 30
        assert_eq!(result.d, 30.0);
    }

    #[test]
    fn test_no_collision() {
        let result = check_collision(
            Vec2::new(0.0, 0.0),
            10.0,
            Vec2::new(100.0, 0.0),
            10.0,
            EntityId(1),
            EntityId(2),
        );

        assert!(!result.is_colliding()); // 10 + 10 = 20, distance = 100
    }

    #[test]
    fn test_zero_vector_has_no_direction() {
        assert_eq!(direction(Vec2::ZERO), None);
        assert_eq!(direction(Vec2::splat(1e-6)), None);
        assert_eq!(direction(Vec2::new(f32::INFINITY, 0.0)), None);
        assert_eq!(direction(Vec2::new(f32::NAN, 1.0)), None);
        let far = direction(Vec2::new(1e30, 1e30)).unwrap();
        assert!((far.length() - 1.0).abs() < 1e-5);
        let d = direction(Vec2::new(3.0, 4.0)).unwrap();
        assert!((d.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_segment_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(segment_distance(Vec2::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(segment_distance(Vec2::new(-4.0, 3.0), a, b), 5.0);
        assert_eq!(segment_distance(Vec2::new(0.0, 2.0), a, a), 2.0);
    }

    #[test]
    fn test_food_absorbed_at_half_radius() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let player = add_player(&mut store, Vec2::ZERO, 40.0);
        let absorb_radius = 40.0 * config.food.absorb_factor;
        let food = add_food(&mut store, Vec2::new(absorb_radius * 0.5, 0.0));

        let report = resolve(&mut store, &config, 1_000);

        let expected = 40.0 + growth_increment(40.0, config.food.growth, config.food.growth_falloff);
        let body = store.players.get(player).unwrap();
        assert!((body.size - expected).abs() < 1e-5);
        assert_eq!(body.score, config.food.score);
        assert_eq!(report.absorbed_food, vec![food]);
        assert!(report.scores_changed);
        assert_eq!(
            store.food.get(food).unwrap().state,
            FoodState::Pending {
                respawn_at: 1_000 + config.food.respawn_delay_ms
            }
        );
    }

    #[test]
    fn test_simultaneous_absorption_is_additive() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let player = add_player(&mut store, Vec2::ZERO, 40.0);
        for x in [1.0, 2.0, 3.0] {
            add_food(&mut store, Vec2::new(x, 0.0));
        }

        let report = resolve(&mut store, &config, 0);

        let delta = growth_increment(40.0, config.food.growth, config.food.growth_falloff);
        let body = store.players.get(player).unwrap();
        assert!((body.size - (40.0 + 3.0 * delta)).abs() < 1e-4);
        assert_eq!(report.absorbed_food.len(), 3);
        assert_eq!(store.active_food(), 0);
    }

    #[test]
    fn test_attraction_pulls_food_in() {
        let config = Config::default();
        let mut store = EntityStore::new();
        add_player(&mut store, Vec2::ZERO, 40.0);
        // Outside absorption (60) but inside attraction (160).
        let food = add_food(&mut store, Vec2::new(100.0, 0.0));

        let report = resolve(&mut store, &config, 0);

        assert!(report.absorbed_food.is_empty());
        let item = store.food.get(food).unwrap();
        assert!(item.is_active());
        assert!((item.position.x - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_far_food_untouched() {
        let config = Config::default();
        let mut store = EntityStore::new();
        add_player(&mut store, Vec2::ZERO, 40.0);
        let food = add_food(&mut store, Vec2::new(500.0, 0.0));
        resolve(&mut store, &config, 0);
        assert_eq!(store.food.get(food).unwrap().position, Vec2::new(500.0, 0.0));
    }

    #[test]
    fn test_laser_hit_shrinks_target_and_spares_owner() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let shooter = add_player(&mut store, Vec2::ZERO, 40.0);
        let target = add_player(&mut store, Vec2::new(100.0, 0.0), 40.0);
        let laser = add_projectile(
            &mut store,
            Some(shooter),
            Vec2::ZERO,
            Vec2::new(150.0, 0.0),
            LASER,
        );

        let report = resolve(&mut store, &config, 0);

        assert_eq!(report.spent_projectiles, vec![laser]);
        assert!(store.projectiles.is_empty());
        assert_eq!(store.players.get(shooter).unwrap().size, 40.0);
        let hit = store.players.get(target).unwrap();
        assert!((hit.size - 40.0 * config.laser.hit_factor).abs() < 1e-5);
        assert!(hit.recently_hit);
    }

    #[test]
    fn test_ejected_mass_feeds_other_players() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let owner = add_player(&mut store, Vec2::new(-100.0, 0.0), 80.0);
        let other = add_player(&mut store, Vec2::new(10.0, 0.0), 40.0);
        add_projectile(
            &mut store,
            Some(owner),
            Vec2::ZERO,
            Vec2::ZERO,
            ProjectileKind::EjectedMass {
                travelled: 0.0,
                max_travel: 200.0,
            },
        );

        resolve(&mut store, &config, 0);

        assert_eq!(store.players.get(other).unwrap().size, 40.0 + config.eject.growth);
        assert_eq!(store.players.get(owner).unwrap().size, 80.0);
    }

    #[test]
    fn test_hit_below_threshold_eliminates_within_tick() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let shooter = add_player(&mut store, Vec2::new(-50.0, 0.0), 40.0);
        let victim = add_player(&mut store, Vec2::new(50.0, 0.0), config.player.min_size);
        add_projectile(
            &mut store,
            Some(shooter),
            Vec2::new(40.0, 0.0),
            Vec2::new(60.0, 0.0),
            LASER,
        );

        let report = resolve(&mut store, &config, 0);

        assert!(!store.players.contains(victim));
        assert_eq!(report.eliminated.len(), 1);
        assert_eq!(report.eliminated[0].id, victim);
        assert_eq!(report.eliminated[0].by, Some(shooter));
        assert!(store.players.iter().all(|p| p.size >= config.player.min_size));
    }

    #[test]
    fn test_fragment_merges_after_delay() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let origin = add_player(&mut store, Vec2::ZERO, 50.0);
        let fragment = add_player(&mut store, Vec2::new(1.0, 0.0), 50.0);
        store.players.get_mut(fragment).unwrap().kind = BodyKind::Fragment {
            origin,
            split_at: 0,
            velocity: Vec2::ZERO,
        };

        let early = resolve(&mut store, &config, config.split.merge_delay_ms - 1);
        assert!(early.removed.is_empty());
        assert!(store.players.contains(fragment));

        let report = resolve(&mut store, &config, config.split.merge_delay_ms);
        assert_eq!(report.removed, vec![fragment]);
        assert_eq!(store.players.get(origin).unwrap().size, 100.0);
    }

    #[test]
    fn test_eliminated_primary_takes_fragments() {
        let config = Config::default();
        let mut store = EntityStore::new();
        let origin = add_player(&mut store, Vec2::ZERO, 5.0);
        let fragment = add_player(&mut store, Vec2::new(500.0, 0.0), 50.0);
        store.players.get_mut(fragment).unwrap().kind = BodyKind::Fragment {
            origin,
            split_at: 0,
            velocity: Vec2::ZERO,
        };

        let report = resolve(&mut store, &config, 0);

        assert!(store.players.is_empty());
        assert_eq!(report.eliminated[0].id, origin);
        assert_eq!(report.removed, vec![fragment]);
    }
}
