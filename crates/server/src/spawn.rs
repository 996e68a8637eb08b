//! Food and boss spawning.
//!
//! Food population counts active and pending-respawn records together, so a
//! periodic spawn job and a respawn job can never push a room past its
//! target: absorbed food keeps its record (and id) until it reappears.

use crate::config::{BossConfig, Config};
use crate::entity::{BodyKind, Food, FoodState, Heading, Player};
use crate::store::EntityStore;
use glam::Vec2;
use protocol::EntityId;
use rand::Rng;
use tracing::debug;

/// Uniform random point in the square `[-half_extent, half_extent]²`.
#[inline]
pub fn random_position(rng: &mut impl Rng, half_extent: f32) -> Vec2 {
    let h = half_extent.abs();
    Vec2::new(rng.random_range(-h..=h), rng.random_range(-h..=h))
}

#[inline]
fn random_hue(rng: &mut impl Rng) -> u16 {
    rng.random_range(0..360)
}

/// Insert up to `limit` food items while the population is below `target`.
/// Returns how many were inserted.
pub fn spawn_food(
    store: &mut EntityStore,
    rng: &mut impl Rng,
    target: usize,
    limit: usize,
    half_extent: f32,
) -> usize {
    let missing = target.saturating_sub(store.food_population()).min(limit);
    for _ in 0..missing {
        let id = store.allocate_id();
        let food = Food::new(id, random_position(rng, half_extent), random_hue(rng));
        // Ids come from the allocator and are never reused.
        if store.food.insert(food).is_err() {
            break;
        }
    }
    missing
}

/// Fill the room to its food target. Used when a match starts.
pub fn fill_food(store: &mut EntityStore, rng: &mut impl Rng, config: &Config) -> usize {
    spawn_food(
        store,
        rng,
        config.food.target,
        usize::MAX,
        config.map.half_extent,
    )
}

/// Bring a pending food record back at a fresh position.
///
/// Absent, already-active, or not-yet-due records are left alone, so a
/// duplicate or stale respawn job is harmless.
pub fn respawn_food(
    store: &mut EntityStore,
    id: EntityId,
    rng: &mut impl Rng,
    half_extent: f32,
    now: u64,
) -> bool {
    let Some(food) = store.food.get_mut(id) else {
        return false;
    };
    match food.state {
        FoodState::Pending { respawn_at } if now >= respawn_at => {
            let position = random_position(rng, half_extent);
            let hue = random_hue(rng);
            food.reactivate(position, hue);
            true
        }
        _ => false,
    }
}

/// Spawn the boss if none is alive.
pub fn spawn_boss(
    store: &mut EntityStore,
    rng: &mut impl Rng,
    config: &BossConfig,
    half_extent: f32,
    now: u64,
) -> Option<EntityId> {
    if store.players.iter().any(Player::is_boss) {
        return None;
    }
    let id = store.allocate_id();
    let boss = Player {
        id,
        session: None,
        name: String::new(),
        position: random_position(rng, half_extent),
        heading: Heading::Idle,
        size: config.size,
        score: 0,
        skin: String::new(),
        kind: BodyKind::Boss {
            expires_at: now.saturating_add(config.lifetime_ms),
        },
        recently_hit: false,
    };
    store.players.insert(boss).ok()?;
    debug!("Boss {} spawned", id);
    Some(id)
}

/// Remove bosses whose lifetime is over.
pub fn expire_bosses(store: &mut EntityStore, now: u64) -> Vec<EntityId> {
    store
        .players
        .retain(|p| !matches!(p.kind, BodyKind::Boss { expires_at } if now >= expires_at))
        .into_iter()
        .map(|p| p.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_spawn_honours_batch_and_target() {
        let mut store = EntityStore::new();
        let mut rng = rng();
        assert_eq!(spawn_food(&mut store, &mut rng, 120, 50, 100.0), 50);
        assert_eq!(spawn_food(&mut store, &mut rng, 120, 50, 100.0), 50);
        assert_eq!(spawn_food(&mut store, &mut rng, 120, 50, 100.0), 20);
        assert_eq!(spawn_food(&mut store, &mut rng, 120, 50, 100.0), 0);
        assert_eq!(store.food_population(), 120);
        assert!(store.food.iter().all(|f| {
            f.position.x.abs() <= 100.0 && f.position.y.abs() <= 100.0
        }));
    }

    #[test]
    fn test_pending_food_counts_toward_target() {
        let mut store = EntityStore::new();
        let mut rng = rng();
        spawn_food(&mut store, &mut rng, 10, usize::MAX, 100.0);
        let id = store.food.ids()[0];
        store.food.get_mut(id).unwrap().consume(500);

        assert_eq!(spawn_food(&mut store, &mut rng, 10, usize::MAX, 100.0), 0);
        assert_eq!(store.food_population(), 10);
        assert_eq!(store.active_food(), 9);
    }

    #[test]
    fn test_respawn_reuses_id_once() {
        let mut store = EntityStore::new();
        let mut rng = rng();
        spawn_food(&mut store, &mut rng, 3, usize::MAX, 100.0);
        let id = store.food.ids()[1];
        store.food.get_mut(id).unwrap().consume(500);

        assert!(!respawn_food(&mut store, id, &mut rng, 100.0, 499));
        assert!(respawn_food(&mut store, id, &mut rng, 100.0, 500));
        assert!(!respawn_food(&mut store, id, &mut rng, 100.0, 600));
        assert!(!respawn_food(&mut store, EntityId(999), &mut rng, 100.0, 600));
        assert_eq!(store.food_population(), 3);
        assert_eq!(store.active_food(), 3);
    }

    #[test]
    fn test_single_boss_with_lifetime() {
        let mut store = EntityStore::new();
        let mut rng = rng();
        let config = BossConfig {
            interval_ms: 1000,
            ..Default::default()
        };
        let boss = spawn_boss(&mut store, &mut rng, &config, 100.0, 0).unwrap();
        assert!(spawn_boss(&mut store, &mut rng, &config, 100.0, 10).is_none());
        assert!(expire_bosses(&mut store, config.lifetime_ms - 1).is_empty());
        assert_eq!(expire_bosses(&mut store, config.lifetime_ms), vec![boss]);
        assert!(store.players.is_empty());
    }
}
