//! Per-room entity store.
//!
//! Records are keyed by [`EntityId`] for O(1) lookup and removal, and keep
//! their insertion order so snapshots render deterministically.

use crate::entity::{Food, Player, Projectile, Record};
use protocol::EntityId;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Duplicate entity id {0}")]
    DuplicateId(EntityId),
}

/// Insertion-ordered map of records of one kind.
#[derive(Debug)]
pub struct Registry<T> {
    records: HashMap<EntityId, (u64, T)>,
    order: BTreeMap<u64, EntityId>,
    next_seq: u64,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T: Record> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. An id that is already present is rejected.
    pub fn insert(&mut self, record: T) -> Result<(), StoreError> {
        let id = record.id();
        if self.records.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.records.insert(id, (seq, record));
        Ok(())
    }

    /// Remove a record. Removing an absent id is a no-op returning `None`.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let (seq, record) = self.records.remove(&id)?;
        self.order.remove(&seq);
        Some(record)
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.records.get(&id).map(|(_, r)| r)
    }

    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.records.get_mut(&id).map(|(_, r)| r)
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order
            .values()
            .filter_map(move |id| self.records.get(id).map(|(_, r)| r))
    }

    /// Mutable access to every record, in no particular order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.records.values_mut().map(|(_, r)| r)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.order.values().copied().collect()
    }

    /// Remove every record for which `keep` returns false. Returns the
    /// removed records in insertion order.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let doomed: Vec<EntityId> = self
            .iter()
            .filter(|r| !keep(*r))
            .map(|r| r.id())
            .collect();
        doomed.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

/// All entities of one room.
#[derive(Debug, Default)]
pub struct EntityStore {
    pub players: Registry<Player>,
    pub food: Registry<Food>,
    pub projectiles: Registry<Projectile>,
    next_id: u32,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Allocate a room-unique entity id. Ids are never reused.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id.max(1));
        self.next_id = id.0.wrapping_add(1).max(1);
        id
    }

    /// Active plus pending-respawn food records.
    #[inline]
    pub fn food_population(&self) -> usize {
        self.food.len()
    }

    pub fn active_food(&self) -> usize {
        self.food.iter().filter(|f| f.is_active()).count()
    }

    /// Fragments whose origin is `origin`.
    pub fn fragments_of(&self, origin: EntityId) -> Vec<EntityId> {
        self.players
            .iter()
            .filter(|p| p.origin() == Some(origin))
            .map(|p| p.id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.food.clear();
        self.projectiles.clear();
    }
}
