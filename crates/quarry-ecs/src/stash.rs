//! Per-component-type sparse storage.
//!
//! A [`Stash<T>`] is a sparse set: `sparse` maps an entity slot to a
//! position in the packed `entities`/`data` arrays. Removal swaps the last
//! element into the hole, so iteration order changes whenever the set of
//! entities holding `T` changes.
//!
//! Adding or removing a `T` while an iteration over `T` is in progress may
//! skip or repeat entities. The borrow checker rules this out for the
//! built-in executors; code that snapshots entities and mutates the world
//! in between has to live with it.

use std::any::{Any, type_name};

use crate::{Component, entity::Entity};

const EMPTY: u32 = u32::MAX;

/// Sparse-set storage for one component type.
pub struct Stash<T> {
    sparse: Vec<u32>,
    entities: Vec<Entity>,
    data: Vec<T>,
}

impl<T> Default for Stash<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stash<T> {
    /// Create an empty stash.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            data: Vec::new(),
        }
    }

    fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index())?;
        if slot == EMPTY {
            return None;
        }
        let slot = slot as usize;
        (self.entities[slot] == entity).then_some(slot)
    }

    /// Check if `entity` has a `T` in this stash.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    /// Component of an entity known to have one.
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no `T`. Use [`Stash::try_get`] when presence
    /// is not already established by a filter.
    #[must_use]
    pub fn get(&self, entity: Entity) -> &T {
        match self.try_get(entity) {
            Some(value) => value,
            None => panic!("{entity:?} has no {}", type_name::<T>()),
        }
    }

    /// Mutable variant of [`Stash::get`].
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no `T`.
    pub fn get_mut(&mut self, entity: Entity) -> &mut T {
        match self.try_get_mut(entity) {
            Some(value) => value,
            None => panic!("{entity:?} has no {}", type_name::<T>()),
        }
    }

    /// The `T` of `entity`, if present.
    #[must_use]
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|slot| &self.data[slot])
    }

    /// Mutable access to the `T` of `entity`, if present.
    pub fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|slot| &mut self.data[slot])
    }

    /// Number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the stash holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entities holding a `T`, in storage order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Iterate `(entity, &T)` in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.data.iter())
    }

    /// Iterate `(entity, &mut T)` in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.data.iter_mut())
    }

    /// Packed entities alongside their mutable data, for splitting across
    /// worker threads.
    pub fn dense_mut(&mut self) -> (&[Entity], &mut [T]) {
        (&self.entities, &mut self.data)
    }

    /// Attach or replace. Returns the previous value.
    pub(crate) fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slot(entity) {
            return Some(std::mem::replace(&mut self.data[slot], value));
        }

        let index = entity.index();
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, EMPTY);
        }
        self.sparse[index] = self.data.len() as u32;
        self.entities.push(entity);
        self.data.push(value);
        None
    }

    pub(crate) fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot(entity)?;

        self.sparse[entity.index()] = EMPTY;
        self.entities.swap_remove(slot);
        let value = self.data.swap_remove(slot);

        if let Some(&moved) = self.entities.get(slot) {
            self.sparse[moved.index()] = slot as u32;
        }
        Some(value)
    }
}

/// Type-erased view of a stash, so the world can drop components of a
/// despawned entity without knowing their types.
pub(crate) trait ErasedStash: Send + Sync {
    fn remove_entity(&mut self, entity: Entity) -> bool;

    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStash for Stash<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Generation;

    #[derive(Debug, PartialEq)]
    struct Health(u32);

    fn entity(id: u32) -> Entity {
        Entity::new(id, Generation::new())
    }

    #[test]
    fn test_insert_and_get() {
        let mut stash = Stash::new();
        assert!(stash.insert(entity(3), Health(10)).is_none());
        assert_eq!(stash.get(entity(3)), &Health(10));
        assert_eq!(stash.insert(entity(3), Health(7)), Some(Health(10)));
        assert_eq!(stash.len(), 1);
    }

    #[test]
    fn test_try_get_tracks_presence() {
        let mut stash = Stash::new();
        stash.insert(entity(0), Health(1));

        assert_eq!(stash.try_get(entity(0)), Some(&Health(1)));
        assert_eq!(stash.try_get(entity(1)), None);
        assert_eq!(stash.try_get(entity(100)), None);

        stash.remove(entity(0));
        assert_eq!(stash.try_get(entity(0)), None);
    }

    #[test]
    fn test_stale_generation_is_absent() {
        let mut stash = Stash::new();
        let old = entity(2);
        stash.insert(old, Health(5));

        let recycled = Entity::new(2, old.generation().next());
        assert!(!stash.contains(recycled));
        assert!(stash.contains(old));
    }

    #[test]
    fn test_remove_swaps_last_into_hole() {
        let mut stash = Stash::new();
        for id in 0..4 {
            stash.insert(entity(id), Health(id));
        }

        assert_eq!(stash.remove(entity(1)), Some(Health(1)));
        assert_eq!(stash.entities(), &[entity(0), entity(3), entity(2)]);
        assert_eq!(stash.get(entity(3)), &Health(3));
        assert_eq!(stash.get(entity(2)), &Health(2));
        assert_eq!(stash.remove(entity(1)), None);
    }

    #[test]
    fn test_iter_mut_updates_values() {
        let mut stash = Stash::new();
        stash.insert(entity(0), Health(1));
        stash.insert(entity(1), Health(2));

        for (_, health) in stash.iter_mut() {
            health.0 *= 10;
        }

        let values: Vec<_> = stash.iter().map(|(_, h)| h.0).collect();
        assert_eq!(values, vec![10, 20]);
    }

    #[test]
    #[should_panic(expected = "has no")]
    fn test_get_on_missing_panics() {
        let stash: Stash<Health> = Stash::new();
        let _ = stash.get(entity(0));
    }
}
