//! World - entities, their stashes, compiled filters and features.
//!
//! Every structural change (spawn, despawn, attaching or detaching a
//! component) goes through the world so the [`FilterIndex`] can patch the
//! member lists of the filters that mention the changed component.
//!
//! Stashes sit behind their own `RwLock`, which lets an executor holding
//! `&World` write to several stashes at once. Structural changes need
//! `&mut World` and bypass the locks entirely.

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxBuildHasher;

use crate::{
    Component,
    component::{ComponentId, ComponentRegistry, component_id},
    config::WorldConfig,
    entity::{AliveIter, Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    feature::{FeatureRegistry, WorldFeature},
    filter::{ComponentMask, Filter, FilterId, FilterIndex},
    stash::{ErasedStash, Stash},
};

/// Shared, locked view of a stash.
pub type StashRef<'w, T> = MappedRwLockReadGuard<'w, Stash<T>>;

/// Exclusive, locked view of a stash.
pub type StashMut<'w, T> = MappedRwLockWriteGuard<'w, Stash<T>>;

type StashCell = RwLock<Box<dyn ErasedStash>>;

/// The container for all entities, stashes and features of one simulation.
pub struct World {
    config: WorldConfig,
    entities: EntityAllocator,
    /// Sorted component ids per entity slot.
    masks: Vec<ComponentMask>,
    components: ComponentRegistry,
    stashes: hashbrown::HashMap<ComponentId, StashCell, FxBuildHasher>,
    filters: FilterIndex,
    features: FeatureRegistry,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world with `config`.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.entity_capacity),
            masks: Vec::with_capacity(config.entity_capacity),
            components: ComponentRegistry::new(),
            stashes: hashbrown::HashMap::default(),
            filters: FilterIndex::default(),
            features: FeatureRegistry::default(),
            config,
        }
    }

    /// The configuration this world was created with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Component types this world has created stashes for.
    #[must_use]
    pub const fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    // ==================== Entity Operations ====================

    /// Spawn an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let index = entity.index();
        if index >= self.masks.len() {
            self.masks.resize_with(index + 1, ComponentMask::new);
        }
        self.masks[index].clear();
        self.filters.on_spawn(entity);
        entity
    }

    /// Spawn an entity carrying one component.
    pub fn spawn<T: Component>(&mut self, component: T) -> Entity {
        let entity = self.spawn_empty();
        self.attach(entity, component);
        entity
    }

    /// Despawn an entity and drop all its components.
    ///
    /// Returns `false` if the entity was already dead.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }

        let mask = std::mem::take(&mut self.masks[entity.index()]);
        for id in &mask {
            if let Some(stash) = self.stashes.get_mut(id) {
                stash.get_mut().remove_entity(entity);
            }
        }
        self.filters.on_despawn(entity, &mask);
        self.entities.deallocate(entity)
    }

    /// Check if `entity` is alive, i.e. not despawned and not a stale handle.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count() as usize
    }

    /// Live entities in slot order.
    pub fn entities(&self) -> AliveIter<'_> {
        self.entities.iter_alive()
    }

    /// Sorted ids of the components `entity` holds.
    #[must_use]
    pub fn component_mask(&self, entity: Entity) -> Option<&[ComponentId]> {
        self.is_alive(entity)
            .then(|| self.masks[entity.index()].as_slice())
    }

    // ==================== Component Operations ====================

    /// Make sure a stash for `T` exists, creating an empty one if needed.
    pub fn register_stash<T: Component>(&mut self) -> ComponentId {
        let id = self.components.register::<T>();
        self.stashes
            .entry(id)
            .or_insert_with(|| RwLock::new(Box::new(Stash::<T>::new())));
        id
    }

    fn attach<T: Component>(&mut self, entity: Entity, component: T) -> Option<T> {
        let id = self.register_stash::<T>();
        let previous = self
            .stashes
            .get_mut(&id)
            .and_then(|cell| cell.get_mut().as_any_mut().downcast_mut::<Stash<T>>())
            .and_then(|stash| stash.insert(entity, component));

        if previous.is_none() {
            let mask = &mut self.masks[entity.index()];
            if let Err(pos) = mask.binary_search(&id) {
                mask.insert(pos, id);
            }
            self.filters.on_component_changed(entity, mask, id);
        }
        previous
    }

    /// Attach `component` to `entity`, replacing and returning any previous
    /// value of the same type.
    pub fn add<T: Component>(&mut self, entity: Entity, component: T) -> EcsResult<Option<T>> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        Ok(self.attach(entity, component))
    }

    /// [`World::add`] without the previous value.
    pub fn set<T: Component>(&mut self, entity: Entity, component: T) -> EcsResult<()> {
        self.add(entity, component).map(drop)
    }

    /// Detach and return `T` from `entity`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        let id = component_id::<T>();
        let removed = self.stash_mut::<T>()?.remove(entity)?;

        let mask = &mut self.masks[entity.index()];
        if let Ok(pos) = mask.binary_search(&id) {
            mask.remove(pos);
        }
        self.filters.on_component_changed(entity, mask, id);
        Some(removed)
    }

    /// Check if `entity` currently has a `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.component_mask(entity)
            .is_some_and(|mask| mask.binary_search(&component_id::<T>()).is_ok())
    }

    /// Copy of `entity`'s `T`.
    #[must_use]
    pub fn get<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.stash::<T>()?.try_get(entity).cloned()
    }

    /// Mutable access to the `T` of `entity`, if it has one.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.stash_mut::<T>()?.try_get_mut(entity)
    }

    // ==================== Stash Access ====================

    /// Read-lock the stash for `T`, if one was ever created.
    #[must_use]
    pub fn stash<T: Component>(&self) -> Option<StashRef<'_, T>> {
        let cell = self.stashes.get(&component_id::<T>())?;
        RwLockReadGuard::try_map(cell.read(), |stash| {
            stash.as_any().downcast_ref::<Stash<T>>()
        })
        .ok()
    }

    /// Write-lock the stash for `T` through a shared world.
    ///
    /// Locking the same stash twice on one thread deadlocks; callers that
    /// lock several stashes must make sure the types are distinct.
    #[must_use]
    pub fn lock_stash_mut<T: Component>(&self) -> Option<StashMut<'_, T>> {
        let cell = self.stashes.get(&component_id::<T>())?;
        RwLockWriteGuard::try_map(cell.write(), |stash| {
            stash.as_any_mut().downcast_mut::<Stash<T>>()
        })
        .ok()
    }

    /// Unlocked access to the stash for `T`.
    pub fn stash_mut<T: Component>(&mut self) -> Option<&mut Stash<T>> {
        self.stashes
            .get_mut(&component_id::<T>())?
            .get_mut()
            .as_any_mut()
            .downcast_mut()
    }

    // ==================== Filters ====================

    /// Id of the compiled form of `filter`, compiling it on first use.
    ///
    /// # Panics
    ///
    /// Panics for the unfiltered filter, which is answered from the entity
    /// allocator instead.
    pub fn intern_filter(&mut self, filter: &Filter) -> FilterId {
        let masks = &self.masks;
        let population = self
            .entities
            .iter_alive()
            .map(|entity| (entity, masks[entity.index()].as_slice()));
        self.filters.intern(filter, population)
    }

    /// The index of every compiled filter.
    #[must_use]
    pub const fn filters(&self) -> &FilterIndex {
        &self.filters
    }

    /// Entities currently matching the compiled filter `id`.
    #[must_use]
    pub fn filter_members(&self, id: FilterId) -> &[Entity] {
        self.filters.members(id)
    }

    /// Check if `entity` currently matches the compiled filter `id`.
    #[must_use]
    pub fn filter_contains(&self, id: FilterId, entity: Entity) -> bool {
        self.filters.contains(id, entity)
    }

    // ==================== Features ====================

    /// Enable a feature. Each feature type can be enabled once per world.
    pub fn enable_feature<F: WorldFeature>(&mut self, feature: F) -> EcsResult<()> {
        self.features.enable(feature)
    }

    /// Dispose and remove a feature. Returns `false` if it was not enabled.
    pub fn disable_feature<F: WorldFeature>(&mut self) -> bool {
        self.features.disable::<F>()
    }

    /// The enabled feature of type `F`, if any.
    #[must_use]
    pub fn try_feature<F: WorldFeature>(&self) -> Option<&F> {
        self.features.get::<F>()
    }

    /// Mutable access to the enabled feature of type `F`.
    pub fn try_feature_mut<F: WorldFeature>(&mut self) -> Option<&mut F> {
        self.features.get_mut::<F>()
    }

    /// Check if a feature of type `F` is enabled.
    #[must_use]
    pub fn has_feature<F: WorldFeature>(&self) -> bool {
        self.features.get::<F>().is_some()
    }

    /// End-of-tick hook: runs every feature's cleanup once.
    pub fn cleanup_update(&mut self) -> EcsResult<()> {
        self.features.cleanup_update()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.features.dispose_all();
    }
}
