//! Filters and the world's index of their matching entities.
//!
//! A [`Filter`] is a canonical pair of sorted, deduplicated id sets, so two
//! filters built from the same `with`/`without` calls in any order compare
//! equal and share one entry in the [`FilterIndex`]. Each entry keeps a
//! packed member list that is patched on every component add/remove rather
//! than rebuilt.

use std::fmt;

use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    Component,
    component::{ComponentId, component_id, component_name},
    entity::Entity,
    error::{EcsError, EcsResult},
};

/// Sorted component ids attached to one entity.
pub type ComponentMask = SmallVec<[ComponentId; 8]>;

type IdSet = SmallVec<[ComponentId; 4]>;

fn insert_sorted(set: &mut IdSet, id: ComponentId) {
    if let Err(pos) = set.binary_search(&id) {
        set.insert(pos, id);
    }
}

/// Included and excluded component sets describing a query.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    included: IdSet,
    excluded: IdSet,
}

impl Filter {
    /// Start an empty filter.
    #[must_use]
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// The filter with no terms, matching every live entity.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self::default()
    }

    /// Components a matching entity must have, sorted.
    #[must_use]
    pub fn included(&self) -> &[ComponentId] {
        &self.included
    }

    /// Components a matching entity must not have, sorted.
    #[must_use]
    pub fn excluded(&self) -> &[ComponentId] {
        &self.excluded
    }

    /// True when both sets are empty, i.e. the filter matches every live entity.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    /// Check if `id` is required.
    #[must_use]
    pub fn includes(&self, id: ComponentId) -> bool {
        self.included.binary_search(&id).is_ok()
    }

    /// Check if `id` is forbidden.
    #[must_use]
    pub fn excludes(&self, id: ComponentId) -> bool {
        self.excluded.binary_search(&id).is_ok()
    }

    /// Whether an entity with the sorted component `mask` satisfies this
    /// filter.
    #[must_use]
    pub fn matches(&self, mask: &[ComponentId]) -> bool {
        self.included
            .iter()
            .all(|id| mask.binary_search(id).is_ok())
            && !self
                .excluded
                .iter()
                .any(|id| mask.binary_search(id).is_ok())
    }

    fn mentioned(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.included.iter().chain(self.excluded.iter()).copied()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ids: &IdSet| -> Vec<&'static str> {
            ids.iter()
                .map(|&id| component_name(id).unwrap_or("?"))
                .collect()
        };
        f.debug_struct("Filter")
            .field("with", &names(&self.included))
            .field("without", &names(&self.excluded))
            .finish()
    }
}

/// Accumulates `with`/`without` terms. Repeating a term is a no-op.
#[derive(Clone, Debug, Default)]
pub struct FilterBuilder {
    included: IdSet,
    excluded: IdSet,
}

impl FilterBuilder {
    /// Require `T`.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.with_id(component_id::<T>())
    }

    /// Forbid `T`.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.without_id(component_id::<T>())
    }

    /// Require the component with id `id`.
    #[must_use]
    pub fn with_id(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.included, id);
        self
    }

    /// Forbid the component with id `id`.
    #[must_use]
    pub fn without_id(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.excluded, id);
        self
    }

    /// Check if `id` has been required so far.
    #[must_use]
    pub fn is_included(&self, id: ComponentId) -> bool {
        self.included.binary_search(&id).is_ok()
    }

    /// Check if `id` has been forbidden so far.
    #[must_use]
    pub fn is_excluded(&self, id: ComponentId) -> bool {
        self.excluded.binary_search(&id).is_ok()
    }

    /// Finish the filter. A component both required and excluded can never
    /// match anything and is rejected.
    pub fn build(self) -> EcsResult<Filter> {
        let conflicts: Vec<&'static str> = self
            .included
            .iter()
            .filter(|id| self.excluded.binary_search(id).is_ok())
            .map(|&id| component_name(id).unwrap_or("?"))
            .collect();

        if !conflicts.is_empty() {
            return Err(EcsError::ConflictingFilter {
                components: conflicts.join(", "),
            });
        }

        Ok(Filter {
            included: self.included,
            excluded: self.excluded,
        })
    }
}

/// Handle to an interned filter in a world's [`FilterIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterId(u32);

impl FilterId {
    /// Raw index of this filter in its world.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

const NOT_MEMBER: u32 = u32::MAX;

struct FilterEntry {
    filter: Filter,
    members: Vec<Entity>,
    /// Entity slot -> position in `members`.
    positions: Vec<u32>,
}

impl FilterEntry {
    fn new(filter: Filter) -> Self {
        Self {
            filter,
            members: Vec::new(),
            positions: Vec::new(),
        }
    }

    fn contains(&self, entity: Entity) -> bool {
        self.positions
            .get(entity.index())
            .is_some_and(|&pos| pos != NOT_MEMBER && self.members[pos as usize] == entity)
    }

    fn insert(&mut self, entity: Entity) {
        if self.contains(entity) {
            return;
        }
        let index = entity.index();
        if index >= self.positions.len() {
            self.positions.resize(index + 1, NOT_MEMBER);
        }
        self.positions[index] = self.members.len() as u32;
        self.members.push(entity);
    }

    fn remove(&mut self, entity: Entity) {
        if !self.contains(entity) {
            return;
        }
        let pos = self.positions[entity.index()] as usize;
        self.positions[entity.index()] = NOT_MEMBER;
        self.members.swap_remove(pos);
        if let Some(&moved) = self.members.get(pos) {
            self.positions[moved.index()] = pos as u32;
        }
    }

    fn sync(&mut self, entity: Entity, mask: &[ComponentId]) {
        if self.filter.matches(mask) {
            self.insert(entity);
        } else {
            self.remove(entity);
        }
    }
}

/// Every filter a world has compiled, with live member lists.
#[derive(Default)]
pub struct FilterIndex {
    entries: Vec<FilterEntry>,
    lookup: hashbrown::HashMap<Filter, FilterId, FxBuildHasher>,
    /// Filters mentioning a component, in either set.
    by_component: hashbrown::HashMap<ComponentId, SmallVec<[FilterId; 4]>, FxBuildHasher>,
    /// Filters with an empty included set; these can match a bare entity.
    exclusion_only: SmallVec<[FilterId; 4]>,
}

impl FilterIndex {
    /// Return the id of an equivalent filter, or register `filter` and fill
    /// its member list from `population`.
    ///
    /// # Panics
    ///
    /// Panics if called with the unfiltered filter, which has no entry.
    pub(crate) fn intern<'a>(
        &mut self,
        filter: &Filter,
        population: impl Iterator<Item = (Entity, &'a [ComponentId])>,
    ) -> FilterId {
        assert!(
            !filter.is_unfiltered(),
            "the unfiltered filter enumerates live entities directly"
        );

        if let Some(&id) = self.lookup.get(filter) {
            return id;
        }

        let id = FilterId(self.entries.len() as u32);
        let mut entry = FilterEntry::new(filter.clone());
        for (entity, mask) in population {
            if filter.matches(mask) {
                entry.insert(entity);
            }
        }

        debug!(?filter, members = entry.members.len(), "compiled filter");

        for component in filter.mentioned() {
            self.by_component.entry(component).or_default().push(id);
        }
        if filter.included.is_empty() {
            self.exclusion_only.push(id);
        }
        self.lookup.insert(filter.clone(), id);
        self.entries.push(entry);
        id
    }

    /// Id of an already compiled filter equivalent to `filter`.
    #[must_use]
    pub fn get(&self, filter: &Filter) -> Option<FilterId> {
        self.lookup.get(filter).copied()
    }

    /// The filter compiled under `id`.
    #[must_use]
    pub fn filter(&self, id: FilterId) -> &Filter {
        &self.entries[id.0 as usize].filter
    }

    /// Entities currently matching `id`, in insertion order.
    #[must_use]
    pub fn members(&self, id: FilterId) -> &[Entity] {
        &self.entries[id.0 as usize].members
    }

    /// Check if `entity` currently matches `id`.
    #[must_use]
    pub fn contains(&self, id: FilterId, entity: Entity) -> bool {
        self.entries[id.0 as usize].contains(entity)
    }

    /// Number of compiled filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no filter has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn on_spawn(&mut self, entity: Entity) {
        for &id in &self.exclusion_only {
            self.entries[id.0 as usize].insert(entity);
        }
    }

    /// `component` was attached to or detached from `entity`, whose mask is
    /// now `mask`.
    pub(crate) fn on_component_changed(
        &mut self,
        entity: Entity,
        mask: &[ComponentId],
        component: ComponentId,
    ) {
        let Some(ids) = self.by_component.get(&component) else {
            return;
        };
        for &id in ids {
            self.entries[id.0 as usize].sync(entity, mask);
        }
    }

    /// Drop `entity` from every filter it could belong to, given its final
    /// mask.
    pub(crate) fn on_despawn(&mut self, entity: Entity, mask: &[ComponentId]) {
        for component in mask {
            if let Some(ids) = self.by_component.get(component) {
                for &id in ids {
                    self.entries[id.0 as usize].remove(entity);
                }
            }
        }
        for &id in &self.exclusion_only {
            self.entries[id.0 as usize].remove(entity);
        }
    }
}
