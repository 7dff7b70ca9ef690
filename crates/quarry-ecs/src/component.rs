//! Component type identity.
//!
//! Every component type gets a small integer id the first time it is asked
//! for. Ids come from one process-wide table, so two worlds agree on them
//! and a `Filter` built against one world reads the same in another.

use std::{
    any::{TypeId, type_name},
    fmt,
    sync::OnceLock,
};

use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

/// Types that can live in a [`Stash`](crate::Stash).
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Process-wide id of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

#[derive(Default)]
struct TypeTable {
    ids: hashbrown::HashMap<TypeId, ComponentId, FxBuildHasher>,
    names: Vec<&'static str>,
}

fn type_table() -> &'static RwLock<TypeTable> {
    static TABLE: OnceLock<RwLock<TypeTable>> = OnceLock::new();
    TABLE.get_or_init(RwLock::default)
}

/// Next raw id after `assigned` ids have been handed out.
///
/// # Panics
///
/// Panics once the id space is exhausted. There is no way to recover a
/// world that registered more than `u32::MAX` component types.
fn next_raw_id(assigned: usize) -> u32 {
    match u32::try_from(assigned) {
        Ok(raw) if raw != u32::MAX => raw,
        _ => panic!("component id space exhausted after {assigned} types"),
    }
}

/// Id of component type `T`, assigning the next free one on first use.
///
/// # Panics
///
/// Panics if the process has exhausted the component id space.
pub fn component_id<T: Component>() -> ComponentId {
    let type_id = TypeId::of::<T>();

    if let Some(&id) = type_table().read().ids.get(&type_id) {
        return id;
    }

    let mut table = type_table().write();
    // another thread may have won the race between the two locks
    if let Some(&id) = table.ids.get(&type_id) {
        return id;
    }

    let id = ComponentId(next_raw_id(table.names.len()));
    table.ids.insert(type_id, id);
    table.names.push(type_name::<T>());
    id
}

/// Type name recorded for `id`, if it was ever assigned.
#[must_use]
pub fn component_name(id: ComponentId) -> Option<&'static str> {
    type_table().read().names.get(id.0 as usize).copied()
}

/// Component type known to a particular world.
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    id: ComponentId,
    name: &'static str,
}

impl ComponentInfo {
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: component_id::<T>(),
            name: type_name::<T>(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// The component types a world has created stashes for.
#[derive(Default)]
pub struct ComponentRegistry {
    infos: hashbrown::HashMap<ComponentId, ComponentInfo, FxBuildHasher>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `T` and return its id. Registering twice is a no-op.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        let info = ComponentInfo::of::<T>();
        let id = info.id();
        self.infos.entry(id).or_insert(info);
        id
    }

    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.infos.contains_key(&id)
    }

    #[must_use]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.values()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;
    struct Name(String);

    #[test]
    fn test_component_id_is_idempotent() {
        let first = component_id::<Position>();
        let second = component_id::<Position>();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_types_never_collide() {
        let ids = [
            component_id::<Position>(),
            component_id::<Velocity>(),
            component_id::<Name>(),
            component_id::<u64>(),
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_component_name_is_recorded() {
        let id = component_id::<Velocity>();
        let name = component_name(id).unwrap();
        assert!(name.ends_with("Velocity"));
    }

    #[test]
    fn test_ids_are_assigned_in_order() {
        assert_eq!(next_raw_id(0), 0);
        assert_eq!(next_raw_id(41), 41);
    }

    #[test]
    #[should_panic(expected = "component id space exhausted")]
    fn test_exhausted_id_space_is_fatal() {
        next_raw_id(u32::MAX as usize);
    }

    #[test]
    fn test_registry_registration_is_idempotent() {
        let mut registry = ComponentRegistry::new();

        let id1 = registry.register::<Position>();
        let id2 = registry.register::<Position>();
        registry.register::<Velocity>();

        assert_eq!(id1, id2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(id1));
        assert!(registry.get_info(id1).unwrap().name().ends_with("Position"));
    }
}
