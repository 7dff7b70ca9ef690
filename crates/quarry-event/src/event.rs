//! Event payload types.

use quarry_ecs::Entity;

/// Any type that can be scheduled as a world event.
///
/// Blanket-implemented; there is nothing to derive.
pub trait WorldEvent: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> WorldEvent for T {}

/// An event addressed to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventWithEntity<T> {
    pub entity: Entity,
    pub data: T,
}

impl<T> EventWithEntity<T> {
    #[must_use]
    pub const fn new(entity: Entity, data: T) -> Self {
        Self { entity, data }
    }
}
