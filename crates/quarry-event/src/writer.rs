//! Typed write handles for systems.

use quarry_ecs::Entity;

use crate::{
    event::{EventWithEntity, WorldEvent},
    listener::EventListener,
};

/// Schedules events of type `T`. Handed out to systems while they
/// configure, then captured by their executors.
pub struct EventWriter<T: WorldEvent> {
    listener: EventListener<T>,
}

impl<T: WorldEvent> Clone for EventWriter<T> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
        }
    }
}

impl<T: WorldEvent> EventWriter<T> {
    pub(crate) const fn new(listener: EventListener<T>) -> Self {
        Self { listener }
    }

    /// Schedule `event` for publication at the end of this tick.
    pub fn write(&self, event: T) {
        self.listener.schedule(event);
    }

    /// Schedule every event in `events`.
    pub fn write_all(&self, events: impl IntoIterator<Item = T>) {
        self.listener.schedule_all(events);
    }

    /// The listener this writer schedules into.
    #[must_use]
    pub const fn listener(&self) -> &EventListener<T> {
        &self.listener
    }
}

impl<T: WorldEvent> EventWriter<EventWithEntity<T>> {
    /// Schedule `data` addressed to `entity`.
    pub fn write_for(&self, entity: Entity, data: T) {
        self.listener.schedule(EventWithEntity::new(entity, data));
    }
}
