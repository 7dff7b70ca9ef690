//! World extension for events.

use quarry_ecs::{EcsResult, Entity, World};
use tracing::{trace, warn};

use crate::{
    error::{EventError, EventResult},
    event::{EventWithEntity, WorldEvent},
    feature::EventsFeature,
    listener::EventListener,
};

/// Extension trait for World to add event functionality.
pub trait EventWorldExt {
    /// Enable the events feature with default settings, unless it already
    /// is.
    fn init_events(&mut self) -> EcsResult<()>;

    fn events(&self) -> Option<&EventsFeature>;

    /// The listener for `T`, created on first request.
    fn create_event_listener<T: WorldEvent>(&self) -> EventResult<EventListener<T>>;

    /// Queue `event` for the end of this tick. Does nothing if no listener
    /// for `T` exists.
    fn schedule_event<T: WorldEvent>(&self, event: T);

    /// Queue an event addressed to `entity`. Does nothing if no listener
    /// for `EventWithEntity<T>` exists.
    fn schedule_event_for_entity<T: WorldEvent>(&self, entity: Entity, data: T);
}

impl EventWorldExt for World {
    fn init_events(&mut self) -> EcsResult<()> {
        if self.has_feature::<EventsFeature>() {
            return Ok(());
        }
        self.enable_feature(EventsFeature::new())
    }

    fn events(&self) -> Option<&EventsFeature> {
        self.try_feature::<EventsFeature>()
    }

    fn create_event_listener<T: WorldEvent>(&self) -> EventResult<EventListener<T>> {
        let Some(events) = self.events() else {
            warn!(event = std::any::type_name::<T>(), "events feature is not enabled");
            return Err(EventError::FeatureDisabled);
        };
        Ok(events.listener::<T>())
    }

    fn schedule_event<T: WorldEvent>(&self, event: T) {
        match self.events() {
            Some(events) => {
                events.schedule(event);
            }
            None => trace!(event = std::any::type_name::<T>(), "events feature disabled, event dropped"),
        }
    }

    fn schedule_event_for_entity<T: WorldEvent>(&self, entity: Entity, data: T) {
        self.schedule_event(EventWithEntity::new(entity, data));
    }
}
