//! The events world feature.

use std::{
    any::{Any, TypeId, type_name},
    sync::Arc,
};

use hashbrown::HashMap;
use parking_lot::Mutex;
use quarry_ecs::{BoxError, WorldFeature};
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace};

use crate::{
    error::EventError,
    event::WorldEvent,
    listener::{ActiveList, EventListener},
};

/// Settings for [`EventsFeature`].
#[derive(Clone, Debug)]
pub struct EventsConfig {
    /// Fail the cleanup hook when a subscriber panicked. Dispatch and
    /// buffer rotation still complete first.
    pub surface_subscriber_panics: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            surface_subscriber_panics: cfg!(debug_assertions),
        }
    }
}

/// Owns one [`EventListener`] per event type and drives them once per tick.
pub struct EventsFeature {
    config: EventsConfig,
    listeners: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>, FxBuildHasher>>,
    active: ActiveList,
}

impl Default for EventsFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl EventsFeature {
    /// Create the feature with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EventsConfig::default())
    }

    /// Create the feature with `config`.
    #[must_use]
    pub fn with_config(config: EventsConfig) -> Self {
        Self {
            config,
            listeners: Mutex::default(),
            active: Arc::default(),
        }
    }

    /// Settings this feature was created with.
    #[must_use]
    pub const fn config(&self) -> &EventsConfig {
        &self.config
    }

    /// The listener for `T`, created on first request.
    pub fn listener<T: WorldEvent>(&self) -> EventListener<T> {
        let mut listeners = self.listeners.lock();
        if let Some(existing) = listeners
            .get(&TypeId::of::<T>())
            .and_then(|listener| listener.downcast_ref::<EventListener<T>>())
        {
            return existing.clone();
        }

        let listener = EventListener::<T>::new(Arc::clone(&self.active));
        listeners.insert(TypeId::of::<T>(), Box::new(listener.clone()));
        debug!(event = type_name::<T>(), "created event listener");
        listener
    }

    /// The listener for `T`, if one was ever requested.
    #[must_use]
    pub fn try_listener<T: WorldEvent>(&self) -> Option<EventListener<T>> {
        self.listeners
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|listener| listener.downcast_ref::<EventListener<T>>())
            .cloned()
    }

    /// Schedule `event` if anything listens for `T`. Returns whether it was
    /// queued.
    pub fn schedule<T: WorldEvent>(&self, event: T) -> bool {
        match self.try_listener::<T>() {
            Some(listener) => {
                listener.schedule(event);
                true
            }
            None => {
                trace!(event = type_name::<T>(), "no listener, event dropped");
                false
            }
        }
    }

    /// Number of event types with a listener.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Listeners waiting for the next cleanup.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Update every active listener once. Returns the number of subscriber
    /// panics.
    pub fn update_listeners(&self) -> usize {
        let batch = std::mem::take(&mut *self.active.lock());
        let mut panicked = 0;

        for listener in batch {
            let outcome = listener.update();
            panicked += outcome.panicked;
            if outcome.stay_active {
                self.active.lock().push(listener);
            } else {
                trace!(event = listener.event_name(), "listener went idle");
            }
        }
        panicked
    }
}

impl WorldFeature for EventsFeature {
    fn on_cleanup_update(&mut self) -> Result<(), BoxError> {
        let panicked = self.update_listeners();
        if panicked > 0 && self.config.surface_subscriber_panics {
            return Err(Box::new(EventError::SubscriberPanicked { count: panicked }));
        }
        Ok(())
    }

    fn dispose(&mut self) {
        self.active.lock().clear();
        self.listeners.lock().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
