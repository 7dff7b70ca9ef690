//! Event errors.

use quarry_query::QueryError;
use thiserror::Error;

/// Errors raised by the event feature and its bindings.
#[derive(Debug, Error)]
pub enum EventError {
    /// The world has no [`EventsFeature`](crate::EventsFeature) enabled.
    #[error("the events feature is not enabled on this world")]
    FeatureDisabled,

    /// Per-tick event consumers need a system that updates every frame.
    #[error("system `{system}` does not update every frame and cannot use {binding}")]
    NotEveryFrame {
        system: String,
        binding: &'static str,
    },

    /// One or more subscribers panicked during dispatch.
    #[error("{count} event subscriber(s) panicked during dispatch")]
    SubscriberPanicked { count: usize },

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<EventError> for QueryError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Query(inner) => inner,
            other => QueryError::Extension(Box::new(other)),
        }
    }
}

/// Result type for event operations.
pub type EventResult<T> = Result<T, EventError>;
