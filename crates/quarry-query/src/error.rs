//! Query and system configuration errors.

use quarry_ecs::{BoxError, EcsError};
use thiserror::Error;

/// Errors raised while declaring queries or driving systems.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query or executor was declared after the system finished
    /// configuring.
    #[error("system `{system}` has finished configuring; executors are fixed")]
    ConfigurationFinished { system: String },

    /// Requested components disagree with the query's filter.
    #[error("invalid query in system `{system}`: {}", problems.join("; "))]
    InvalidRequest {
        system: String,
        problems: Vec<String>,
    },

    /// The same component was requested twice by one executor.
    #[error("system `{system}` requests `{component}` more than once")]
    DuplicateComponent {
        system: String,
        component: &'static str,
    },

    /// Parallel iteration needs a filter to split.
    #[error("system `{system}` cannot run a parallel executor over an unfiltered query")]
    UnfilteredParallel { system: String },

    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// Failure raised by an extension, such as the event bindings.
    #[error(transparent)]
    Extension(BoxError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
