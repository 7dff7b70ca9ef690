//! ECS error types.

use thiserror::Error;

use crate::entity::Entity;

/// Boxed error returned by world features.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the world and its filters.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The entity was despawned or never existed.
    #[error("entity {0:?} is not alive")]
    DeadEntity(Entity),

    /// A filter both requires and excludes the same components.
    #[error("filter both requires and excludes: {components}")]
    ConflictingFilter { components: String },

    /// A feature of this type is already enabled on the world.
    #[error("feature `{0}` is already enabled")]
    FeatureAlreadyEnabled(&'static str),

    /// A feature's cleanup hook failed.
    #[error("feature `{name}` failed during cleanup")]
    Feature {
        name: &'static str,
        #[source]
        source: BoxError,
    },
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
