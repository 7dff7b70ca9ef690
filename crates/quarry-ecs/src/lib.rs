#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::len_without_is_empty)]

//! Quarry ECS - sparse-set Entity Component System core.
//!
//! # Key Concepts
//!
//! - **Entity**: generational handle to a row of component data
//! - **Component**: any `Send + Sync + 'static` type, identified by a
//!   process-wide [`ComponentId`]
//! - **Stash**: sparse-set storage for one component type
//! - **Filter**: included/excluded component sets, compiled once per world
//!   into a member list that is patched on every structural change
//! - **Feature**: optional per-world subsystem with an end-of-tick hook
//!
//! # Example
//!
//! ```
//! use quarry_ecs::{Filter, World};
//!
//! struct Position(f32);
//! struct Frozen;
//!
//! let mut world = World::new();
//! let moving = world.spawn(Position(0.0));
//! let frozen = world.spawn(Position(1.0));
//! world.set(frozen, Frozen).unwrap();
//!
//! let filter = Filter::builder()
//!     .with::<Position>()
//!     .without::<Frozen>()
//!     .build()
//!     .unwrap();
//! let id = world.intern_filter(&filter);
//! assert_eq!(world.filter_members(id), &[moving]);
//! ```

mod component;
mod config;
mod entity;
mod error;
mod feature;
mod filter;
mod stash;
mod world;

pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, component_id, component_name};
pub use config::{QueryGlobals, WorldConfig};
pub use entity::{AliveIter, Entity, EntityAllocator, EntityId, Generation};
pub use error::{BoxError, EcsError, EcsResult};
pub use feature::{FeatureRegistry, WorldFeature};
pub use filter::{ComponentMask, Filter, FilterBuilder, FilterId, FilterIndex};
pub use stash::Stash;
pub use world::{StashMut, StashRef, World};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Component, Entity, Filter, QueryGlobals, World, WorldConfig, WorldFeature};
}
