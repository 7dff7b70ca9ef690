#![allow(clippy::module_name_repetitions)]
#![allow(clippy::type_complexity)]

//! Query declaration and execution for Quarry ECS.
//!
//! Systems declare their queries once while configuring. Each declaration
//! compiles a filter against the world, checks the requested components
//! against it and becomes an executor that the system's host runs every
//! tick.
//!
//! # Example
//!
//! ```
//! use quarry_ecs::World;
//! use quarry_query::{QueryResult, QuerySystem, SystemContext, SystemGroup};
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! struct Movement;
//!
//! impl QuerySystem for Movement {
//!     fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
//!         ctx.query()
//!             .with::<Position>()
//!             .with::<Velocity>()
//!             .for_each(|pos: &mut Position, vel: &mut Velocity| pos.0 += vel.0)?;
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! let entity = world.spawn(Position(0.0));
//! world.set(entity, Velocity(1.5)).unwrap();
//!
//! let mut systems = SystemGroup::new();
//! systems.add(Movement);
//! systems.awake(&mut world).unwrap();
//! systems.update(&mut world, 1.0 / 60.0).unwrap();
//!
//! assert_eq!(world.stash::<Position>().unwrap().get(entity).0, 1.5);
//! ```

mod builder;
mod callback;
mod compiled;
mod error;
mod parallel;
mod system;
mod validation;

pub use builder::QueryBuilder;
pub use callback::{ComponentSet, ForEachCallback, ForEachWithEntityCallback};
pub use compiled::{CompiledQuery, QueryIter};
pub use error::{QueryError, QueryResult};
pub use system::{Executor, QuerySystem, SystemContext, SystemGroup, SystemHost};
pub use validation::{Requested, RequestedSet, check_duplicates, validate_request};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{CompiledQuery, QueryResult, QuerySystem, SystemContext, SystemGroup};
}
