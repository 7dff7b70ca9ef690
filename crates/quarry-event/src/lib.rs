#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]

//! Quarry Event System
//!
//! Typed, double-buffered world events.
//!
//! # Core Concept: One Tick of Latency
//!
//! Events scheduled during tick N are published by the world's end-of-tick
//! cleanup and observed during tick N+1:
//! - Executors built with [`EventSystemExt::for_each_event`] walk the
//!   published batch every tick
//! - Subscribers registered with [`EventListener::subscribe`] receive the
//!   batch once, during the cleanup of the tick that observed it
//! - A listener with nothing left to publish drops out of the update list
//!
//! # Example
//!
//! ```
//! use quarry_ecs::World;
//! use quarry_event::{EventSystemExt, EventWorldExt};
//! use quarry_query::{QueryResult, QuerySystem, SystemContext, SystemGroup};
//!
//! #[derive(Clone)]
//! struct Damage {
//!     amount: u32,
//! }
//!
//! struct Tally;
//!
//! impl QuerySystem for Tally {
//!     fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
//!         ctx.for_each_event(|damage: &Damage| assert_eq!(damage.amount, 10))?;
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! world.init_events().unwrap();
//!
//! let mut systems = SystemGroup::new();
//! systems.add(Tally);
//! systems.awake(&mut world).unwrap();
//!
//! world.schedule_event(Damage { amount: 10 });
//! systems.update(&mut world, 1.0 / 20.0).unwrap(); // published at the end
//! systems.update(&mut world, 1.0 / 20.0).unwrap(); // Tally sees it here
//! ```

mod error;
mod event;
mod feature;
mod listener;
mod system_ext;
mod world_ext;
mod writer;

pub use error::{EventError, EventResult};
pub use event::{EventWithEntity, WorldEvent};
pub use feature::{EventsConfig, EventsFeature};
pub use listener::{EventListener, ListenerPhase, SubscriptionId};
pub use system_ext::{EntityEventCallback, EventSystemExt, EventTargetCallback};
pub use world_ext::EventWorldExt;
pub use writer::EventWriter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        EventListener, EventSystemExt, EventWithEntity, EventWorldExt, EventWriter, WorldEvent,
    };
}
