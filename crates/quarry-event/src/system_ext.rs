//! Event bindings for systems.
//!
//! Listeners and writers are resolved once while a system configures.
//! Executors built here run every tick but only do work on ticks where the
//! listener has published events.

use quarry_ecs::{Component, Entity, World};
use quarry_query::{ComponentSet, Executor, SystemContext, check_duplicates};

use crate::{
    error::{EventError, EventResult},
    event::{EventWithEntity, WorldEvent},
    listener::{EventListener, SubscriptionId},
    world_ext::EventWorldExt,
    writer::EventWriter,
};

/// `FnMut(Entity, &T, &mut A, ..)` over every published entity event whose
/// entity still holds the requested components.
pub trait EntityEventCallback<T: WorldEvent, S: ComponentSet>: Send + 'static {
    fn into_executor(self, listener: EventListener<EventWithEntity<T>>) -> Executor;
}

/// `FnMut(Entity, &mut A, ..)` over the entities addressed by published
/// events, without the payload.
pub trait EventTargetCallback<S: ComponentSet>: Send + 'static {
    fn into_executor<T: WorldEvent>(self, listener: EventListener<EventWithEntity<T>>) -> Executor;
}

impl<Func, T> EntityEventCallback<T, ()> for Func
where
    T: WorldEvent,
    Func: FnMut(Entity, &T) + Send + 'static,
{
    fn into_executor(self, listener: EventListener<EventWithEntity<T>>) -> Executor {
        let mut callback = self;
        Box::new(move |world: &mut World| {
            if !listener.has_published_events() {
                return;
            }
            for event in listener.published().iter() {
                if world.is_alive(event.entity) {
                    callback(event.entity, &event.data);
                }
            }
        })
    }
}

impl<Func> EventTargetCallback<()> for Func
where
    Func: FnMut(Entity) + Send + 'static,
{
    fn into_executor<T: WorldEvent>(self, listener: EventListener<EventWithEntity<T>>) -> Executor {
        let mut callback = self;
        Box::new(move |world: &mut World| {
            if !listener.has_published_events() {
                return;
            }
            for event in listener.published().iter() {
                if world.is_alive(event.entity) {
                    callback(event.entity);
                }
            }
        })
    }
}

/// Walk `$events`, binding each requested component of the event's entity
/// or skipping the event when one is missing.
macro_rules! for_each_present {
    ($world:ident, $events:ident, |$event:ident| ($(($ty:ident, $var:ident)),+) $body:expr) => {
        $(let Some(mut $var) = $world.lock_stash_mut::<$ty>() else {
            return;
        };)+
        for $event in $events.iter() {
            let ($(Some($var),)+) = ($($var.try_get_mut($event.entity),)+) else {
                continue;
            };
            $body;
        }
    };
}

macro_rules! impl_entity_event_callback {
    ($(($ty:ident, $var:ident)),+) => {
        impl<Func, T, $($ty: Component),+> EntityEventCallback<T, ($($ty,)+)> for Func
        where
            T: WorldEvent,
            Func: FnMut(Entity, &T, $(&mut $ty),+) + Send + 'static,
        {
            fn into_executor(self, listener: EventListener<EventWithEntity<T>>) -> Executor {
                let mut callback = self;
                Box::new(move |world: &mut World| {
                    if !listener.has_published_events() {
                        return;
                    }
                    let events = listener.published();
                    let world = &*world;
                    for_each_present!(world, events, |event| ($(($ty, $var)),+) {
                        callback(event.entity, &event.data, $($var),+)
                    });
                })
            }
        }

        impl<Func, $($ty: Component),+> EventTargetCallback<($($ty,)+)> for Func
        where
            Func: FnMut(Entity, $(&mut $ty),+) + Send + 'static,
        {
            fn into_executor<T: WorldEvent>(
                self,
                listener: EventListener<EventWithEntity<T>>,
            ) -> Executor {
                let mut callback = self;
                Box::new(move |world: &mut World| {
                    if !listener.has_published_events() {
                        return;
                    }
                    let events = listener.published();
                    let world = &*world;
                    for_each_present!(world, events, |event| ($(($ty, $var)),+) {
                        callback(event.entity, $($var),+)
                    });
                })
            }
        }
    };
}

quarry_query::for_every_arity!(impl_entity_event_callback);

/// Event bindings available while a system configures.
pub trait EventSystemExt {
    /// The world's listener for `T`.
    fn event_listener<T: WorldEvent>(&mut self) -> EventResult<EventListener<T>>;

    /// The world's listener for events addressed to entities.
    fn entity_event_listener<T: WorldEvent>(
        &mut self,
    ) -> EventResult<EventListener<EventWithEntity<T>>>;

    fn event_writer<T: WorldEvent>(&mut self) -> EventResult<EventWriter<T>>;

    /// Writer for entity-addressed events. Only for systems that update
    /// every frame.
    fn entity_event_writer<T: WorldEvent>(
        &mut self,
    ) -> EventResult<EventWriter<EventWithEntity<T>>>;

    /// Run `callback` for each published `T`, every tick.
    fn for_each_event<T, F>(&mut self, callback: F) -> EventResult<EventListener<T>>
    where
        T: WorldEvent,
        F: FnMut(&T) + Send + 'static;

    /// Run `callback` for each published entity event whose entity holds
    /// every component of `S`; other events are skipped.
    fn for_each_entity_event<T, S, F>(
        &mut self,
        callback: F,
    ) -> EventResult<EventListener<EventWithEntity<T>>>
    where
        T: WorldEvent,
        S: ComponentSet,
        F: EntityEventCallback<T, S>;

    /// [`EventSystemExt::for_each_entity_event`] without the payload: the
    /// callback gets the addressed entity and its components. Name the event
    /// type explicitly, e.g. `for_each_event_target::<Hit, _, _>(..)`.
    fn for_each_event_target<T, S, F>(
        &mut self,
        callback: F,
    ) -> EventResult<EventListener<EventWithEntity<T>>>
    where
        T: WorldEvent,
        S: ComponentSet,
        F: EventTargetCallback<S>;

    /// Subscribe to whole batches of `T`. The subscription ends when the
    /// system is disposed.
    fn for_all_events<T, F>(&mut self, callback: F) -> EventResult<SubscriptionId>
    where
        T: WorldEvent,
        F: FnMut(&[T]) + Send + 'static;
}

fn require_every_frame(ctx: &SystemContext<'_>, binding: &'static str) -> EventResult<()> {
    if ctx.updates_every_frame() {
        return Ok(());
    }
    Err(EventError::NotEveryFrame {
        system: ctx.system_name().to_owned(),
        binding,
    })
}

impl EventSystemExt for SystemContext<'_> {
    fn event_listener<T: WorldEvent>(&mut self) -> EventResult<EventListener<T>> {
        self.ensure_configuring()?;
        self.world_ref().create_event_listener::<T>()
    }

    fn entity_event_listener<T: WorldEvent>(
        &mut self,
    ) -> EventResult<EventListener<EventWithEntity<T>>> {
        self.event_listener::<EventWithEntity<T>>()
    }

    fn event_writer<T: WorldEvent>(&mut self) -> EventResult<EventWriter<T>> {
        self.event_listener::<T>().map(EventWriter::new)
    }

    fn entity_event_writer<T: WorldEvent>(
        &mut self,
    ) -> EventResult<EventWriter<EventWithEntity<T>>> {
        require_every_frame(self, "entity event writers")?;
        self.entity_event_listener::<T>().map(EventWriter::new)
    }

    fn for_each_event<T, F>(&mut self, mut callback: F) -> EventResult<EventListener<T>>
    where
        T: WorldEvent,
        F: FnMut(&T) + Send + 'static,
    {
        require_every_frame(self, "event executors")?;
        let listener = self.event_listener::<T>()?;

        let executor_listener = listener.clone();
        self.add_executor(move |_world: &mut World| {
            if !executor_listener.has_published_events() {
                return;
            }
            for event in executor_listener.published().iter() {
                callback(event);
            }
        })?;
        Ok(listener)
    }

    fn for_each_entity_event<T, S, F>(
        &mut self,
        callback: F,
    ) -> EventResult<EventListener<EventWithEntity<T>>>
    where
        T: WorldEvent,
        S: ComponentSet,
        F: EntityEventCallback<T, S>,
    {
        require_every_frame(self, "entity event executors")?;
        check_duplicates(self.system_name(), &S::requested())?;
        let listener = self.entity_event_listener::<T>()?;
        S::register_stashes(self.world());
        self.add_executor(callback.into_executor(listener.clone()))?;
        Ok(listener)
    }

    fn for_each_event_target<T, S, F>(
        &mut self,
        callback: F,
    ) -> EventResult<EventListener<EventWithEntity<T>>>
    where
        T: WorldEvent,
        S: ComponentSet,
        F: EventTargetCallback<S>,
    {
        require_every_frame(self, "entity event executors")?;
        check_duplicates(self.system_name(), &S::requested())?;
        let listener = self.entity_event_listener::<T>()?;
        S::register_stashes(self.world());
        self.add_executor(callback.into_executor(listener.clone()))?;
        Ok(listener)
    }

    fn for_all_events<T, F>(&mut self, callback: F) -> EventResult<SubscriptionId>
    where
        T: WorldEvent,
        F: FnMut(&[T]) + Send + 'static,
    {
        let listener = self.event_listener::<T>()?;
        let id = listener.subscribe(callback);

        self.on_dispose(move || {
            listener.unsubscribe(id);
        })?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use quarry_query::{QueryError, QueryResult, QuerySystem, SystemHost};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Hit(u32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    struct Sluggish;

    impl QuerySystem for Sluggish {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            ctx.for_each_event(|_hit: &Hit| {})?;
            Ok(())
        }

        fn updates_every_frame(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_per_tick_bindings_need_every_frame_systems() {
        let mut world = World::new();
        world.init_events().unwrap();

        let mut host = SystemHost::new(Sluggish);
        let err = host.awake(&mut world).unwrap_err();
        let inner = match err {
            QueryError::Extension(inner) => inner,
            other => panic!("unexpected error: {other}"),
        };
        assert!(matches!(
            inner.downcast_ref::<EventError>(),
            Some(EventError::NotEveryFrame { .. })
        ));
        assert_eq!(host.executor_count(), 0);
    }

    #[test]
    fn test_plain_writer_allowed_for_sluggish_systems() {
        let mut world = World::new();
        world.init_events().unwrap();

        let mut host = SystemHost::new(Sluggish);
        let mut ctx = host.context(&mut world);
        assert!(ctx.event_writer::<Hit>().is_ok());
        assert!(matches!(
            ctx.entity_event_writer::<Hit>(),
            Err(EventError::NotEveryFrame { .. })
        ));
    }

    #[test]
    fn test_bindings_fail_without_feature() {
        let mut world = World::new();
        let mut host = SystemHost::new(Sluggish);
        let mut ctx = host.context(&mut world);
        assert!(matches!(
            ctx.event_listener::<Hit>(),
            Err(EventError::FeatureDisabled)
        ));
    }

    struct Medic {
        seen: Arc<Mutex<Vec<(Entity, u32)>>>,
    }

    impl QuerySystem for Medic {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let seen = Arc::clone(&self.seen);
            ctx.for_each_entity_event(move |entity: Entity, hit: &Hit, health: &mut Health| {
                health.0 = health.0.saturating_sub(hit.0);
                seen.lock().push((entity, health.0));
            })?;
            Ok(())
        }
    }

    #[test]
    fn test_entity_events_skip_entities_without_components() {
        let mut world = World::new();
        world.init_events().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut host = SystemHost::new(Medic {
            seen: Arc::clone(&seen),
        });
        host.awake(&mut world).unwrap();

        let tough = world.spawn(Health(30));
        let ghost = world.spawn_empty();
        world.schedule_event_for_entity(tough, Hit(10));
        world.schedule_event_for_entity(ghost, Hit(10));
        world.cleanup_update().unwrap();

        host.update(&mut world, 0.0);
        assert_eq!(*seen.lock(), vec![(tough, 20)]);
        assert_eq!(world.get::<Health>(tough), Some(Health(20)));

        // Published batch is gone after the next cleanup.
        world.cleanup_update().unwrap();
        host.update(&mut world, 0.0);
        assert_eq!(seen.lock().len(), 1);
    }

    struct Armor(u32);

    struct Twice;

    impl QuerySystem for Twice {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            ctx.for_each_entity_event(
                |_entity: Entity, _hit: &Hit, _a: &mut Health, _b: &mut Health| {},
            )?;
            Ok(())
        }
    }

    #[test]
    fn test_entity_events_reject_duplicate_components() {
        let mut world = World::new();
        world.init_events().unwrap();

        let mut host = SystemHost::new(Twice);
        let err = host.awake(&mut world).unwrap_err();
        assert!(matches!(err, QueryError::DuplicateComponent { .. }));
        assert_eq!(host.executor_count(), 0);

        let mut other = SystemHost::new(Twice);
        let mut ctx = other.context(&mut world);
        let err = ctx
            .for_each_event_target::<Hit, _, _>(
                |_entity: Entity, _a: &mut Armor, _b: &mut Armor| {},
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EventError::Query(QueryError::DuplicateComponent { .. })
        ));
    }

    struct Repair {
        touched: Arc<Mutex<Vec<Entity>>>,
    }

    impl QuerySystem for Repair {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let touched = Arc::clone(&self.touched);
            ctx.for_each_event_target::<Hit, _, _>(move |entity: Entity, armor: &mut Armor| {
                armor.0 += 1;
                touched.lock().push(entity);
            })?;

            let touched = Arc::clone(&self.touched);
            ctx.for_each_event_target::<Hit, _, _>(move |entity: Entity| {
                touched.lock().push(entity);
            })?;
            Ok(())
        }
    }

    #[test]
    fn test_event_targets_without_payload() {
        let mut world = World::new();
        world.init_events().unwrap();
        let touched = Arc::new(Mutex::new(Vec::new()));

        let mut host = SystemHost::new(Repair {
            touched: Arc::clone(&touched),
        });
        host.awake(&mut world).unwrap();

        let plated = world.spawn(Armor(1));
        let bare = world.spawn_empty();
        world.schedule_event_for_entity(plated, Hit(3));
        world.schedule_event_for_entity(bare, Hit(3));
        world.cleanup_update().unwrap();

        host.update(&mut world, 0.0);
        assert_eq!(*touched.lock(), vec![plated, plated, bare]);
        assert_eq!(world.stash::<Armor>().unwrap().get(plated).0, 2);
    }

    struct Bystander {
        seen: Arc<Mutex<Vec<Entity>>>,
    }

    impl QuerySystem for Bystander {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let seen = Arc::clone(&self.seen);
            ctx.for_each_entity_event(move |entity: Entity, _hit: &Hit| seen.lock().push(entity))?;
            Ok(())
        }
    }

    #[test]
    fn test_entity_events_without_components_skip_dead_entities() {
        let mut world = World::new();
        world.init_events().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut host = SystemHost::new(Bystander {
            seen: Arc::clone(&seen),
        });
        host.awake(&mut world).unwrap();

        let alive = world.spawn_empty();
        let doomed = world.spawn_empty();
        world.schedule_event_for_entity(alive, Hit(1));
        world.schedule_event_for_entity(doomed, Hit(1));
        world.cleanup_update().unwrap();
        world.despawn(doomed);

        host.update(&mut world, 0.0);
        assert_eq!(*seen.lock(), vec![alive]);
    }

    struct Auditor {
        batches: Arc<Mutex<Vec<Vec<Hit>>>>,
    }

    impl QuerySystem for Auditor {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let batches = Arc::clone(&self.batches);
            ctx.for_all_events(move |hits: &[Hit]| batches.lock().push(hits.to_vec()))?;
            Ok(())
        }

        fn updates_every_frame(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_batch_subscription_ends_with_the_system() {
        let mut world = World::new();
        world.init_events().unwrap();
        let batches = Arc::new(Mutex::new(Vec::new()));

        let mut host = SystemHost::new(Auditor {
            batches: Arc::clone(&batches),
        });
        host.awake(&mut world).unwrap();
        let listener = world.create_event_listener::<Hit>().unwrap();
        assert_eq!(listener.subscriber_count(), 1);

        world.schedule_event(Hit(1));
        world.schedule_event(Hit(2));
        world.cleanup_update().unwrap();
        assert!(batches.lock().is_empty());
        world.cleanup_update().unwrap();
        assert_eq!(*batches.lock(), vec![vec![Hit(1), Hit(2)]]);

        host.dispose();
        assert_eq!(listener.subscriber_count(), 0);

        world.schedule_event(Hit(3));
        world.cleanup_update().unwrap();
        world.cleanup_update().unwrap();
        assert_eq!(batches.lock().len(), 1);
    }

    #[test]
    fn test_writer_schedules_through_shared_listener() {
        let mut world = World::new();
        world.init_events().unwrap();

        let mut host = SystemHost::new(Medic {
            seen: Arc::default(),
        });
        let writer = host.context(&mut world).entity_event_writer::<Hit>().unwrap();
        let target = world.spawn(Health(5));
        writer.write_for(target, Hit(2));

        let listener = world.create_event_listener::<EventWithEntity<Hit>>().unwrap();
        assert!(writer.listener().same_listener(&listener));
        assert_eq!(listener.scheduled_len(), 1);
    }
}
