//! Systems, their executors and a minimal sequential scheduler.
//!
//! A [`QuerySystem`] declares its queries once in
//! [`configure`](QuerySystem::configure). Each declaration becomes an
//! [`Executor`] owned by the system's [`SystemHost`]; after configuration
//! the executor list is frozen and runs in registration order every tick.

use std::any::type_name;

use quarry_ecs::World;
use tracing::{debug, trace, warn};

use crate::{
    builder::QueryBuilder,
    error::{QueryError, QueryResult},
};

/// A bound per-tick body, usually one query's iteration.
pub type Executor = Box<dyn FnMut(&mut World) + Send>;

type Disposer = Box<dyn FnOnce() + Send>;

/// A unit of game logic built from queries.
pub trait QuerySystem: Send + 'static {
    /// Name used in logs and configuration errors.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Declare queries and executors. Called once.
    fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()>;

    /// Systems that skip ticks cannot consume per-tick events.
    fn updates_every_frame(&self) -> bool {
        true
    }

    /// Runs every tick before the executors.
    fn on_update(&mut self, _world: &mut World, _delta: f32) {}

    /// Runs once when the host is disposed.
    fn dispose(&mut self) {}
}

/// Per-system bookkeeping shared by the host and its configuration context.
struct HostState {
    name: String,
    every_frame: bool,
    configured: bool,
    disposed: bool,
    executors: Vec<Executor>,
    disposers: Vec<Disposer>,
}

impl HostState {
    fn ensure_configuring(&self) -> QueryResult<()> {
        if self.configured {
            return Err(QueryError::ConfigurationFinished {
                system: self.name.clone(),
            });
        }
        Ok(())
    }

    fn push_executor(&mut self, executor: Executor) -> QueryResult<()> {
        self.ensure_configuring()?;
        self.executors.push(executor);
        trace!(system = %self.name, count = self.executors.len(), "registered executor");
        Ok(())
    }
}

/// Handle a system uses to declare queries while it is configuring.
pub struct SystemContext<'w> {
    world: &'w mut World,
    state: &'w mut HostState,
}

impl<'w> SystemContext<'w> {
    /// Start a query declaration.
    pub fn query(&mut self) -> QueryBuilder<'_, 'w> {
        QueryBuilder::new(self)
    }

    /// Mutable access to the world being configured.
    pub fn world(&mut self) -> &mut World {
        self.world
    }

    /// Shared access to the world being configured.
    #[must_use]
    pub fn world_ref(&self) -> &World {
        self.world
    }

    /// Name of the configuring system.
    #[must_use]
    pub fn system_name(&self) -> &str {
        &self.state.name
    }

    /// Check if the configuring system ticks every frame.
    #[must_use]
    pub fn updates_every_frame(&self) -> bool {
        self.state.every_frame
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.configured
    }

    /// Fail with [`QueryError::ConfigurationFinished`] once the executor
    /// list is frozen.
    pub fn ensure_configuring(&self) -> QueryResult<()> {
        self.state.ensure_configuring()
    }

    /// Register a raw executor.
    pub fn add_executor<F>(&mut self, executor: F) -> QueryResult<()>
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        self.push_executor(Box::new(executor))
    }

    pub(crate) fn push_executor(&mut self, executor: Executor) -> QueryResult<()> {
        self.state.push_executor(executor)
    }

    /// Register a job body. Jobs run to completion inside the tick, at
    /// their position in the executor list.
    pub fn schedule_job<F>(&mut self, job: F) -> QueryResult<()>
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        debug!(system = %self.state.name, job = type_name::<F>(), "scheduled job");
        self.add_executor(job)
    }

    /// Run `f` when the owning host is disposed. Only allowed while
    /// configuring.
    pub fn on_dispose<F>(&mut self, f: F) -> QueryResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.ensure_configuring()?;
        self.state.disposers.push(Box::new(f));
        Ok(())
    }
}

/// Owns a system and the executors it declared.
pub struct SystemHost {
    system: Box<dyn QuerySystem>,
    state: HostState,
}

impl SystemHost {
    /// Wrap `system`; nothing runs until [`SystemHost::awake`].
    pub fn new<S: QuerySystem>(system: S) -> Self {
        let state = HostState {
            name: system.name().to_owned(),
            every_frame: system.updates_every_frame(),
            configured: false,
            disposed: false,
            executors: Vec::new(),
            disposers: Vec::new(),
        };
        Self {
            system: Box::new(system),
            state,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.configured
    }

    /// Number of executors the system declared.
    #[must_use]
    pub fn executor_count(&self) -> usize {
        self.state.executors.len()
    }

    /// Configure the system. The executor list is frozen afterwards.
    ///
    /// A failed configuration disposes the host: executors declared before
    /// the error are dropped and the host never ticks.
    pub fn awake(&mut self, world: &mut World) -> QueryResult<()> {
        self.state.ensure_configuring()?;

        let mut ctx = SystemContext {
            world,
            state: &mut self.state,
        };
        let result = self.system.configure(&mut ctx);
        self.state.configured = true;

        if let Err(err) = &result {
            warn!(system = %self.state.name, %err, "configuration failed, disposing system");
            self.dispose();
            return result;
        }
        debug!(
            system = %self.state.name,
            executors = self.state.executors.len(),
            "configured system"
        );
        result
    }

    /// Check if the host was disposed, explicitly or by a failed configuration.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed
    }

    /// A configuration context outside of [`SystemHost::awake`]. Once the
    /// host is configured every declaration through it fails.
    pub fn context<'w>(&'w mut self, world: &'w mut World) -> SystemContext<'w> {
        SystemContext {
            world,
            state: &mut self.state,
        }
    }

    /// Register a raw executor; only allowed before [`SystemHost::awake`]
    /// completes.
    pub fn add_executor<F>(&mut self, executor: F) -> QueryResult<()>
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        self.state.push_executor(Box::new(executor))
    }

    /// Run one tick: the system's own hook, then every executor in
    /// registration order.
    pub fn update(&mut self, world: &mut World, delta: f32) {
        if !self.state.configured || self.state.disposed {
            return;
        }
        self.system.on_update(world, delta);
        for executor in &mut self.state.executors {
            executor(world);
        }
    }

    /// Stop future ticks and release everything the system declared.
    pub fn dispose(&mut self) {
        if self.state.disposed {
            return;
        }
        self.state.disposed = true;
        self.state.executors.clear();
        for disposer in self.state.disposers.drain(..) {
            disposer();
        }
        self.system.dispose();
        debug!(system = %self.state.name, "disposed system");
    }
}

impl Drop for SystemHost {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Runs hosts in insertion order, then the world's end-of-tick features.
#[derive(Default)]
pub struct SystemGroup {
    hosts: Vec<SystemHost>,
}

impl SystemGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `system`; it runs after every system added before it.
    pub fn add<S: QuerySystem>(&mut self, system: S) -> &mut Self {
        self.hosts.push(SystemHost::new(system));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Hosts in run order.
    pub fn hosts(&self) -> impl Iterator<Item = &SystemHost> {
        self.hosts.iter()
    }

    /// Configure every host that has not been configured yet.
    pub fn awake(&mut self, world: &mut World) -> QueryResult<()> {
        for host in self.hosts.iter_mut().filter(|host| !host.is_configured()) {
            host.awake(world)?;
        }
        Ok(())
    }

    /// One full tick.
    pub fn update(&mut self, world: &mut World, delta: f32) -> QueryResult<()> {
        for host in &mut self.hosts {
            host.update(world, delta);
        }
        world.cleanup_update()?;
        Ok(())
    }

    /// Dispose every host, in reverse order.
    pub fn dispose(&mut self) {
        for host in self.hosts.iter_mut().rev() {
            host.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    use super::*;

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl QuerySystem for Recorder {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            for label in ["first", "second", "third"] {
                let log = Arc::clone(&self.log);
                ctx.add_executor(move |_world| log.lock().push(label))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_executors_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new();
        let mut host = SystemHost::new(Recorder {
            log: Arc::clone(&log),
        });

        host.update(&mut world, 0.0);
        assert!(log.lock().is_empty());

        host.awake(&mut world).unwrap();
        host.update(&mut world, 0.0);
        host.update(&mut world, 0.0);

        assert_eq!(
            *log.lock(),
            vec!["first", "second", "third", "first", "second", "third"]
        );
    }

    #[test]
    fn test_late_declarations_are_rejected() {
        let mut world = World::new();
        let mut host = SystemHost::new(Recorder {
            log: Arc::default(),
        });
        host.awake(&mut world).unwrap();

        let err = host.add_executor(|_world| {}).unwrap_err();
        assert!(matches!(err, QueryError::ConfigurationFinished { .. }));

        let mut ctx = host.context(&mut world);
        assert!(ctx.add_executor(|_world| {}).is_err());
        assert!(ctx.query().build().is_err());

        assert!(matches!(
            host.awake(&mut world),
            Err(QueryError::ConfigurationFinished { .. })
        ));
        assert_eq!(host.executor_count(), 3);
    }

    struct Disposable {
        disposed: Arc<AtomicUsize>,
    }

    impl QuerySystem for Disposable {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let disposed = Arc::clone(&self.disposed);
            ctx.on_dispose(move || {
                disposed.fetch_add(1, Ordering::Relaxed);
            })?;
            Ok(())
        }

        fn dispose(&mut self) {
            self.disposed.fetch_add(10, Ordering::Relaxed);
        }
    }

    struct HalfConfigured {
        runs: Arc<AtomicUsize>,
        disposed: Arc<AtomicUsize>,
    }

    impl QuerySystem for HalfConfigured {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            let runs = Arc::clone(&self.runs);
            ctx.add_executor(move |_world| {
                runs.fetch_add(1, Ordering::Relaxed);
            })?;
            let disposed = Arc::clone(&self.disposed);
            ctx.on_dispose(move || {
                disposed.fetch_add(1, Ordering::Relaxed);
            })?;
            Err(QueryError::ConfigurationFinished {
                system: "half".to_owned(),
            })
        }
    }

    #[test]
    fn test_failed_configuration_never_ticks() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let mut host = SystemHost::new(HalfConfigured {
            runs: Arc::clone(&runs),
            disposed: Arc::clone(&disposed),
        });

        assert!(host.awake(&mut world).is_err());
        assert!(host.is_disposed());
        assert_eq!(host.executor_count(), 0);
        assert_eq!(disposed.load(Ordering::Relaxed), 1);

        host.update(&mut world, 0.0);
        assert_eq!(runs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_dispose_hooks_are_rejected_after_configuration() {
        let mut world = World::new();
        let mut host = SystemHost::new(Recorder {
            log: Arc::default(),
        });
        host.awake(&mut world).unwrap();

        let err = host.context(&mut world).on_dispose(|| {}).unwrap_err();
        assert!(matches!(err, QueryError::ConfigurationFinished { .. }));
    }

    #[test]
    fn test_dispose_runs_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let mut group = SystemGroup::new();
        group.add(Disposable {
            disposed: Arc::clone(&disposed),
        });

        group.awake(&mut world).unwrap();
        group.update(&mut world, 0.016).unwrap();
        group.dispose();
        drop(group);

        assert_eq!(disposed.load(Ordering::Relaxed), 11);
    }
}
