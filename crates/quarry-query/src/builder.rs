//! Query declaration.
//!
//! A [`QueryBuilder`] collects filter terms, compiles them against the
//! world, checks the requested components against the result and
//! registers an executor on the declaring system.
//!
//! ```ignore
//! fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
//!     ctx.query()
//!         .with::<Position>()
//!         .with::<Velocity>()
//!         .without::<Frozen>()
//!         .for_each(|pos: &mut Position, vel: &mut Velocity| {
//!             pos.x += vel.x;
//!         })?;
//!     Ok(())
//! }
//! ```
//!
//! The world's [`QueryGlobals`] are appended after the explicit terms
//! unless the query calls [`QueryBuilder::ignore_globals`]. A global term
//! that contradicts an explicit one is dropped.

use quarry_ecs::{Component, Entity, FilterBuilder, QueryGlobals, World, component_name};
use tracing::debug;

use crate::{
    callback::{ComponentSet, ForEachCallback, ForEachWithEntityCallback},
    compiled::CompiledQuery,
    error::QueryResult,
    system::SystemContext,
    validation::{check_duplicates, validate_request},
};

/// Filter terms for one query of a configuring system.
#[must_use]
pub struct QueryBuilder<'c, 'w> {
    ctx: &'c mut SystemContext<'w>,
    filter: FilterBuilder,
    skip_validation: bool,
    ignore_globals: bool,
}

/// A compiled query together with the context it was declared through.
pub(crate) struct Prepared<'c, 'w> {
    pub(crate) ctx: &'c mut SystemContext<'w>,
    pub(crate) query: CompiledQuery,
}

fn apply_globals(mut filter: FilterBuilder, globals: &QueryGlobals) -> FilterBuilder {
    for &id in globals.required() {
        if filter.is_excluded(id) {
            debug!(component = component_name(id), "explicit exclusion overrides global requirement");
        } else {
            filter = filter.with_id(id);
        }
    }
    for &id in globals.ignored() {
        if filter.is_included(id) {
            debug!(component = component_name(id), "explicit requirement overrides global exclusion");
        } else {
            filter = filter.without_id(id);
        }
    }
    filter
}

impl<'c, 'w> QueryBuilder<'c, 'w> {
    pub(crate) fn new(ctx: &'c mut SystemContext<'w>) -> Self {
        Self {
            ctx,
            filter: FilterBuilder::default(),
            skip_validation: false,
            ignore_globals: false,
        }
    }

    /// Only entities with a `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.filter = self.filter.with::<T>();
        self
    }

    /// Only entities without a `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.filter = self.filter.without::<T>();
        self
    }

    /// [`QueryBuilder::with`] for every member of the tuple `S`.
    pub fn with_all<S: ComponentSet>(mut self) -> Self {
        for request in S::requested() {
            self.filter = self.filter.with_id(request.id);
        }
        self
    }

    /// [`QueryBuilder::without`] for every member of the tuple `S`.
    pub fn with_none<S: ComponentSet>(mut self) -> Self {
        for request in S::requested() {
            self.filter = self.filter.without_id(request.id);
        }
        self
    }

    /// Edit the raw filter terms, e.g. to add terms computed at runtime.
    pub fn also(mut self, f: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        self.filter = f(self.filter);
        self
    }

    /// Skip checking requested components against the filter. A component
    /// that turns out to be missing then panics inside the executor.
    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Do not append the world's [`QueryGlobals`].
    pub fn ignore_globals(mut self, ignore: bool) -> Self {
        self.ignore_globals = ignore;
        self
    }

    /// Compile the query without registering an executor.
    pub fn build(self) -> QueryResult<CompiledQuery> {
        self.compile().map(|prepared| prepared.query)
    }

    fn compile(self) -> QueryResult<Prepared<'c, 'w>> {
        self.ctx.ensure_configuring()?;

        let mut filter = self.filter;
        if !self.ignore_globals {
            let globals = &self.ctx.world_ref().config().query_globals;
            filter = apply_globals(filter, globals);
        }
        let filter = filter.build()?;

        let query = CompiledQuery::compile(self.ctx.world(), filter);
        Ok(Prepared {
            ctx: self.ctx,
            query,
        })
    }

    /// Compile, then check the components `S` against the filter and create
    /// their stashes.
    pub(crate) fn prepare<S: ComponentSet>(self) -> QueryResult<Prepared<'c, 'w>> {
        let requested = S::requested();
        check_duplicates(self.ctx.system_name(), &requested)?;

        let validate = !self.skip_validation && self.ctx.world_ref().config().validate_queries;
        let prepared = self.compile()?;

        if validate {
            validate_request(prepared.ctx.system_name(), prepared.query.filter(), &requested)?;
        }
        S::register_stashes(prepared.ctx.world());
        Ok(prepared)
    }

    /// Run `callback` with the requested components of every matching
    /// entity, once per tick.
    pub fn for_each<S, F>(self, callback: F) -> QueryResult<CompiledQuery>
    where
        S: ComponentSet,
        F: ForEachCallback<S>,
    {
        let Prepared { ctx, query } = self.prepare::<S>()?;
        ctx.push_executor(callback.into_executor(query.clone()))?;
        Ok(query)
    }

    /// [`QueryBuilder::for_each`] with the entity as the first argument.
    pub fn for_each_with_entity<S, F>(self, callback: F) -> QueryResult<CompiledQuery>
    where
        S: ComponentSet,
        F: ForEachWithEntityCallback<S>,
    {
        let Prepared { ctx, query } = self.prepare::<S>()?;
        ctx.push_executor(callback.into_executor(query.clone()))?;
        Ok(query)
    }

    /// Run `callback` with full world access for every matching entity.
    ///
    /// The callback may change the world structurally. It walks a snapshot
    /// taken at the start of the tick and skips entities that died or
    /// stopped matching earlier in the same pass.
    pub fn for_each_entity<F>(self, mut callback: F) -> QueryResult<CompiledQuery>
    where
        F: FnMut(&mut World, Entity) + Send + 'static,
    {
        let Prepared { ctx, query } = self.prepare::<()>()?;
        let snapshot_query = query.clone();
        ctx.push_executor(Box::new(move |world: &mut World| {
            for entity in snapshot_query.entities(world) {
                if snapshot_query.contains(world, entity) {
                    callback(world, entity);
                }
            }
        }))?;
        Ok(query)
    }

    /// Run `callback` once per tick with the whole query, skipping ticks
    /// where nothing matches.
    pub fn for_all<F>(self, mut callback: F) -> QueryResult<CompiledQuery>
    where
        F: FnMut(&mut World, &CompiledQuery) + Send + 'static,
    {
        let Prepared { ctx, query } = self.prepare::<()>()?;
        let executor_query = query.clone();
        ctx.push_executor(Box::new(move |world: &mut World| {
            if !executor_query.is_empty(world) {
                callback(world, &executor_query);
            }
        }))?;
        Ok(query)
    }
}
