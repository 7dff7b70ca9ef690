//! Data-parallel overlay for single-component queries.
//!
//! The stash of the requested component is split across rayon workers;
//! each worker only touches the entities in its own chunk. The body must
//! not change the world structurally, which `&mut T` access already
//! guarantees.

use quarry_ecs::{Component, Entity, World};
use rayon::prelude::*;

use crate::{
    builder::{Prepared, QueryBuilder},
    compiled::CompiledQuery,
    error::{QueryError, QueryResult},
};

impl QueryBuilder<'_, '_> {
    /// [`QueryBuilder::for_each_with_entity`] for one component, run on the
    /// rayon pool. Rejected for the unfiltered query.
    pub fn for_each_parallel<T, F>(self, callback: F) -> QueryResult<CompiledQuery>
    where
        T: Component,
        F: Fn(Entity, &mut T) + Send + Sync + 'static,
    {
        let Prepared { ctx, query } = self.prepare::<(T,)>()?;
        let Some(filter_id) = query.filter_id() else {
            return Err(QueryError::UnfilteredParallel {
                system: ctx.system_name().to_owned(),
            });
        };

        ctx.push_executor(Box::new(move |world: &mut World| {
            let world = &*world;
            let Some(mut stash) = world.lock_stash_mut::<T>() else {
                return;
            };
            let (entities, data) = stash.dense_mut();
            entities
                .par_iter()
                .zip(data.par_iter_mut())
                .filter(|(entity, _)| world.filter_contains(filter_id, **entity))
                .for_each(|(&entity, value)| callback(entity, value));
        }))?;
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{QuerySystem, SystemContext, SystemHost};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Energy(u32);

    struct Sleeping;

    struct Recharge;

    impl QuerySystem for Recharge {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            ctx.query()
                .with::<Energy>()
                .without::<Sleeping>()
                .for_each_parallel(|_entity, energy: &mut Energy| energy.0 += 1)?;
            Ok(())
        }
    }

    #[test]
    fn test_parallel_for_each_respects_filter() {
        let mut world = World::new();
        let entities: Vec<_> = (0..1000).map(|i| world.spawn(Energy(i))).collect();
        for &entity in entities.iter().step_by(3) {
            world.set(entity, Sleeping).unwrap();
        }

        let mut host = SystemHost::new(Recharge);
        host.awake(&mut world).unwrap();
        host.update(&mut world, 0.0);

        for (i, &entity) in entities.iter().enumerate() {
            let expected = if i % 3 == 0 { i as u32 } else { i as u32 + 1 };
            assert_eq!(world.get::<Energy>(entity), Some(Energy(expected)));
        }
    }

    struct Everything;

    impl QuerySystem for Everything {
        fn configure(&mut self, ctx: &mut SystemContext<'_>) -> QueryResult<()> {
            ctx.query()
                .skip_validation(true)
                .for_each_parallel(|_entity, _energy: &mut Energy| {})?;
            Ok(())
        }
    }

    #[test]
    fn test_parallel_rejects_unfiltered_query() {
        let mut world = World::new();
        let mut host = SystemHost::new(Everything);
        let err = host.awake(&mut world).unwrap_err();
        assert!(matches!(err, QueryError::UnfilteredParallel { .. }));
    }
}
