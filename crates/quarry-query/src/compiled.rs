//! Compiled queries.
//!
//! A [`CompiledQuery`] is a filter plus the handle of its member list in
//! the world's filter index. The unfiltered query has no entry and walks
//! the entity allocator instead.

use quarry_ecs::{AliveIter, Entity, Filter, FilterId, World};

/// Cached, iterable realization of a [`Filter`].
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    filter: Filter,
    id: Option<FilterId>,
}

impl CompiledQuery {
    /// Compile `filter` against `world`, reusing an equivalent compiled
    /// filter if there is one.
    pub fn compile(world: &mut World, filter: Filter) -> Self {
        let id = (!filter.is_unfiltered()).then(|| world.intern_filter(&filter));
        Self { filter, id }
    }

    /// Query matching every live entity.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self {
            filter: Filter::unfiltered(),
            id: None,
        }
    }

    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    #[must_use]
    pub const fn filter_id(&self) -> Option<FilterId> {
        self.id
    }

    /// `false` for the unfiltered query.
    #[must_use]
    pub const fn has_filter(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        match self.id {
            Some(id) => world.filter_members(id).is_empty(),
            None => world.entity_count() == 0,
        }
    }

    #[must_use]
    pub fn len(&self, world: &World) -> usize {
        match self.id {
            Some(id) => world.filter_members(id).len(),
            None => world.entity_count(),
        }
    }

    #[must_use]
    pub fn contains(&self, world: &World, entity: Entity) -> bool {
        match self.id {
            Some(id) => world.filter_contains(id, entity),
            None => world.is_alive(entity),
        }
    }

    /// Matching entities. The order is stable while the matching set does
    /// not change.
    pub fn iter<'w>(&self, world: &'w World) -> QueryIter<'w> {
        match self.id {
            Some(id) => QueryIter::Filtered(world.filter_members(id).iter()),
            None => QueryIter::Unfiltered(world.entities()),
        }
    }

    /// Owned snapshot of the matching entities.
    #[must_use]
    pub fn entities(&self, world: &World) -> Vec<Entity> {
        self.iter(world).collect()
    }
}

/// Iterator over the entities of a [`CompiledQuery`].
#[derive(Clone)]
pub enum QueryIter<'w> {
    Filtered(std::slice::Iter<'w, Entity>),
    Unfiltered(AliveIter<'w>),
}

impl Iterator for QueryIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Filtered(iter) => iter.next().copied(),
            Self::Unfiltered(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Filtered(iter) => iter.size_hint(),
            Self::Unfiltered(iter) => iter.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct X;
    struct Y;

    #[test]
    fn test_unfiltered_matches_live_entities() {
        let mut world = World::new();
        let query = CompiledQuery::compile(&mut world, Filter::unfiltered());
        assert!(!query.has_filter());
        assert!(query.is_empty(&world));

        let a = world.spawn_empty();
        let b = world.spawn(X);
        let c = world.spawn(Y);
        world.despawn(b);

        assert!(!query.is_empty(&world));
        assert_eq!(query.entities(&world), vec![a, c]);
        assert_eq!(query.len(&world), 2);

        world.despawn(a);
        world.despawn(c);
        assert!(query.is_empty(&world));
    }

    #[test]
    fn test_equivalent_filters_behave_identically() {
        let mut world = World::new();
        let e1 = world.spawn(X);
        world.set(e1, Y).unwrap();
        let e2 = world.spawn(X);

        let a = CompiledQuery::compile(
            &mut world,
            Filter::builder().with::<X>().without::<Y>().build().unwrap(),
        );
        let b = CompiledQuery::compile(
            &mut world,
            Filter::builder()
                .without::<Y>()
                .with::<X>()
                .without::<Y>()
                .build()
                .unwrap(),
        );

        assert_eq!(a.filter_id(), b.filter_id());
        assert_eq!(a.entities(&world), b.entities(&world));
        assert_eq!(a.entities(&world), vec![e2]);
        assert_eq!(a.is_empty(&world), b.is_empty(&world));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut world = World::new();
        for _ in 0..5 {
            world.spawn(X);
        }
        let query = CompiledQuery::compile(&mut world, Filter::builder().with::<X>().build().unwrap());

        let first: Vec<_> = query.iter(&world).collect();
        let second: Vec<_> = query.iter(&world).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
