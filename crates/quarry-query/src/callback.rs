//! Callback shapes accepted by the `for_each` family.
//!
//! Implementations for one to eight components are generated by
//! [`for_every_arity!`](crate::for_every_arity). The type parameter `S` is
//! the tuple of requested components; it exists only to let the compiler
//! pick the implementation that matches the closure's signature.

use quarry_ecs::{Component, Entity, World};
use smallvec::smallvec;

use crate::{
    compiled::CompiledQuery,
    system::Executor,
    validation::{Requested, RequestedSet},
};

/// Invoke `$m!` once per supported arity with `(Type, binding)` pairs.
#[doc(hidden)]
#[macro_export]
macro_rules! for_every_arity {
    ($m:ident) => {
        $m!((A, a));
        $m!((A, a), (B, b));
        $m!((A, a), (B, b), (C, c));
        $m!((A, a), (B, b), (C, c), (D, d));
        $m!((A, a), (B, b), (C, c), (D, d), (E, e));
        $m!((A, a), (B, b), (C, c), (D, d), (E, e), (G, g));
        $m!((A, a), (B, b), (C, c), (D, d), (E, e), (G, g), (H, h));
        $m!((A, a), (B, b), (C, c), (D, d), (E, e), (G, g), (H, h), (I, i));
    };
}

/// A tuple of component types.
pub trait ComponentSet: 'static {
    /// Members in declaration order.
    fn requested() -> RequestedSet;

    /// Create any missing stash so executors find them on their first tick.
    fn register_stashes(world: &mut World);
}

impl ComponentSet for () {
    fn requested() -> RequestedSet {
        RequestedSet::new()
    }

    fn register_stashes(_world: &mut World) {}
}

macro_rules! impl_component_set {
    ($(($ty:ident, $var:ident)),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            fn requested() -> RequestedSet {
                smallvec![$(Requested::of::<$ty>()),+]
            }

            fn register_stashes(world: &mut World) {
                $(world.register_stash::<$ty>();)+
            }
        }
    };
}

for_every_arity!(impl_component_set);

/// `FnMut(&mut A, &mut B, ..)` over every matching entity.
pub trait ForEachCallback<S: ComponentSet>: Send + 'static {
    fn into_executor(self, query: CompiledQuery) -> Executor;
}

/// `FnMut(Entity, &mut A, ..)` over every matching entity.
pub trait ForEachWithEntityCallback<S: ComponentSet>: Send + 'static {
    fn into_executor(self, query: CompiledQuery) -> Executor;
}

macro_rules! impl_for_each {
    ($(($ty:ident, $var:ident)),+) => {
        impl<Func, $($ty: Component),+> ForEachCallback<($($ty,)+)> for Func
        where
            Func: FnMut($(&mut $ty),+) + Send + 'static,
        {
            fn into_executor(self, query: CompiledQuery) -> Executor {
                let mut callback = self;
                Box::new(move |world: &mut World| {
                    let world = &*world;
                    $(let Some(mut $var) = world.lock_stash_mut::<$ty>() else {
                        return;
                    };)+
                    for entity in query.iter(world) {
                        callback($($var.get_mut(entity)),+);
                    }
                })
            }
        }

        impl<Func, $($ty: Component),+> ForEachWithEntityCallback<($($ty,)+)> for Func
        where
            Func: FnMut(Entity, $(&mut $ty),+) + Send + 'static,
        {
            fn into_executor(self, query: CompiledQuery) -> Executor {
                let mut callback = self;
                Box::new(move |world: &mut World| {
                    let world = &*world;
                    $(let Some(mut $var) = world.lock_stash_mut::<$ty>() else {
                        return;
                    };)+
                    for entity in query.iter(world) {
                        callback(entity, $($var.get_mut(entity)),+);
                    }
                })
            }
        }
    };
}

for_every_arity!(impl_for_each);

impl<Func> ForEachWithEntityCallback<()> for Func
where
    Func: FnMut(Entity) + Send + 'static,
{
    fn into_executor(self, query: CompiledQuery) -> Executor {
        let mut callback = self;
        Box::new(move |world: &mut World| {
            for entity in query.iter(world) {
                callback(entity);
            }
        })
    }
}
