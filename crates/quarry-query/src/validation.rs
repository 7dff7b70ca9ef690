//! Checks that the components an executor asks for agree with its filter.

use std::any::type_name;

use quarry_ecs::{Component, ComponentId, Filter, component_id};
use smallvec::SmallVec;
use tracing::error;

use crate::error::{QueryError, QueryResult};

/// One component an executor hands to its callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requested {
    pub id: ComponentId,
    pub name: &'static str,
}

impl Requested {
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: component_id::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Components requested by one executor, in callback order.
pub type RequestedSet = SmallVec<[Requested; 8]>;

/// Reject a request naming the same component twice; its stash would have
/// to be locked twice.
pub fn check_duplicates(system: &str, requested: &[Requested]) -> QueryResult<()> {
    for (i, request) in requested.iter().enumerate() {
        if requested[..i].iter().any(|earlier| earlier.id == request.id) {
            return Err(QueryError::DuplicateComponent {
                system: system.to_owned(),
                component: request.name,
            });
        }
    }
    Ok(())
}

/// Every requested component must be required by `filter` and not
/// excluded by it. All problems are reported together.
pub fn validate_request(system: &str, filter: &Filter, requested: &[Requested]) -> QueryResult<()> {
    let mut problems = Vec::new();

    for request in requested {
        if filter.excludes(request.id) {
            problems.push(format!(
                "`{}` is requested but the filter excludes it",
                request.name
            ));
        } else if !filter.includes(request.id) {
            problems.push(format!(
                "`{}` is requested but the filter does not require it; add `.with::<{}>()`",
                request.name, request.name
            ));
        }
    }

    if problems.is_empty() {
        return Ok(());
    }

    error!(system, ?problems, "query request does not match its filter");
    Err(QueryError::InvalidRequest {
        system: system.to_owned(),
        problems,
    })
}
