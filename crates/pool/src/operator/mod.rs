//! Task handlers and the resource primitives they share.
//!
//! An operator claims the task kinds it owns and returns `None` for the
//! rest, letting the pool try the next operator in line.

mod pool_operator;
mod request_operator;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::error::{Error, Result};
use crate::events::pool_debug;
use crate::factory::ConnectionFactory;
use crate::pool::{Pool, Reservation, Work};
use crate::resource::{Resource, ResourceId, ResourceState};
use crate::task::Task;

pub(crate) use pool_operator::PoolOperator;
pub(crate) use request_operator::RequestOperator;

/// A handler in the pool's dispatch chain.
pub(crate) trait Operator<F: ConnectionFactory>: Send + Sync {
    /// Claim `task` and return its remaining work, or `None` to pass.
    fn work(&self, pool: &Pool<F>, task: &Task<F::Connection>) -> Option<Work>;
}

/// Open one connection if there is room, then deliver it.
///
/// Capacity is reserved before this returns; the future performs the
/// factory call. A full pool is a silent no-op.
pub(crate) fn create_pool_resource<F: ConnectionFactory>(pool: &Pool<F>) -> Work {
    let Some(reservation) = Reservation::reserve(pool) else {
        pool_debug!(pool.events(), "Pool is full, no room left.");
        return future::ok(()).boxed();
    };
    let (size, placeholders, available) = pool.with_state(|state| {
        (state.size(), state.placeholders(), state.available.len())
    });
    pool_debug!(
        pool.events(),
        "Before resource creation, pool size is {size}, placeholder number is {placeholders}, available resource number is {available}"
    );

    let pool = pool.clone();
    async move {
        let connection = match pool.factory().create().await {
            Ok(connection) => connection,
            Err(source) => {
                drop(reservation);
                let err = Error::connection_create(source);
                pool.events().connection_create_error(&err);
                return Err(err);
            }
        };
        match reservation.commit(connection) {
            Ok(id) => {
                tracing::debug!(resource_id = %id, pool_size = pool.size(), "connection created");
                pool.dispatch(Task::Delivery(id)).await
            }
            Err(orphan) => {
                pool_debug!(
                    pool.events(),
                    "Creation finished after its slot was revoked, closing the connection."
                );
                if let Err(source) = pool.factory().destroy(&orphan).await {
                    pool.events().error(&Error::connection_destroy(source));
                }
                Ok(())
            }
        }
    }
    .boxed()
}

/// Remove a resource from the pool and close its connection.
///
/// Removal is synchronous and idempotent; a resource that is already gone
/// yields a no-op future.
pub(crate) fn destroy_resource<F: ConnectionFactory>(
    pool: &Pool<F>,
    id: ResourceId,
) -> BoxFuture<'static, ()> {
    match pool.with_state(|state| state.take_resource(id)) {
        Some(resource) => close_resource(pool, resource),
        None => {
            pool_debug!(pool.events(), "Resource {id} is already gone, nothing to destroy.");
            future::ready(()).boxed()
        }
    }
}

/// Close a resource that was already taken out of the collections.
///
/// Destroy failures are reported and never returned.
pub(crate) fn close_resource<F: ConnectionFactory>(
    pool: &Pool<F>,
    mut resource: Resource<F::Connection>,
) -> BoxFuture<'static, ()> {
    resource.invalid();
    pool_debug!(
        pool.events(),
        "Destroying resource {}, pool size is now {}",
        resource.id(),
        pool.size()
    );
    let pool = pool.clone();
    async move {
        if let Err(source) = pool.factory().destroy(resource.connection().get()).await {
            pool.events().error(&Error::connection_destroy(source));
        }
    }
    .boxed()
}

/// Validate a resource and give it to the oldest waiting request, or park it.
pub(crate) fn deliver_pooled_connection<F: ConnectionFactory>(
    pool: &Pool<F>,
    id: ResourceId,
) -> Work {
    let connection = pool.with_state(|state| {
        state
            .resource(id)
            .filter(|r| !r.is_invalid())
            .map(|r| r.connection().clone())
    });
    let Some(connection) = connection else {
        pool_debug!(pool.events(), "Resource {id} is missing or invalid, destroying it.");
        return destroy_resource(pool, id).map(Ok).boxed();
    };

    let pool = pool.clone();
    async move {
        let healthy = match pool.factory().validate(connection.get()).await {
            Ok(healthy) => healthy,
            Err(err) => {
                pool.events()
                    .connection_validation_error(format!("Validation of resource {id} failed: {err}"));
                false
            }
        };
        if !healthy {
            pool_debug!(pool.events(), "Connection validation failed, destroying it. Resource id is {id}");
            pool.with_state(|state| {
                if let Some(resource) = state.resource_mut(id) {
                    resource.invalid();
                }
            });
            destroy_resource(&pool, id).await;
            return Ok(());
        }
        hand_out(&pool, id).await
    }
    .boxed()
}

/// Match a validated resource with the first request still waiting.
///
/// A resource another delivery already allocated is left alone.
fn hand_out<F: ConnectionFactory>(pool: &Pool<F>, id: ResourceId) -> Work {
    let allocated_to = pool.with_state(|state| {
        let connection = state
            .resource(id)
            .filter(|r| r.state() == ResourceState::Idle)
            .map(|r| r.connection().clone())?;
        while let Some(request) = state.dequeue_request() {
            if request.resolve(connection.clone()) {
                if let Some(resource) = state.resource_mut(id) {
                    resource.allocate();
                }
                // A second release may have parked it again mid-validation.
                state.remove_from_available(id);
                return Some(Some(request.id()));
            }
        }
        Some(None)
    });

    match allocated_to {
        None => future::ok(()).boxed(),
        Some(Some(request_id)) => {
            pool_debug!(pool.events(), "Allocated resource {id} to request {request_id}");
            future::ok(()).boxed()
        }
        Some(None) => {
            pool_debug!(
                pool.events(),
                "No valid waiting request left, adding resource {id} back to available"
            );
            pool.add_resource_to_available(id)
        }
    }
}

/// Collapse settled sub-operations into the first error, if any.
pub(crate) fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    results.into_iter().collect()
}
