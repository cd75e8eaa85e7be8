//! Resource lifecycle: initialization, returns, destruction, idle sweep
//! and teardown.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, join_all};

use super::{
    Operator, close_resource, create_pool_resource, deliver_pooled_connection, destroy_resource,
    first_error,
};
use crate::connection::PooledConnection;
use crate::error::Error;
use crate::events::pool_debug;
use crate::factory::ConnectionFactory;
use crate::pool::{Pool, Work};
use crate::request::Request;
use crate::resource::ResourceState;
use crate::task::Task;

/// Owns `Initialize`, `Delivery`, `Return`, `CheckIdle`, `Destroy` and `Clean`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PoolOperator;

impl<F: ConnectionFactory> Operator<F> for PoolOperator {
    fn work(&self, pool: &Pool<F>, task: &Task<F::Connection>) -> Option<Work> {
        let work = match task {
            Task::Initialize => ensure_min_resources(pool),
            Task::Delivery(id) => deliver_pooled_connection(pool, *id),
            Task::Return(connection) => return_connection_to_pool(pool, connection),
            Task::CheckIdle => check_idle_timeout(pool),
            Task::Destroy(connection) => destroy_connection(pool, connection),
            Task::Clean => clear_pool_resources(pool),
            Task::AvailableChanged | Task::Request(_) => return None,
        };
        Some(work)
    }
}

/// Open connections until the pool holds `min`, counting in-flight ones.
fn ensure_min_resources<F: ConnectionFactory>(pool: &Pool<F>) -> Work {
    let deficit = pool.config().min.saturating_sub(pool.size());
    if deficit == 0 {
        return future::ok(()).boxed();
    }
    tracing::debug!(deficit, "replenishing pool to its minimum");
    let creations: Vec<_> = (0..deficit).map(|_| create_pool_resource(pool)).collect();
    async move { first_error(join_all(creations).await) }.boxed()
}

fn return_connection_to_pool<F: ConnectionFactory>(
    pool: &Pool<F>,
    connection: &PooledConnection<F::Connection>,
) -> Work {
    match pool.with_state(|state| state.find_by_connection(connection)) {
        Some(id) => pool.add_resource_to_available(id),
        None => future::err(Error::NotPartOfPool).boxed(),
    }
}

fn destroy_connection<F: ConnectionFactory>(
    pool: &Pool<F>,
    connection: &PooledConnection<F::Connection>,
) -> Work {
    let Some(id) = pool.with_state(|state| state.find_by_connection(connection)) else {
        return future::ok(()).boxed();
    };
    let destroyed = destroy_resource(pool, id);
    let pool = pool.clone();
    async move {
        destroyed.await;
        ensure_min_resources(&pool).await
    }
    .boxed()
}

/// Evict available resources idle longer than `idle_timeout`.
fn check_idle_timeout<F: ConnectionFactory>(pool: &Pool<F>) -> Work {
    let idle_timeout = pool.config().idle_timeout;
    let (available_before, expired) = pool.with_state(|state| {
        let available_before = state.available.len();
        let mut expired = Vec::new();
        for index in (0..state.available.len()).rev() {
            let id = state.available[index];
            let is_expired = state.resource(id).is_some_and(|r| {
                r.state() == ResourceState::Idle && r.last_idle_at().elapsed() > idle_timeout
            });
            if is_expired {
                expired.extend(state.take_resource(id));
            }
        }
        (available_before, expired)
    });

    if !expired.is_empty() {
        pool.counters().record_idle_evictions(expired.len() as u64);
        tracing::debug!(evicted = expired.len(), "idle connections evicted");
    }
    for resource in &expired {
        pool_debug!(pool.events(), "Timeout..., removing it, id is: {}", resource.id());
    }
    let closing: Vec<_> = expired.into_iter().map(|r| close_resource(pool, r)).collect();
    pool_debug!(
        pool.events(),
        "IDLE timeout checking done, ensuring minimum resources in the pool"
    );

    let pool = pool.clone();
    async move {
        join_all(closing).await;
        if available_before > pool.available() {
            ensure_min_resources(&pool).await
        } else {
            Ok(())
        }
    }
    .boxed()
}

/// Close every resource and reject every request, then empty the pool.
fn clear_pool_resources<F: ConnectionFactory>(pool: &Pool<F>) -> Work {
    let (resources, requests) = pool.with_state(|state| state.drain());
    tracing::debug!(
        resources = resources.len(),
        requests = requests.len(),
        "clearing pool"
    );
    reject_cleared(&requests);
    let closing: Vec<_> = resources.into_iter().map(|r| close_resource(pool, r)).collect();

    let pool = pool.clone();
    async move {
        join_all(closing).await;
        // Anything that landed while the snapshot was closing.
        let (leftovers, late) = pool.with_state(|state| state.drain());
        reject_cleared(&late);
        join_all(leftovers.into_iter().map(|r| close_resource(&pool, r))).await;
        Ok(())
    }
    .boxed()
}

fn reject_cleared<C>(requests: &[Arc<Request<C>>]) {
    for request in requests {
        request.reject(Error::PoolCleared {
            request_id: request.id(),
        });
    }
}
