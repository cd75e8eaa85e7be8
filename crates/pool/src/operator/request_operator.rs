//! Request lifecycle: admission control and the scale-then-drain dispatch.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, join_all};

use super::{Operator, create_pool_resource, deliver_pooled_connection, first_error};
use crate::error::Error;
use crate::events::pool_debug;
use crate::factory::ConnectionFactory;
use crate::pool::{Pool, Work};
use crate::request::Request;
use crate::task::Task;

/// Owns `AvailableChanged` and `Request`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RequestOperator;

impl<F: ConnectionFactory> Operator<F> for RequestOperator {
    fn work(&self, pool: &Pool<F>, task: &Task<F::Connection>) -> Option<Work> {
        match task {
            Task::AvailableChanged => Some(dispatch_pooled_connections(pool)),
            Task::Request(request) => Some(handle_new_request(pool, request)),
            _ => None,
        }
    }
}

/// Admit a freshly queued request, or reject it when the queue is over its bound.
fn handle_new_request<F: ConnectionFactory>(
    pool: &Pool<F>,
    request: &Arc<Request<F::Connection>>,
) -> Work {
    let limit = pool.config().max_waiting_requests;
    let over_limit = pool.with_state(|state| {
        state.purge_settled_requests();
        let queued = state.requests.len();
        if limit > 0 && queued > limit {
            state.remove_request(request.id());
            Some(queued)
        } else {
            None
        }
    });

    if let Some(queued) = over_limit {
        pool_debug!(
            pool.events(),
            "Max waiting requests count exceeded, removing request {} from the list, request list size was {queued}",
            request.id()
        );
        request.reject(Error::MaxWaitingRequestsExceeded { limit, queued });
        return future::ok(()).boxed();
    }
    dispatch_pooled_connections(pool)
}

/// Open what unmet demand requires, then hand out parked resources.
///
/// Demand counts only requests still waiting: pending, with a caller
/// listening. Settled or abandoned entries left in the queue until the
/// next purge open nothing.
fn dispatch_pooled_connections<F: ConnectionFactory>(pool: &Pool<F>) -> Work {
    let max = pool.config().max;
    let (waiting, available, placeholders, room) = pool.with_state(|state| {
        (
            state.waiting(),
            state.available.len(),
            state.placeholders(),
            state.room(max),
        )
    });
    pool_debug!(
        pool.events(),
        "Dispatching pooled connections, waiting requests number is {waiting}"
    );
    if waiting == 0 || (available == 0 && room == 0) {
        pool_debug!(pool.events(), "waiting number < 1 or pool empty and no room left.");
        return future::ok(()).boxed();
    }

    let to_create = waiting.saturating_sub(available + placeholders).min(room);
    pool_debug!(
        pool.events(),
        "Resource number to create: {to_create}, available resource number: {available}, waiting request number: {waiting}, placeholder number: {placeholders}"
    );
    let creations: Vec<_> = (0..to_create).map(|_| create_pool_resource(pool)).collect();

    let pool = pool.clone();
    async move {
        let created = join_all(creations).await;
        let ready = pool.with_state(|state| {
            let count = state.waiting().min(state.available.len());
            (0..count)
                .filter_map(|_| state.dequeue_available())
                .collect::<Vec<_>>()
        });
        let delivered = join_all(ready.into_iter().map(|id| deliver_pooled_connection(&pool, id))).await;
        first_error(created.into_iter().chain(delivered))
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::PoolConfig;
    use crate::testing::MockFactory;

    #[tokio::test(start_paused = true)]
    async fn dispatch_without_waiters_creates_nothing() {
        let factory = Arc::new(MockFactory::new());
        let pool = Pool::new(Arc::clone(&factory), PoolConfig::new(0, 5)).unwrap();

        pool.dispatch(Task::AvailableChanged).await.unwrap();
        assert_eq!(factory.created_count(), 0);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_rejects_over_limit() {
        let factory = Arc::new(MockFactory::new());
        factory.set_create_delay(Duration::from_millis(100));
        let config = PoolConfig::new(0, 1).with_max_waiting_requests(1);
        let pool = Pool::new(Arc::clone(&factory), config).unwrap();

        let first = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await }
        });
        tokio::task::yield_now().await;
        let err = pool.acquire().await.unwrap_err();

        assert!(matches!(
            err,
            Error::MaxWaitingRequestsExceeded { limit: 1, queued: 2 }
        ));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(pool.status().request.rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn creation_is_capped_by_room() {
        let factory = Arc::new(MockFactory::new());
        factory.set_create_delay(Duration::from_millis(100));
        let pool = Pool::new(Arc::clone(&factory), PoolConfig::new(0, 2)).unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire_timeout(None).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(pool.placeholders(), 2);
        assert_eq!(pool.room(), 0);
        assert_eq!(pool.waiting(), 4);
        for waiter in waiters {
            waiter.abort();
        }
    }
}
