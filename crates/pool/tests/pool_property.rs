//! Property tests for pool capacity and connection accounting.
//!
//! After any sequence of acquire/release/destroy operations, the pool never
//! holds more than `max` entries and never parks more than it holds. Once
//! cleared, every connection it opened has been closed.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use reservoir_pool::prelude::*;
use reservoir_pool::testing::{MockConnection, MockFactory};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire,
    Release,
    Destroy,
    Sweep,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Acquire),
        3 => Just(Op::Release),
        1 => Just(Op::Destroy),
        1 => Just(Op::Sweep),
        1 => Just(Op::Clear),
    ]
}

fn assert_capacity(pool: &Pool<Arc<MockFactory>>, factory: &MockFactory, max: usize) {
    let status = pool.status();
    assert!(status.pool.size <= max, "size {} exceeds max {max}", status.pool.size);
    assert!(status.pool.available <= status.pool.size);
    assert!(factory.open_count() >= status.pool.size - pool.placeholders());
}

// ---------------------------------------------------------------------------
// Property: capacity invariant holds in every reachable state
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn capacity_invariant_holds(
        min in 0usize..3,
        extra in 0usize..4,
        ops in proptest::collection::vec(op(), 1..40),
    ) {
        let max = min + extra + 1;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        rt.block_on(async {
            let factory = Arc::new(MockFactory::new());
            let config = PoolConfig::new(min, max)
                .with_request_timeout(Duration::from_millis(50))
                .with_idle_check_interval(Duration::from_millis(10))
                .with_idle_timeout(Duration::from_millis(20));
            let pool = Pool::new(Arc::clone(&factory), config).unwrap();
            let mut held: Vec<PooledConnection<MockConnection>> = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire => {
                        if let Ok(connection) = pool.acquire().await {
                            held.push(connection);
                        }
                    }
                    Op::Release => {
                        if let Some(connection) = held.pop() {
                            pool.release(connection).await.unwrap();
                        }
                    }
                    Op::Destroy => {
                        if let Some(connection) = held.pop() {
                            pool.destroy(connection).await.unwrap();
                        }
                    }
                    Op::Sweep => tokio::time::sleep(Duration::from_millis(30)).await,
                    Op::Clear => {
                        pool.clear().await.unwrap();
                        held.clear();
                    }
                }
                assert_capacity(&pool, &factory, max);
            }

            pool.clear().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(pool.size(), 0);
            assert_eq!(factory.open_count(), 0);
        });
    }

    #[test]
    fn handed_out_connections_are_distinct(
        max in 1usize..6,
        requests in 1usize..10,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        rt.block_on(async {
            let factory = Arc::new(MockFactory::new());
            let config = PoolConfig::new(0, max).with_request_timeout(Duration::from_millis(50));
            let pool = Pool::new(Arc::clone(&factory), config).unwrap();

            let results = futures::future::join_all((0..requests).map(|_| pool.acquire())).await;
            let held: Vec<_> = results.into_iter().filter_map(Result::ok).collect();

            assert_eq!(held.len(), requests.min(max));
            for (i, a) in held.iter().enumerate() {
                for b in &held[i + 1..] {
                    assert_ne!(a, b);
                }
            }
        });
    }
}
