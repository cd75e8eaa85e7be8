//! Metrics collection for pool events.
//!
//! Subscribes to a pool's event stream and translates events into
//! counters via the `metrics` crate.
//!
//! Gated behind the `metrics` feature.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::PoolEvent;
use crate::factory::ConnectionFactory;
use crate::pool::Pool;

/// Background metrics collector fed by a pool's event stream.
///
/// # Usage
///
/// ```rust,ignore
/// let collector = MetricsCollector::new(pool.subscribe());
/// let cancel = CancellationToken::new();
/// tokio::spawn(collector.run(cancel));
/// ```
pub struct MetricsCollector {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl MetricsCollector {
    /// Create a collector reading from `receiver`.
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<PoolEvent>) -> Self {
        Self { receiver }
    }

    /// Run the collector loop until the event stream closes or `cancel`
    /// fires. Lagged events are skipped with a warning.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.receiver.recv() => {
                    match result {
                        Ok(event) => Self::record_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "MetricsCollector lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    }

    fn record_event(event: &PoolEvent) {
        match event {
            // Debug traces are not worth a time series.
            PoolEvent::Debug { .. } => {}
            other => metrics::counter!("pool.events.total", "event" => other.name()).increment(1),
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish()
    }
}

/// Spawn a [`MetricsCollector`] for `pool`.
///
/// The task stops when `cancel` is cancelled or the pool is dropped.
pub fn spawn_metrics_collector<F: ConnectionFactory>(
    pool: &Pool<F>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(MetricsCollector::new(pool.subscribe()).run(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::PoolConfig;
    use crate::testing::MockFactory;

    #[tokio::test]
    async fn collector_stops_on_cancel() {
        let factory = std::sync::Arc::new(MockFactory::new());
        factory.fail_next_creates(1);
        let pool = Pool::new(factory, PoolConfig::new(1, 2)).unwrap();
        let cancel = CancellationToken::new();
        let handle = spawn_metrics_collector(&pool, cancel.clone());

        assert!(pool.initialize().await.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector should stop")
            .unwrap();
    }
}
