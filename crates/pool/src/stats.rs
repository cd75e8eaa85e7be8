//! Pool counters and the serializable status snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::events::EventBus;

/// Monotonic counters shared by a pool and its requests.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    resolved: AtomicU64,
    rejected: AtomicU64,
    request_timeouts: AtomicU64,
    idle_evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn record_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_timeout(&self) {
        self.request_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle_evictions(&self, count: u64) {
        self.idle_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn request_timeouts(&self) -> u64 {
        self.request_timeouts.load(Ordering::Relaxed)
    }

    pub(crate) fn idle_evictions(&self) -> u64 {
        self.idle_evictions.load(Ordering::Relaxed)
    }
}

/// Event bus and counters, shared between a pool and its requests.
#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    pub(crate) events: EventBus,
    pub(crate) counters: Counters,
}

impl Telemetry {
    pub(crate) fn new(debug: bool) -> Self {
        Self {
            events: EventBus::new(1024, debug),
            counters: Counters::default(),
        }
    }
}

/// Point-in-time view of a pool, as returned by [`Pool::status`](crate::Pool::status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Connection side of the pool
    pub pool: PoolSummary,
    /// Request side of the pool
    pub request: RequestSummary,
}

/// Connection counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    /// Live resources plus placeholders
    pub size: usize,
    /// Configured minimum
    pub min: usize,
    /// Configured maximum
    pub max: usize,
    /// Parked resources
    pub available: usize,
    /// Resources evicted by the idle sweep
    pub timeout_count: u64,
}

/// Request counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    /// Raw queue length, settled entries not yet purged included
    pub queued: usize,
    /// Requests still waiting for a connection
    pub pending: usize,
    /// Configured waiting-queue bound
    pub max_waiting: usize,
    /// Requests fulfilled with a connection
    pub resolved_count: u64,
    /// Requests rejected for any reason
    pub rejected_count: u64,
    /// Requests rejected by their timeout
    pub timeout_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counters_accumulate() {
        let counters = Counters::default();
        counters.record_resolved();
        counters.record_rejected();
        counters.record_rejected();
        counters.record_request_timeout();
        counters.record_idle_evictions(3);
        assert_eq!(counters.resolved(), 1);
        assert_eq!(counters.rejected(), 2);
        assert_eq!(counters.request_timeouts(), 1);
        assert_eq!(counters.idle_evictions(), 3);
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = PoolStatus {
            pool: PoolSummary {
                size: 5,
                min: 2,
                max: 5,
                available: 0,
                timeout_count: 0,
            },
            request: RequestSummary {
                queued: 1,
                pending: 1,
                max_waiting: 6,
                resolved_count: 5,
                rejected_count: 0,
                timeout_count: 0,
            },
        };
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value["request"]["maxWaiting"], 6);
        assert_eq!(value["request"]["resolvedCount"], 5);
        assert_eq!(value["pool"]["timeoutCount"], 0);
    }
}
