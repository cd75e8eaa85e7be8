//! Testing utilities for pool users
//!
//! [`MockFactory`] is a scriptable [`ConnectionFactory`]: it can fail
//! creations, report connections unhealthy, add creation or validation
//! latency, and records every call it receives.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::factory::ConnectionFactory;

/// Connection produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    open: AtomicBool,
}

impl MockConnection {
    /// Factory-assigned identifier, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `false` once the factory destroyed this connection.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Driver error raised by [`MockFactory`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MockError(pub String);

/// Record of factory calls for test verification
#[derive(Debug, Clone)]
pub enum FactoryCall {
    Create {
        connection_id: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    Destroy {
        connection_id: u64,
        timestamp: DateTime<Utc>,
    },
    Validate {
        connection_id: u64,
        healthy: bool,
        timestamp: DateTime<Utc>,
    },
}

impl FactoryCall {
    /// Compare two calls ignoring timestamps.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Create { connection_id: a, .. }, Self::Create { connection_id: b, .. }) => a == b,
            (Self::Destroy { connection_id: a, .. }, Self::Destroy { connection_id: b, .. }) => a == b,
            (
                Self::Validate { connection_id: a, healthy: ha, .. },
                Self::Validate { connection_id: b, healthy: hb, .. },
            ) => a == b && ha == hb,
            _ => false,
        }
    }
}

/// Scriptable connection factory for tests.
#[derive(Debug, Default)]
pub struct MockFactory {
    next_id: AtomicU64,
    failing_creates: AtomicUsize,
    unhealthy: AtomicBool,
    failing_validation: AtomicBool,
    create_delay: Mutex<Duration>,
    validate_delay: Mutex<Duration>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    validated: AtomicUsize,
    call_history: Mutex<Vec<FactoryCall>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` creations fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Make validation report every connection healthy or unhealthy.
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Make validation return an error instead of a verdict.
    pub fn fail_validation(&self, fail: bool) {
        self.failing_validation.store(fail, Ordering::SeqCst);
    }

    /// Delay every creation by `delay`.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = delay;
    }

    /// Delay every validation by `delay`.
    pub fn set_validate_delay(&self, delay: Duration) {
        *self.validate_delay.lock() = delay;
    }

    /// Build a connection without recording a call.
    pub fn create_connection(&self) -> MockConnection {
        MockConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            open: AtomicBool::new(true),
        }
    }

    /// Successful creations so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Destructions so far.
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Validations so far.
    pub fn validate_count(&self) -> usize {
        self.validated.load(Ordering::SeqCst)
    }

    /// Connections created and not yet destroyed.
    pub fn open_count(&self) -> usize {
        self.created_count().saturating_sub(self.destroyed_count())
    }

    pub fn call_history(&self) -> Vec<FactoryCall> {
        self.call_history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.lock().clear();
    }

    pub fn verify_call(&self, expected_call: &FactoryCall) -> bool {
        self.call_history
            .lock()
            .iter()
            .any(|call| call.matches(expected_call))
    }

    fn record(&self, call: FactoryCall) {
        self.call_history.lock().push(call);
    }

    fn take_create_failure(&self) -> bool {
        self.failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = MockError;

    async fn create(&self) -> Result<MockConnection, MockError> {
        let delay = *self.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.take_create_failure() {
            self.record(FactoryCall::Create {
                connection_id: None,
                timestamp: Utc::now(),
            });
            return Err(MockError("connection refused".to_owned()));
        }
        let connection = self.create_connection();
        self.created.fetch_add(1, Ordering::SeqCst);
        self.record(FactoryCall::Create {
            connection_id: Some(connection.id),
            timestamp: Utc::now(),
        });
        Ok(connection)
    }

    async fn destroy(&self, connection: &MockConnection) -> Result<(), MockError> {
        if !connection.open.swap(false, Ordering::SeqCst) {
            return Err(MockError(format!("connection {} already closed", connection.id)));
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.record(FactoryCall::Destroy {
            connection_id: connection.id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn validate(&self, connection: &MockConnection) -> Result<bool, MockError> {
        let delay = *self.validate_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.validated.fetch_add(1, Ordering::SeqCst);
        if self.failing_validation.load(Ordering::SeqCst) {
            return Err(MockError("validation query failed".to_owned()));
        }
        let healthy = connection.is_open() && !self.unhealthy.load(Ordering::SeqCst);
        self.record(FactoryCall::Validate {
            connection_id: connection.id,
            healthy,
            timestamp: Utc::now(),
        });
        Ok(healthy)
    }
}
