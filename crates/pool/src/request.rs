//! A caller's pending demand for a connection.
//!
//! A request settles exactly once: it is fulfilled with a connection, or
//! rejected with an error (its own timeout, admission control, or a pool
//! clear). The first settlement wins and later attempts are no-ops.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::connection::PooledConnection;
use crate::error::{Error, Result};
use crate::stats::Telemetry;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Build an identifier from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RequestState {
    /// Waiting for a connection
    Pending,
    /// Settled with a connection
    Fulfilled,
    /// Settled with an error
    Rejected,
}

pub(crate) type Outcome<C> = Result<PooledConnection<C>>;

struct RequestInner<C> {
    state: RequestState,
    sender: Option<oneshot::Sender<Outcome<C>>>,
    timer: Option<JoinHandle<()>>,
}

pub(crate) struct Request<C> {
    id: RequestId,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    telemetry: Arc<Telemetry>,
    inner: Mutex<RequestInner<C>>,
}

impl<C> Request<C> {
    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn state(&self) -> RequestState {
        self.inner.lock().state
    }

    /// Pending, and someone is still listening for the outcome.
    pub(crate) fn is_waiting(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == RequestState::Pending
            && inner.sender.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Fulfil with `connection`.
    ///
    /// Returns `true` only when the connection actually reached a caller.
    /// A settled request, or one whose caller went away, returns `false`
    /// and the connection stays with the pool.
    pub(crate) fn resolve(&self, connection: PooledConnection<C>) -> bool {
        let sender = {
            let mut inner = self.inner.lock();
            if inner.state != RequestState::Pending {
                return false;
            }
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.state = RequestState::Fulfilled;
            inner.sender.take()
        };
        let delivered = sender.is_some_and(|tx| tx.send(Ok(connection)).is_ok());
        if delivered {
            self.telemetry.counters.record_resolved();
        }
        delivered
    }

    /// Reject with `error`. Returns `false` when already settled.
    pub(crate) fn reject(&self, error: Error) -> bool {
        let sender = {
            let mut inner = self.inner.lock();
            if inner.state != RequestState::Pending {
                return false;
            }
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.state = RequestState::Rejected;
            inner.sender.take()
        };
        if let Some(tx) = sender {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(Err(error));
        }
        self.telemetry.counters.record_rejected();
        true
    }

    fn time_out(&self) {
        let error = Error::RequestTimeout {
            request_id: self.id,
            created_at: self.created_wall,
        };
        let message = error.to_string();
        if self.reject(error) {
            self.telemetry.counters.record_request_timeout();
            self.telemetry.events.request_timeout(self.id, message);
        }
    }
}

impl<C: Send + Sync + 'static> Request<C> {
    /// Create a pending request and the receiver its caller awaits.
    ///
    /// With a timeout, a timer is armed for `timeout` after creation.
    pub(crate) fn new(
        timeout: Option<Duration>,
        telemetry: Arc<Telemetry>,
    ) -> (Arc<Self>, oneshot::Receiver<Outcome<C>>) {
        let (sender, receiver) = oneshot::channel();
        let request = Arc::new(Self {
            id: RequestId::next(),
            created_at: Instant::now(),
            created_wall: Utc::now(),
            telemetry,
            inner: Mutex::new(RequestInner {
                state: RequestState::Pending,
                sender: Some(sender),
                timer: None,
            }),
        });
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            request.start_timer(timeout);
        }
        (request, receiver)
    }

    fn start_timer(self: &Arc<Self>, timeout: Duration) {
        let deadline = self.created_at + timeout;
        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(request) = weak.upgrade() {
                request.time_out();
            }
        });
        let mut inner = self.inner.lock();
        if inner.state == RequestState::Pending {
            inner.timer = Some(timer);
        } else {
            timer.abort();
        }
    }
}

impl<C> Drop for Request<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().timer.take() {
            timer.abort();
        }
    }
}

impl<C> fmt::Debug for Request<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_wall)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}
