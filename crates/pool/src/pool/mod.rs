//! The connection pool.
//!
//! [`Pool`] owns every collection (all resources, the available queue, the
//! waiting requests) behind a single lock and routes each unit of work to
//! its operators. Operators do their bookkeeping synchronously while the
//! work is dispatched; the future they return only covers factory calls
//! and nested tasks.

mod reservation;
mod state;
mod waiter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::error::{Error, Result};
use crate::events::{EventBus, PoolEvent, pool_debug};
use crate::factory::ConnectionFactory;
use crate::operator::{Operator, PoolOperator, RequestOperator};
use crate::request::Request;
use crate::resource::ResourceId;
use crate::stats::{Counters, PoolStatus, PoolSummary, RequestSummary, Telemetry};
use crate::task::Task;

pub(crate) use reservation::Reservation;
pub(crate) use state::PoolState;
use waiter::Waiter;

/// Handle type produced by a pool over factory `F`.
pub type Connection<F> = PooledConnection<<F as ConnectionFactory>::Connection>;

pub(crate) type Work = BoxFuture<'static, Result<()>>;

struct Inner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Connection>>,
    telemetry: Arc<Telemetry>,
    operators: Vec<Box<dyn Operator<F>>>,
    initialized: AtomicBool,
}

impl<F: ConnectionFactory> Drop for Inner<F> {
    fn drop(&mut self) {
        self.state.get_mut().stop_idle_timer();
    }
}

/// Asynchronous connection pool over a [`ConnectionFactory`].
///
/// Cloning is cheap; clones share the same pool.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("initialized", &self.is_initialized())
            .field("status", &self.status())
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool over `factory`. Nothing is opened until
    /// [`initialize`](Self::initialize) or the first acquisition.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_operators(
            factory,
            config,
            vec![Box::new(PoolOperator), Box::new(RequestOperator)],
        ))
    }

    pub(crate) fn with_operators(
        factory: F,
        config: PoolConfig,
        operators: Vec<Box<dyn Operator<F>>>,
    ) -> Self {
        let telemetry = Arc::new(Telemetry::new(config.debug));
        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                state: Mutex::new(PoolState::default()),
                telemetry,
                operators,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Open the minimum number of connections.
    ///
    /// Fails with [`Error::DoubleInitialization`] when the pool was already
    /// initialized, explicitly or by a previous acquisition.
    pub async fn initialize(&self) -> Result<()> {
        match self.begin_initialize() {
            Some(work) => work.await,
            None => Err(Error::DoubleInitialization),
        }
    }

    /// Acquire a connection, waiting at most the configured request timeout.
    pub async fn acquire(&self) -> Result<Connection<F>> {
        self.acquire_timeout(self.inner.config.request_timeout())
            .await
    }

    /// Acquire a connection with an explicit timeout (`None` waits forever).
    pub async fn acquire_timeout(&self, timeout: Option<Duration>) -> Result<Connection<F>> {
        let (request, receiver) = Request::new(timeout, Arc::clone(&self.inner.telemetry));
        let waiter = Waiter::new(self.clone(), receiver);
        tracing::debug!(request_id = %request.id(), "connection requested");

        if let Some(initialize) = self.begin_initialize() {
            self.spawn_reported(initialize);
        }
        self.with_state(|state| state.requests.push_back(Arc::clone(&request)));
        let work = self.dispatch(Task::Request(request));
        self.spawn_reported(work);

        waiter.wait().await
    }

    /// Give a connection back to the pool.
    pub async fn release(&self, connection: Connection<F>) -> Result<()> {
        self.dispatch(Task::Return(connection)).await
    }

    /// Close a connection and remove it from the pool, then top the pool
    /// back up to its minimum. Unknown connections are ignored.
    pub async fn destroy(&self, connection: Connection<F>) -> Result<()> {
        self.dispatch(Task::Destroy(connection)).await
    }

    /// Close every connection and reject every waiting request.
    pub async fn clear(&self) -> Result<()> {
        self.with_state(PoolState::stop_idle_timer);
        self.dispatch(Task::Clean).await
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Live resources plus in-flight creations.
    pub fn size(&self) -> usize {
        self.with_state(|state| state.size())
    }

    /// Resources parked and ready to hand out.
    pub fn available(&self) -> usize {
        self.with_state(|state| state.available.len())
    }

    /// How many more connections may be opened.
    pub fn room(&self) -> usize {
        let max = self.inner.config.max;
        self.with_state(|state| state.room(max))
    }

    /// In-flight connection creations.
    pub fn placeholders(&self) -> usize {
        self.with_state(|state| state.placeholders())
    }

    /// Requests still waiting for a connection.
    pub fn waiting(&self) -> usize {
        self.with_state(|state| state.waiting())
    }

    /// Whether initialization was started.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// The configuration this pool runs with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Subscribe to pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.telemetry.events.subscribe()
    }

    /// Snapshot of the pool and its request queue.
    pub fn status(&self) -> PoolStatus {
        let config = &self.inner.config;
        let counters = &self.inner.telemetry.counters;
        let (size, available, queued, pending) = self.with_state(|state| {
            (
                state.size(),
                state.available.len(),
                state.requests.len(),
                state.waiting(),
            )
        });
        PoolStatus {
            pool: PoolSummary {
                size,
                min: config.min,
                max: config.max,
                available,
                timeout_count: counters.idle_evictions(),
            },
            request: RequestSummary {
                queued,
                pending,
                max_waiting: config.max_waiting_requests,
                resolved_count: counters.resolved(),
                rejected_count: counters.rejected(),
                timeout_count: counters.request_timeouts(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Crate-internal primitives
    // -----------------------------------------------------------------------

    pub(crate) fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.telemetry.events
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.inner.telemetry.counters
    }

    /// Run `f` with the pool state locked. Never await inside.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut PoolState<F::Connection>) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    /// Route `task` to the first operator that claims it.
    pub(crate) fn dispatch(&self, task: Task<F::Connection>) -> Work {
        for operator in &self.inner.operators {
            if let Some(work) = operator.work(self, &task) {
                return work;
            }
        }
        let kind = task.kind();
        tracing::error!(%kind, "no operator accepted task");
        future::ready(Err(Error::UnhandledTask { kind })).boxed()
    }

    /// Park a resource in the available queue and announce it.
    pub(crate) fn add_resource_to_available(&self, id: ResourceId) -> Work {
        let available = {
            let mut state = self.inner.state.lock();
            let Some(resource) = state.resource_mut(id).filter(|r| !r.is_invalid()) else {
                return future::ok(()).boxed();
            };
            resource.idle();
            state.push_available(id);
            self.arm_idle_timer(&mut state);
            state.available.len()
        };
        pool_debug!(
            self.events(),
            "Available connection list changed, now the available connection number is: {available}"
        );
        self.dispatch(Task::AvailableChanged)
    }

    fn begin_initialize(&self) -> Option<Work> {
        self.inner
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        tracing::debug!(min = self.inner.config.min, "initializing pool");
        Some(self.dispatch(Task::Initialize))
    }

    fn arm_idle_timer(&self, state: &mut PoolState<F::Connection>) {
        let period = self.inner.config.idle_check_interval;
        if period.is_zero() || state.idle_timer.is_some() {
            return;
        }
        let token = CancellationToken::new();
        state.idle_timer = Some(token.clone());
        tokio::spawn(run_idle_timer(Arc::downgrade(&self.inner), period, token));
    }

    fn spawn_reported(&self, work: Work) {
        let telemetry = Arc::clone(&self.inner.telemetry);
        tokio::spawn(async move {
            if let Err(err) = work.await {
                telemetry.events.error(&err);
            }
        });
    }
}

async fn run_idle_timer<F: ConnectionFactory>(
    pool: Weak<Inner<F>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {
                let Some(inner) = pool.upgrade() else { break };
                let pool = Pool { inner };
                if let Err(err) = pool.dispatch(Task::CheckIdle).await {
                    pool.events().error(&err);
                }
            }
        }
    }
}
