//! # Reservoir connection pool
//!
//! A generic asynchronous connection pool. Connections come from a
//! [`ConnectionFactory`]; callers [`acquire`](Pool::acquire) them and give
//! them back with [`release`](Pool::release) or close them with
//! [`destroy`](Pool::destroy).
//!
//! The pool keeps at least `min` and at most `max` connections, creates
//! only as many connections as waiting requests need, bounds the waiting
//! queue, times requests out, validates every connection before handing it
//! out, and evicts connections that stay idle too long.
//!
//! ```rust,ignore
//! use reservoir_pool::prelude::*;
//!
//! let pool = Pool::new(factory, PoolConfig::new(2, 10))?;
//! let connection = pool.acquire().await?;
//! connection.query("select 1").await?;
//! pool.release(connection).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod factory;
pub mod pool;
pub mod request;
pub mod stats;
pub mod task;
pub mod testing;

#[cfg(feature = "metrics")]
pub mod metrics;

mod operator;
mod resource;

pub use config::PoolConfig;
pub use connection::PooledConnection;
pub use error::{BoxError, Error, Result};
pub use events::{EventBus, PoolEvent};
pub use factory::ConnectionFactory;
pub use pool::{Connection, Pool};
pub use request::RequestId;
pub use stats::{PoolStatus, PoolSummary, RequestSummary};
pub use task::TaskKind;

#[cfg(feature = "metrics")]
pub use metrics::{MetricsCollector, spawn_metrics_collector};

/// Common imports for pool users.
pub mod prelude {
    pub use crate::config::PoolConfig;
    pub use crate::connection::PooledConnection;
    pub use crate::error::{Error, Result};
    pub use crate::events::PoolEvent;
    pub use crate::factory::ConnectionFactory;
    pub use crate::pool::Pool;
}
