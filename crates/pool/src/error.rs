//! Error types for the connection pool
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::request::RequestId;
use crate::task::TaskKind;

/// Boxed driver error, as produced by a [`ConnectionFactory`](crate::ConnectionFactory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for every pool operation and every settled request.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The factory failed to open a new connection
    #[error("Connection creation failed: {source}")]
    ConnectionCreate {
        /// The driver error
        #[source]
        source: BoxError,
    },

    /// The factory failed to close a connection
    #[error("Connection destroy failed: {source}")]
    ConnectionDestroy {
        /// The driver error
        #[source]
        source: BoxError,
    },

    /// A request was still waiting when its timer fired
    #[error("Request timeout. Request info: (id: {request_id}, creation time: {created_at})")]
    RequestTimeout {
        /// The request identifier
        request_id: RequestId,
        /// Wall-clock time the request was created
        created_at: DateTime<Utc>,
    },

    /// Admission control rejected a request because too many are waiting
    #[error("Max waiting requests count exceeded: {queued} queued, limit is {limit}")]
    MaxWaitingRequestsExceeded {
        /// Configured `max_waiting_requests`
        limit: usize,
        /// Queue length observed at admission time
        queued: usize,
    },

    /// The handle given to `release` is not tracked by this pool
    #[error("Connection is not part of this pool")]
    NotPartOfPool,

    /// `initialize` was called on an already initialized pool
    #[error("Pool has already been initialized, tried to initialize twice")]
    DoubleInitialization,

    /// No operator claimed a dispatched task
    #[error("No operator accepted task '{kind}'")]
    UnhandledTask {
        /// Kind of the orphaned task
        kind: TaskKind,
    },

    /// The pool was cleared while the request was waiting
    #[error("Pool cleared, request {request_id} was discarded")]
    PoolCleared {
        /// The request identifier
        request_id: RequestId,
    },

    /// Generic internal error
    #[error("Internal pool error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a driver error raised while creating a connection
    pub fn connection_create<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionCreate {
            source: Box::new(source),
        }
    }

    /// Wrap a driver error raised while closing a connection
    pub fn connection_destroy<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionDestroy {
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if retrying the same operation later can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. }
                | Self::MaxWaitingRequestsExceeded { .. }
                | Self::ConnectionCreate { .. }
                | Self::PoolCleared { .. }
        )
    }

    /// Whether the error settled a request through its timer
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }
}
