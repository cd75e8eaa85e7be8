//! Event broadcasting for pool observability.
//!
//! Provides [`PoolEvent`] variants emitted while the pool runs and an
//! [`EventBus`] backed by `tokio::sync::broadcast`. Every event is also
//! logged through `tracing`.

use tokio::sync::broadcast;

use crate::error::Error;
use crate::request::RequestId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted by a running pool.
///
/// Subscribers receive cloned copies via [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Diagnostic trace, only published when the pool runs with `debug`.
    Debug {
        /// Formatted trace line.
        message: String,
    },
    /// A background operation failed and nobody was awaiting it.
    Error {
        /// Error description.
        message: String,
    },
    /// The factory failed to open a connection.
    ConnectionCreateError {
        /// Error description.
        message: String,
    },
    /// A connection failed validation and was condemned.
    ConnectionValidationError {
        /// Error description.
        message: String,
    },
    /// A waiting request hit its timeout.
    RequestTimeout {
        /// The request that timed out.
        request_id: RequestId,
        /// Error description.
        message: String,
    },
}

impl PoolEvent {
    /// Stable event name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Debug { .. } => "poolDebug",
            Self::Error { .. } => "poolError",
            Self::ConnectionCreateError { .. } => "connectionCreateError",
            Self::ConnectionValidationError { .. } => "connectionValidationError",
            Self::RequestTimeout { .. } => "requestTimeout",
        }
    }

    /// Human-readable payload of the event.
    pub fn message(&self) -> &str {
        match self {
            Self::Debug { message }
            | Self::Error { message }
            | Self::ConnectionCreateError { message }
            | Self::ConnectionValidationError { message }
            | Self::RequestTimeout { message, .. } => message,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped.
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
    debug: bool,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// `debug` controls whether [`PoolEvent::Debug`] events are published.
    #[must_use]
    pub fn new(buffer_size: usize, debug: bool) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender, debug }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    /// Whether debug events are published.
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub(crate) fn debug(&self, message: String) {
        if self.debug {
            self.emit(PoolEvent::Debug { message });
        }
    }

    pub(crate) fn error(&self, err: &Error) {
        tracing::error!(error = %err, "pool operation failed");
        self.emit(PoolEvent::Error {
            message: err.to_string(),
        });
    }

    pub(crate) fn connection_create_error(&self, err: &Error) {
        tracing::warn!(error = %err, "failed to create connection");
        self.emit(PoolEvent::ConnectionCreateError {
            message: err.to_string(),
        });
    }

    pub(crate) fn connection_validation_error(&self, message: String) {
        tracing::warn!(%message, "connection failed validation");
        self.emit(PoolEvent::ConnectionValidationError { message });
    }

    pub(crate) fn request_timeout(&self, request_id: RequestId, message: String) {
        tracing::debug!(%request_id, "request timed out");
        self.emit(PoolEvent::RequestTimeout {
            request_id,
            message,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024, false)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .field("debug", &self.debug)
            .finish()
    }
}

/// Trace a pool step through `tracing` and, when enabled, the event bus.
///
/// The message is only formatted when someone will see it.
macro_rules! pool_debug {
    ($events:expr, $($arg:tt)+) => {{
        let events: &$crate::events::EventBus = $events;
        if events.debug_enabled() || ::tracing::enabled!(::tracing::Level::DEBUG) {
            let message = ::std::format!($($arg)+);
            ::tracing::debug!("{message}");
            events.debug(message);
        }
    }};
}

pub(crate) use pool_debug;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_and_receive() {
        let bus = EventBus::new(16, false);
        let mut rx = bus.subscribe();

        bus.error(&Error::NotPartOfPool);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "poolError");
        assert_eq!(event.message(), "Connection is not part of this pool");
    }

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16, true);
        bus.debug("nobody listens".to_owned());
    }

    #[tokio::test]
    async fn debug_events_respect_flag() {
        let quiet = EventBus::new(16, false);
        let mut quiet_rx = quiet.subscribe();
        pool_debug!(&quiet, "step {}", 1);
        assert!(quiet_rx.try_recv().is_err());

        let loud = EventBus::new(16, true);
        let mut loud_rx = loud.subscribe();
        pool_debug!(&loud, "step {}", 2);
        assert_eq!(
            loud_rx.try_recv().unwrap(),
            PoolEvent::Debug {
                message: "step 2".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16, false);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.request_timeout(RequestId::from_raw(3), "late".to_owned());

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                PoolEvent::RequestTimeout { request_id, .. } => {
                    assert_eq!(request_id, RequestId::from_raw(3));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn event_names_are_stable() {
        let names: Vec<_> = [
            PoolEvent::Debug { message: String::new() },
            PoolEvent::Error { message: String::new() },
            PoolEvent::ConnectionCreateError { message: String::new() },
            PoolEvent::ConnectionValidationError { message: String::new() },
        ]
        .iter()
        .map(PoolEvent::name)
        .collect();
        assert_eq!(
            names,
            [
                "poolDebug",
                "poolError",
                "connectionCreateError",
                "connectionValidationError"
            ]
        );
    }

    #[test]
    fn debug_impl_shows_subscriber_count() {
        let bus = EventBus::default();
        let _rx = bus.subscribe();
        assert!(format!("{bus:?}").contains("subscribers: 1"));
    }
}
