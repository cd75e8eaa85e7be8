//! Units of work routed through the operator chain.

use std::fmt;
use std::sync::Arc;

use crate::connection::PooledConnection;
use crate::request::Request;
use crate::resource::ResourceId;

/// A unit of work dispatched to the operators of a pool.
pub(crate) enum Task<C> {
    /// Bring the pool up to its minimum size.
    Initialize,
    /// Validate a fresh or returned resource and hand it out or park it.
    Delivery(ResourceId),
    /// A caller gave a connection back.
    Return(PooledConnection<C>),
    /// Sweep the available queue for idle resources.
    CheckIdle,
    /// A caller asked for a connection to be closed.
    Destroy(PooledConnection<C>),
    /// Tear everything down.
    Clean,
    /// The available queue grew; waiting requests may be served.
    AvailableChanged,
    /// A new request was queued.
    Request(Arc<Request<C>>),
}

impl<C> Task<C> {
    /// Discriminant of this task.
    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            Self::Initialize => TaskKind::Initialize,
            Self::Delivery(_) => TaskKind::Delivery,
            Self::Return(_) => TaskKind::Return,
            Self::CheckIdle => TaskKind::CheckIdle,
            Self::Destroy(_) => TaskKind::Destroy,
            Self::Clean => TaskKind::Clean,
            Self::AvailableChanged => TaskKind::AvailableChanged,
            Self::Request(_) => TaskKind::Request,
        }
    }
}

impl<C> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivery(id) => write!(f, "Delivery({id})"),
            Self::Request(request) => write!(f, "Request({})", request.id()),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Kind of a pool task, as reported by [`Error::UnhandledTask`](crate::Error::UnhandledTask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Pool initialization
    Initialize,
    /// Delivery of a resource
    Delivery,
    /// Return of a released connection
    Return,
    /// Idle sweep
    CheckIdle,
    /// Destruction of a connection
    Destroy,
    /// Pool teardown
    Clean,
    /// Growth of the available queue
    AvailableChanged,
    /// New acquisition request
    Request,
}

impl TaskKind {
    /// Stable name of the task kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Delivery => "delivery",
            Self::Return => "return",
            Self::CheckIdle => "check_idle",
            Self::Destroy => "destroy",
            Self::Clean => "clean",
            Self::AvailableChanged => "available_changed",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let task: Task<()> = Task::Delivery(ResourceId::from_raw(4));
        assert_eq!(task.kind(), TaskKind::Delivery);
        assert_eq!(format!("{task:?}"), "Delivery(4)");
        assert_eq!(Task::<()>::CheckIdle.kind().to_string(), "check_idle");
    }
}
