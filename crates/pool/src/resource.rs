//! Pool-side wrapper around one live connection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

use crate::connection::PooledConnection;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a resource within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ResourceState {
    /// Parked, or freshly created and not handed out yet
    Idle,
    /// Handed out to a caller
    Allocated,
    /// Condemned; never handed out again
    Invalid,
}

/// A live connection together with its allocation bookkeeping.
///
/// `last_idle_at` only moves on a transition into `Idle`, so re-idling a
/// resource that is already idle keeps its idle clock running.
pub(crate) struct Resource<C> {
    id: ResourceId,
    connection: PooledConnection<C>,
    state: ResourceState,
    last_allocated_at: Option<Instant>,
    last_idle_at: Instant,
}

impl<C> Resource<C> {
    pub(crate) fn new(connection: PooledConnection<C>) -> Self {
        Self {
            id: ResourceId::next(),
            connection,
            state: ResourceState::Idle,
            last_allocated_at: None,
            last_idle_at: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn connection(&self) -> &PooledConnection<C> {
        &self.connection
    }

    pub(crate) fn state(&self) -> ResourceState {
        self.state
    }

    pub(crate) fn last_idle_at(&self) -> Instant {
        self.last_idle_at
    }

    pub(crate) fn last_allocated_at(&self) -> Option<Instant> {
        self.last_allocated_at
    }

    pub(crate) fn is_invalid(&self) -> bool {
        self.state == ResourceState::Invalid
    }

    /// Mark as handed out. Unconditional.
    pub(crate) fn allocate(&mut self) {
        self.state = ResourceState::Allocated;
        self.last_allocated_at = Some(Instant::now());
    }

    /// Mark as parked; the idle clock restarts only on a real transition.
    pub(crate) fn idle(&mut self) {
        if self.state != ResourceState::Idle {
            self.state = ResourceState::Idle;
            self.last_idle_at = Instant::now();
        }
    }

    pub(crate) fn invalid(&mut self) {
        self.state = ResourceState::Invalid;
    }
}

impl<C> fmt::Debug for Resource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("last_allocated_at", &self.last_allocated_at())
            .finish_non_exhaustive()
    }
}

/// Capacity held for a connection whose creation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Placeholder(u64);

impl Placeholder {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An entry of the "all resources" collection.
pub(crate) enum Slot<C> {
    Placeholder(Placeholder),
    Resource(Resource<C>),
}

impl<C> Slot<C> {
    pub(crate) fn as_resource(&self) -> Option<&Resource<C>> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Placeholder(_) => None,
        }
    }

    pub(crate) fn as_resource_mut(&mut self) -> Option<&mut Resource<C>> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Placeholder(_) => None,
        }
    }

    pub(crate) fn is_placeholder(&self, placeholder: Placeholder) -> bool {
        matches!(self, Self::Placeholder(p) if *p == placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resource() -> Resource<u32> {
        Resource::new(PooledConnection::new(7))
    }

    #[tokio::test(start_paused = true)]
    async fn new_resource_is_idle() {
        let res = resource();
        assert_eq!(res.state(), ResourceState::Idle);
        assert_eq!(res.last_allocated_at(), None);
        assert_eq!(*res.connection().get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_idle_keeps_clock() {
        let mut res = resource();
        let first = res.last_idle_at();
        tokio::time::advance(Duration::from_millis(50)).await;
        res.idle();
        assert_eq!(res.last_idle_at(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_after_allocation_restarts_clock() {
        let mut res = resource();
        let first = res.last_idle_at();
        tokio::time::advance(Duration::from_millis(50)).await;
        res.allocate();
        assert_eq!(res.state(), ResourceState::Allocated);
        assert!(res.last_allocated_at().is_some());
        res.idle();
        assert!(res.last_idle_at() > first);
    }

    #[test]
    fn ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert_ne!(Placeholder::next(), Placeholder::next());
    }

    #[tokio::test]
    async fn slot_placeholder_matching() {
        let placeholder = Placeholder::next();
        let slot: Slot<u32> = Slot::Placeholder(placeholder);
        assert!(slot.is_placeholder(placeholder));
        assert!(slot.as_resource().is_none());
        let mut slot = Slot::Resource(resource());
        slot.as_resource_mut().unwrap().invalid();
        assert!(slot.as_resource().unwrap().is_invalid());
    }
}
