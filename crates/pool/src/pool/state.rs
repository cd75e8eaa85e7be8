//! The collections a pool owns, and the primitives that mutate them.
//!
//! Every primitive is synchronous and tolerates an absent target, so two
//! operations racing on the same resource or request never fail.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::connection::PooledConnection;
use crate::request::{Request, RequestId};
use crate::resource::{Placeholder, Resource, ResourceId, Slot};

pub(crate) struct PoolState<C> {
    pub(crate) all: Vec<Slot<C>>,
    pub(crate) available: VecDeque<ResourceId>,
    pub(crate) requests: VecDeque<Arc<Request<C>>>,
    pub(crate) idle_timer: Option<CancellationToken>,
}

impl<C> Default for PoolState<C> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            available: VecDeque::new(),
            requests: VecDeque::new(),
            idle_timer: None,
        }
    }
}

impl<C> PoolState<C> {
    pub(crate) fn size(&self) -> usize {
        self.all.len()
    }

    pub(crate) fn room(&self, max: usize) -> usize {
        max.saturating_sub(self.all.len())
    }

    pub(crate) fn placeholders(&self) -> usize {
        self.all
            .iter()
            .filter(|slot| matches!(slot, Slot::Placeholder(_)))
            .count()
    }

    /// Requests still waiting for a connection.
    pub(crate) fn waiting(&self) -> usize {
        self.requests.iter().filter(|r| r.is_waiting()).count()
    }

    // -- placeholders --

    pub(crate) fn add_placeholder(&mut self) -> Placeholder {
        let placeholder = Placeholder::next();
        self.all.push(Slot::Placeholder(placeholder));
        placeholder
    }

    pub(crate) fn remove_placeholder(&mut self, placeholder: Placeholder) -> bool {
        match self.all.iter().position(|s| s.is_placeholder(placeholder)) {
            Some(index) => {
                self.all.remove(index);
                true
            }
            None => false,
        }
    }

    /// Swap a placeholder for a live resource built from `connection`.
    ///
    /// Gives the connection back when the placeholder was revoked.
    pub(crate) fn replace_placeholder(
        &mut self,
        placeholder: Placeholder,
        connection: C,
    ) -> Result<ResourceId, C> {
        let Some(slot) = self.all.iter_mut().find(|s| s.is_placeholder(placeholder)) else {
            return Err(connection);
        };
        let resource = Resource::new(PooledConnection::new(connection));
        let id = resource.id();
        *slot = Slot::Resource(resource);
        Ok(id)
    }

    // -- resources --

    pub(crate) fn resource(&self, id: ResourceId) -> Option<&Resource<C>> {
        self.all
            .iter()
            .filter_map(Slot::as_resource)
            .find(|r| r.id() == id)
    }

    pub(crate) fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource<C>> {
        self.all
            .iter_mut()
            .filter_map(Slot::as_resource_mut)
            .find(|r| r.id() == id)
    }

    pub(crate) fn find_by_connection(&self, connection: &PooledConnection<C>) -> Option<ResourceId> {
        self.all
            .iter()
            .filter_map(Slot::as_resource)
            .find(|r| r.connection().same_as(connection))
            .map(Resource::id)
    }

    /// Remove a resource from both collections and hand it to the caller.
    pub(crate) fn take_resource(&mut self, id: ResourceId) -> Option<Resource<C>> {
        self.remove_from_available(id);
        let index = self
            .all
            .iter()
            .position(|slot| slot.as_resource().is_some_and(|r| r.id() == id))?;
        match self.all.remove(index) {
            Slot::Resource(resource) => Some(resource),
            Slot::Placeholder(_) => None,
        }
    }

    // -- available queue --

    /// Append to the available queue unless already queued.
    pub(crate) fn push_available(&mut self, id: ResourceId) -> bool {
        if self.available.contains(&id) {
            return false;
        }
        self.available.push_back(id);
        true
    }

    pub(crate) fn remove_from_available(&mut self, id: ResourceId) -> bool {
        let Some(index) = self.available.iter().position(|a| *a == id) else {
            return false;
        };
        self.available.remove(index);
        self.disarm_if_drained();
        true
    }

    pub(crate) fn dequeue_available(&mut self) -> Option<ResourceId> {
        let id = self.available.pop_front();
        self.disarm_if_drained();
        id
    }

    fn disarm_if_drained(&mut self) {
        if self.available.is_empty() {
            self.stop_idle_timer();
        }
    }

    pub(crate) fn stop_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel();
        }
    }

    // -- request queue --

    pub(crate) fn dequeue_request(&mut self) -> Option<Arc<Request<C>>> {
        self.requests.pop_front()
    }

    pub(crate) fn remove_request(&mut self, id: RequestId) -> Option<Arc<Request<C>>> {
        let index = self.requests.iter().position(|r| r.id() == id)?;
        self.requests.remove(index)
    }

    /// Drop settled requests and requests nobody awaits anymore.
    pub(crate) fn purge_settled_requests(&mut self) {
        self.requests.retain(|r| r.is_waiting());
    }

    /// Empty every collection, returning the live resources and the requests.
    pub(crate) fn drain(&mut self) -> (Vec<Resource<C>>, Vec<Arc<Request<C>>>) {
        self.stop_idle_timer();
        self.available.clear();
        let resources = self
            .all
            .drain(..)
            .filter_map(|slot| match slot {
                Slot::Resource(resource) => Some(resource),
                Slot::Placeholder(_) => None,
            })
            .collect();
        let requests = self.requests.drain(..).collect();
        (resources, requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_lifecycle() {
        let mut state = PoolState::<u32>::default();
        let kept = state.add_placeholder();
        let dropped = state.add_placeholder();
        assert_eq!((state.size(), state.placeholders(), state.room(5)), (2, 2, 3));

        assert!(state.remove_placeholder(dropped));
        assert!(!state.remove_placeholder(dropped));

        let id = state.replace_placeholder(kept, 9).unwrap();
        assert_eq!(state.placeholders(), 0);
        assert_eq!(*state.resource(id).unwrap().connection().get(), 9);
        assert_eq!(state.replace_placeholder(dropped, 10), Err(10));
    }

    #[test]
    fn available_queue_is_fifo_without_duplicates() {
        let mut state = PoolState::<u32>::default();
        let p1 = state.add_placeholder();
        let p2 = state.add_placeholder();
        let first = state.replace_placeholder(p1, 1).unwrap();
        let second = state.replace_placeholder(p2, 2).unwrap();

        assert!(state.push_available(first));
        assert!(state.push_available(second));
        assert!(!state.push_available(first));
        assert_eq!(state.dequeue_available(), Some(first));
        assert_eq!(state.dequeue_available(), Some(second));
        assert_eq!(state.dequeue_available(), None);
    }

    #[test]
    fn take_resource_is_idempotent() {
        let mut state = PoolState::<u32>::default();
        let placeholder = state.add_placeholder();
        let id = state.replace_placeholder(placeholder, 3).unwrap();
        state.push_available(id);

        let connection = state.resource(id).unwrap().connection().clone();
        assert_eq!(state.find_by_connection(&connection), Some(id));

        assert!(state.take_resource(id).is_some());
        assert!(state.take_resource(id).is_none());
        assert!(state.available.is_empty());
        assert_eq!(state.find_by_connection(&connection), None);
    }

    #[test]
    fn draining_available_cancels_idle_timer() {
        let mut state = PoolState::<u32>::default();
        let placeholder = state.add_placeholder();
        let id = state.replace_placeholder(placeholder, 3).unwrap();
        state.push_available(id);

        let timer = CancellationToken::new();
        state.idle_timer = Some(timer.clone());
        assert!(state.remove_from_available(id));
        assert!(timer.is_cancelled());
        assert!(state.idle_timer.is_none());
    }
}
