//! The caller's side of an acquisition.

use tokio::sync::oneshot;

use super::{Connection, Pool};
use crate::error::{Error, Result};
use crate::factory::ConnectionFactory;
use crate::request::Outcome;
use crate::task::Task;

/// Receiving end of a request that gives back anything delivered after
/// its caller stopped waiting.
///
/// Dropping an `acquire` future between delivery and the next poll would
/// otherwise leave the connection allocated with no holder.
pub(crate) struct Waiter<F: ConnectionFactory> {
    pool: Pool<F>,
    receiver: Option<oneshot::Receiver<Outcome<F::Connection>>>,
}

impl<F: ConnectionFactory> Waiter<F> {
    pub(crate) fn new(pool: Pool<F>, receiver: oneshot::Receiver<Outcome<F::Connection>>) -> Self {
        Self {
            pool,
            receiver: Some(receiver),
        }
    }

    /// Wait for the request to settle.
    pub(crate) async fn wait(mut self) -> Result<Connection<F>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(Error::internal("request already awaited"));
        };
        let outcome = receiver.await;
        self.receiver = None;
        outcome.unwrap_or_else(|_| Err(Error::internal("request dropped before it was settled")))
    }
}

impl<F: ConnectionFactory> Drop for Waiter<F> {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        receiver.close();
        let Ok(Ok(connection)) = receiver.try_recv() else {
            return;
        };
        // Parking a resource spawns tasks, so it needs a runtime.
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("acquisition abandoned outside a runtime, connection not returned");
            return;
        }
        tracing::debug!("acquisition abandoned after delivery, returning connection");
        let work = self.pool.dispatch(Task::Return(connection));
        self.pool.spawn_reported(work);
    }
}
