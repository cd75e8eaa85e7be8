//! RAII capacity reservation for an in-flight connection creation.

use crate::factory::ConnectionFactory;
use crate::pool::Pool;
use crate::resource::{Placeholder, ResourceId};

/// Holds a placeholder in the pool while a connection is being created.
///
/// Dropping the reservation removes the placeholder, whether creation
/// failed or the creating future was dropped. [`commit`](Self::commit)
/// turns the placeholder into a live resource instead.
pub(crate) struct Reservation<F: ConnectionFactory> {
    pool: Pool<F>,
    placeholder: Option<Placeholder>,
}

impl<F: ConnectionFactory> Reservation<F> {
    /// Reserve one slot, or `None` when the pool has no room left.
    pub(crate) fn reserve(pool: &Pool<F>) -> Option<Self> {
        let max = pool.config().max;
        let placeholder = pool.with_state(|state| {
            (state.room(max) > 0).then(|| state.add_placeholder())
        })?;
        Some(Self {
            pool: pool.clone(),
            placeholder: Some(placeholder),
        })
    }

    /// Replace the placeholder with a resource wrapping `connection`.
    ///
    /// Returns the connection back when the placeholder was revoked in the
    /// meantime (the pool was cleared); the caller owns closing it.
    pub(crate) fn commit(mut self, connection: F::Connection) -> Result<ResourceId, F::Connection> {
        match self.placeholder.take() {
            Some(placeholder) => self
                .pool
                .with_state(|state| state.replace_placeholder(placeholder, connection)),
            None => Err(connection),
        }
    }
}

impl<F: ConnectionFactory> Drop for Reservation<F> {
    fn drop(&mut self) {
        if let Some(placeholder) = self.placeholder.take() {
            self.pool
                .with_state(|state| state.remove_placeholder(placeholder));
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Reservation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::testing::MockFactory;

    fn pool(max: usize) -> Pool<MockFactory> {
        Pool::new(MockFactory::new(), PoolConfig::new(0, max)).unwrap()
    }

    #[test]
    fn drop_releases_placeholder() {
        let pool = pool(2);
        let reservation = Reservation::reserve(&pool).unwrap();
        assert_eq!(pool.placeholders(), 1);
        drop(reservation);
        assert_eq!(pool.placeholders(), 0);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn reserve_respects_room() {
        let pool = pool(1);
        let held = Reservation::reserve(&pool).unwrap();
        assert!(Reservation::reserve(&pool).is_none());
        drop(held);
        assert!(Reservation::reserve(&pool).is_some());
    }

    #[tokio::test]
    async fn commit_turns_placeholder_into_resource() {
        let pool = pool(1);
        let factory = MockFactory::new();
        let connection = factory.create_connection();

        let reservation = Reservation::reserve(&pool).unwrap();
        assert!(reservation.commit(connection).is_ok());
        assert_eq!(pool.placeholders(), 0);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn commit_after_revocation_returns_connection() {
        let pool = pool(1);
        let factory = MockFactory::new();

        let reservation = Reservation::reserve(&pool).unwrap();
        pool.with_state(|state| drop(state.drain()));

        let orphan = reservation.commit(factory.create_connection()).unwrap_err();
        assert!(orphan.is_open());
        assert_eq!(pool.size(), 0);
    }
}
