//! Caller-facing connection handle.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A connection handed out by a pool.
///
/// The handle is cheap to clone. Equality is identity: two handles are
/// equal when they point at the same underlying connection. Give it back
/// with [`Pool::release`](crate::Pool::release) or close it with
/// [`Pool::destroy`](crate::Pool::destroy).
pub struct PooledConnection<C> {
    inner: Arc<C>,
}

impl<C> PooledConnection<C> {
    pub(crate) fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }

    /// Borrow the underlying connection.
    pub fn get(&self) -> &C {
        &self.inner
    }

    /// Whether both handles refer to the same connection.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Clone for PooledConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C> PartialEq for PooledConnection<C> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<C> Eq for PooledConnection<C> {}

impl<C: fmt::Debug> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.inner).finish()
    }
}
