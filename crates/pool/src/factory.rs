//! The driver seam: how a pool opens, checks and closes connections.

use std::sync::Arc;

use async_trait::async_trait;

/// Opens, validates and closes connections for a [`Pool`](crate::Pool).
///
/// Implementations wrap a database driver. Every method may suspend; the
/// pool never holds its internal lock across a call into the factory.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type produced by this factory.
    type Connection: Send + Sync + 'static;

    /// The driver error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    async fn create(&self) -> Result<Self::Connection, Self::Error>;

    /// Close a connection. Called at most once per connection.
    async fn destroy(&self, connection: &Self::Connection) -> Result<(), Self::Error>;

    /// Check that a connection is still usable before it is handed out.
    ///
    /// `Ok(false)` and `Err(_)` both condemn the connection. The default
    /// implementation trusts every connection.
    async fn validate(&self, _connection: &Self::Connection) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    type Connection = T::Connection;
    type Error = T::Error;

    async fn create(&self) -> Result<Self::Connection, Self::Error> {
        (**self).create().await
    }

    async fn destroy(&self, connection: &Self::Connection) -> Result<(), Self::Error> {
        (**self).destroy(connection).await
    }

    async fn validate(&self, connection: &Self::Connection) -> Result<bool, Self::Error> {
        (**self).validate(connection).await
    }
}
