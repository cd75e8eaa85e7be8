//! Simple pooling example
//!
//! Shows acquire, release and status reporting against an in-memory
//! connection factory, with pool debug output routed through `tracing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reservoir_pool::prelude::*;

/// Pretend database session
#[derive(Debug)]
struct Session {
    id: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("session error: {0}")]
struct SessionError(String);

#[derive(Default)]
struct SessionFactory {
    next_id: AtomicU64,
}

#[async_trait]
impl ConnectionFactory for SessionFactory {
    type Connection = Session;
    type Error = SessionError;

    async fn create(&self) -> std::result::Result<Session, SessionError> {
        // Simulate a handshake
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Session {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    async fn destroy(&self, session: &Session) -> std::result::Result<(), SessionError> {
        tracing::info!(session = session.id, "session closed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = PoolConfig::new(2, 10)
        .with_request_timeout(Duration::from_secs(5))
        .with_debug(true);
    let pool = Pool::new(SessionFactory::default(), config)?;
    pool.initialize().await?;

    let session = pool.acquire().await?;
    println!("acquired session {}", session.id);
    println!("{}", serde_json::to_string_pretty(&pool.status())?);

    pool.release(session).await?;
    println!("{}", serde_json::to_string_pretty(&pool.status())?);

    pool.clear().await?;
    Ok(())
}
