//! PostgreSQL connection pool.
//!
//! A thin wrapper over `diesel-async`'s bb8 pool. Sizing is fixed: the
//! service is a single process talking to one database, so there is nothing
//! for callers to vary. Whether the pool failed to build or a checkout
//! timed out, the repositories treat it the same way (their `Connection`
//! port error), so pool failures collapse into one opaque error carrying
//! the underlying message.

use std::time::Duration;

use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

const MAX_CONNECTIONS: u32 = 25;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// The pool could not be built or produced no connection in time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("database pool unavailable: {0}")]
pub struct PoolError(pub String);

/// Shared PostgreSQL pool; cheap to clone.
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// Build the pool against `database_url`. Fails when the URL is
    /// unusable.
    pub async fn connect(database_url: &str) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let inner = Pool::builder()
            .max_size(MAX_CONNECTIONS)
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)
            .await
            .map_err(|err| PoolError(err.to_string()))?;
        Ok(Self { inner })
    }

    /// Check a connection out, waiting at most the checkout timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError(err.to_string()))
    }
}
