//! Postgres session advisory locks.
//!
//! A held lock pins the pooled connection that took it; releasing the lock
//! unlocks on that same connection and returns it to the pool.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::{ControlError, LockService};

/// Lock service over `pg_try_advisory_lock(hashtext(name))`.
pub struct PostgresLockService {
    pool: PgPool,
    held: Mutex<HashMap<String, PoolConnection<Postgres>>>,
}

impl PostgresLockService {
    /// Create a lock service over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LockService for PostgresLockService {
    async fn try_lock(&self, name: &str) -> Result<bool, ControlError> {
        let mut held = self.held.lock().await;
        if held.contains_key(name) {
            return Ok(false);
        }
        let mut conn = self.pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            held.insert(name.to_owned(), conn);
        }
        Ok(locked)
    }

    async fn unlock(&self, name: &str) -> Result<(), ControlError> {
        let Some(mut conn) = self.held.lock().await.remove(name) else {
            warn!(lock = %name, "unlock ignored, not held");
            return Ok(());
        };
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        if !released {
            warn!(lock = %name, "advisory lock was not held by its connection");
        }
        Ok(())
    }
}
