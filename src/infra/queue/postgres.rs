//! Postgres-backed list store.
//!
//! Items live in one table keyed by `(queue, pos)`. Left pushes take ever
//! smaller negative positions, right pushes ever larger positive ones, so the
//! left end is the lowest `pos` and pops take the highest.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::core::{ControlError, QueueBackend};

/// Postgres list store sharing one table between all queues.
#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    /// Create a store over `pool`. Run [`PostgresQueue::migrations`] first.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema statements.
    #[must_use]
    pub const fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS pc_queue_items (
    queue TEXT NOT NULL,
    pos BIGINT NOT NULL,
    entity_id TEXT NOT NULL,
    PRIMARY KEY (queue, pos)
);
CREATE INDEX IF NOT EXISTS idx_pc_queue_items_entity ON pc_queue_items (queue, entity_id, pos);
CREATE SEQUENCE IF NOT EXISTS pc_queue_left_seq;
CREATE SEQUENCE IF NOT EXISTS pc_queue_right_seq;
",
        ]
    }

    /// Apply [`PostgresQueue::migrations`].
    ///
    /// # Errors
    ///
    /// Propagates database failures.
    pub async fn migrate(&self) -> Result<(), ControlError> {
        for statement in Self::migrations() {
            sqlx::raw_sql(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn push(&self, queue: &str, ids: &[String], left: bool) -> Result<(), ControlError> {
        let sql = if left {
            "INSERT INTO pc_queue_items (queue, pos, entity_id) VALUES ($1, -nextval('pc_queue_left_seq'), $2)"
        } else {
            "INSERT INTO pc_queue_items (queue, pos, entity_id) VALUES ($1, nextval('pc_queue_right_seq'), $2)"
        };
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(sql)
                .bind(queue)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!(queue = %queue, "failed to push {id}: {e}");
                    ControlError::from(e)
                })?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for PostgresQueue {
    async fn push_left(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        self.push(queue, ids, true).await
    }

    async fn push_right(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        self.push(queue, ids, false).await
    }

    async fn pop_right(&self, queue: &str) -> Result<Option<String>, ControlError> {
        let id: Option<String> = sqlx::query_scalar(
            r"
            DELETE FROM pc_queue_items
            WHERE (queue, pos) = (
                SELECT queue, pos FROM pc_queue_items
                WHERE queue = $1
                ORDER BY pos DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING entity_id
            ",
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn remove_one(&self, queue: &str, id: &str) -> Result<u64, ControlError> {
        let result = sqlx::query(
            r"
            DELETE FROM pc_queue_items
            WHERE (queue, pos) = (
                SELECT queue, pos FROM pc_queue_items
                WHERE queue = $1 AND entity_id = $2
                ORDER BY pos ASC
                LIMIT 1
                FOR UPDATE
            )
            ",
        )
        .bind(queue)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn size(&self, queue: &str) -> Result<u64, ControlError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pc_queue_items WHERE queue = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
