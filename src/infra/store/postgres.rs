//! Postgres entity store.
//!
//! Works on any table carrying the polling columns (`id`, `status`,
//! `attempts`, `create_date`, `modify_date`, `error_info`); the entity type maps
//! rows through [`sqlx::FromRow`]. Scans page by `(create_date, id)` and lock
//! their page with `FOR UPDATE SKIP LOCKED` when a mutator is given.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, error};

use crate::core::update::validate_identifier;
use crate::core::{
    BatchCallback, BatchMutator, ConditionalUpdate, ControlError, Criteria, EntityStore,
    PollingEntity, SqlParam, UpdateHook,
};

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Text(text) => query.bind(text.as_str()),
        SqlParam::Int(n) => query.bind(*n),
        SqlParam::Timestamp(at) => query.bind(*at),
        // Only `error_info` is bound as NULL; null fields are inlined by `to_sql`.
        SqlParam::Null | SqlParam::Value(serde_json::Value::Null) => query.bind(None::<String>),
        SqlParam::Value(serde_json::Value::Bool(b)) => query.bind(*b),
        SqlParam::Value(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        SqlParam::Value(serde_json::Value::String(s)) => query.bind(s.as_str()),
        SqlParam::Value(other) => query.bind(sqlx::types::Json(other)),
    }
}

/// Entity store over one Postgres table.
pub struct PostgresEntityStore<E> {
    pool: PgPool,
    table: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PostgresEntityStore<E> {
    /// Create a store for `table` (optionally schema-qualified).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidField`] when `table` is not an identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, ControlError> {
        let table = table.into();
        validate_identifier(&table, true)?;
        Ok(Self {
            pool,
            table,
            _entity: PhantomData,
        })
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl<E: PollingEntity> PostgresEntityStore<E> {
    /// Write the polling columns of a mutated entity, guarded by its status before mutation.
    async fn write_back(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        before: &E,
        after: &E,
    ) -> Result<u64, ControlError> {
        let sql = format!(
            "UPDATE {} SET status = $3, modify_date = $4, attempts = $5, error_info = $6 \
             WHERE id = $1 AND status = $2",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(before.id())
            .bind(before.status().as_str())
            .bind(after.status().as_str())
            .bind(after.modify_date())
            .bind(i64::from(after.attempts()))
            .bind(after.error_info())
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl<E> EntityStore<E> for PostgresEntityStore<E>
where
    E: PollingEntity + for<'r> FromRow<'r, PgRow> + Unpin,
{
    type Session = Transaction<'static, Postgres>;

    async fn get(&self, id: &str) -> Result<Option<E>, ControlError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table);
        let entity = sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entity)
    }

    async fn iterate(
        &self,
        criteria: &Criteria,
        batch_size: usize,
        mutator: Option<&BatchMutator<E>>,
        callback: &mut (dyn BatchCallback<E> + '_),
    ) -> Result<usize, ControlError> {
        if batch_size == 0 {
            return Err(ControlError::Config("batch_size must be greater than 0".into()));
        }
        let mut after: Option<(DateTime<Utc>, String)> = None;
        let mut total = 0;
        loop {
            let statement = criteria.to_page_sql(
                &self.table,
                after.as_ref().map(|(date, id)| (*date, id.as_str())),
                batch_size,
                mutator.is_some(),
            )?;
            let mut tx = self.pool.begin().await?;
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = bind_param(query, param);
            }
            let rows = query.fetch_all(&mut *tx).await?;
            let fetched = rows.len();
            let mut batch = Vec::with_capacity(fetched);
            for row in &rows {
                batch.push(E::from_row(row)?);
            }
            if let Some(last) = batch.last() {
                after = Some((last.create_date(), last.id().to_owned()));
            }
            if let Some(mutate) = mutator {
                let mut kept = Vec::with_capacity(batch.len());
                for before in batch {
                    let mut entity = before.clone();
                    mutate(&mut entity);
                    if self.write_back(&mut tx, &before, &entity).await? == 1 {
                        kept.push(entity);
                    } else {
                        debug!(table = %self.table, id = %before.id(), "row moved during scan, skipped");
                    }
                }
                batch = kept;
            }
            tx.commit().await?;

            total += batch.len();
            if !batch.is_empty() {
                callback.on_batch(&batch).await?;
            }
            if fetched < batch_size {
                break;
            }
        }
        Ok(total)
    }

    async fn execute_update(
        &self,
        update: &ConditionalUpdate,
        hook: Option<&(dyn UpdateHook<Self::Session> + '_)>,
    ) -> Result<u64, ControlError> {
        let statement = update.to_sql(&self.table)?;
        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_param(query, param);
        }
        let rows = query.execute(&mut *tx).await?.rows_affected();
        if rows == 1 {
            if let Some(hook) = hook {
                if let Err(err) = hook.run(&mut tx).await {
                    if let Err(rollback) = tx.rollback().await {
                        error!(table = %self.table, id = %update.id(), "rollback failed: {rollback}");
                    }
                    return Err(ControlError::Hook(err));
                }
            }
        }
        tx.commit().await?;
        Ok(rows)
    }
}
