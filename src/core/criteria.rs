//! Scan criteria for scheduler passes.

use chrono::{DateTime, Utc};

use crate::core::entity::{PollingEntity, PollingStatus};
use crate::core::update::{validate_identifier, SqlParam, SqlStatement};
use crate::core::ControlError;

/// Filter on the attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptsFilter {
    /// `attempts == n`
    Exactly(u32),
    /// `attempts <= n`
    AtMost(u32),
}

impl AttemptsFilter {
    const fn accepts(self, attempts: u32) -> bool {
        match self {
            Self::Exactly(n) => attempts == n,
            Self::AtMost(n) => attempts <= n,
        }
    }
}

/// Selection of entities for one scheduler pass, ordered by `create_date` ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    /// Required status.
    pub status: PollingStatus,
    /// Optional attempt filter.
    pub attempts: Option<AttemptsFilter>,
    /// Only entities modified strictly before this instant.
    pub modified_before: Option<DateTime<Utc>>,
}

impl Criteria {
    /// All entities in `status`.
    #[must_use]
    pub const fn status(status: PollingStatus) -> Self {
        Self {
            status,
            attempts: None,
            modified_before: None,
        }
    }

    /// Restrict by attempt count.
    #[must_use]
    pub const fn attempts(mut self, filter: AttemptsFilter) -> Self {
        self.attempts = Some(filter);
        self
    }

    /// Restrict to entities last modified before `at`.
    #[must_use]
    pub const fn modified_before(mut self, at: DateTime<Utc>) -> Self {
        self.modified_before = Some(at);
        self
    }

    /// In-memory evaluation.
    pub fn matches<E: PollingEntity>(&self, entity: &E) -> bool {
        entity.status() == self.status
            && self.attempts.is_none_or(|f| f.accepts(entity.attempts()))
            && self
                .modified_before
                .is_none_or(|at| entity.modify_date() < at)
    }

    /// Render one keyset page: rows after `(create_date, id)` of `after`, at most `limit`.
    ///
    /// `lock_rows` appends `FOR UPDATE SKIP LOCKED` for passes that mutate the page.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidField`] when `table` is not an identifier.
    pub fn to_page_sql(
        &self,
        table: &str,
        after: Option<(DateTime<Utc>, &str)>,
        limit: usize,
        lock_rows: bool,
    ) -> Result<SqlStatement, ControlError> {
        validate_identifier(table, true)?;
        let mut params = vec![SqlParam::Text(self.status.as_str().to_string())];
        let mut sql = format!("SELECT * FROM {table} WHERE status = $1");
        match self.attempts {
            Some(AttemptsFilter::Exactly(n)) => {
                params.push(SqlParam::Int(i64::from(n)));
                sql.push_str(&format!(" AND attempts = ${}", params.len()));
            }
            Some(AttemptsFilter::AtMost(n)) => {
                params.push(SqlParam::Int(i64::from(n)));
                sql.push_str(&format!(" AND attempts <= ${}", params.len()));
            }
            None => {}
        }
        if let Some(at) = self.modified_before {
            params.push(SqlParam::Timestamp(at));
            sql.push_str(&format!(" AND modify_date < ${}", params.len()));
        }
        if let Some((create_date, id)) = after {
            params.push(SqlParam::Timestamp(create_date));
            params.push(SqlParam::Text(id.to_string()));
            sql.push_str(&format!(
                " AND (create_date, id) > (${}, ${})",
                params.len() - 1,
                params.len()
            ));
        }
        params.push(SqlParam::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(
            " ORDER BY create_date ASC, id ASC LIMIT ${}",
            params.len()
        ));
        if lock_rows {
            sql.push_str(" FOR UPDATE SKIP LOCKED");
        }
        Ok(SqlStatement { sql, params })
    }
}
