//! Conditional (compare-and-swap) status updates.
//!
//! Every status change goes through a [`ConditionalUpdate`]: a single-row update
//! whose predicate always includes `(id, expected_status)`. A row that already
//! moved away from the expected status is left untouched and the update reports
//! zero affected rows.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::core::entity::{FieldValues, PollingEntity, PollingStatus};
use crate::core::ControlError;

/// Maximum stored length of `error_info`, in characters.
pub const MAX_ERROR_INFO_CHARS: usize = 4000;

/// Columns owned by the controller; handlers may not write them.
pub const RESERVED_COLUMNS: [&str; 6] = [
    "id",
    "status",
    "attempts",
    "create_date",
    "modify_date",
    "error_info",
];

/// Truncate failure detail to [`MAX_ERROR_INFO_CHARS`] characters.
#[must_use]
pub fn truncate_error_info(info: &str) -> String {
    match info.char_indices().nth(MAX_ERROR_INFO_CHARS) {
        Some((cut, _)) => info[..cut].to_string(),
        None => info.to_string(),
    }
}

/// Check that `name` is a plain SQL identifier, optionally schema-qualified.
///
/// # Errors
///
/// Returns [`ControlError::InvalidField`] otherwise.
pub fn validate_identifier(name: &str, allow_qualified: bool) -> Result<(), ControlError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let ok = if allow_qualified {
        let parts: Vec<&str> = name.split('.').collect();
        parts.len() <= 2 && parts.iter().all(|p| valid_part(p))
    } else {
        valid_part(name)
    };
    if ok {
        Ok(())
    } else {
        Err(ControlError::InvalidField(name.to_string()))
    }
}

/// A bound parameter of a rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text value (ids, statuses).
    Text(String),
    /// Integer value.
    Int(i64),
    /// Timestamp value.
    Timestamp(DateTime<Utc>),
    /// SQL NULL.
    Null,
    /// Handler-provided value, bound according to its JSON type.
    Value(serde_json::Value),
}

/// Parameterized SQL with `$n` placeholders and their values in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text.
    pub sql: String,
    /// Parameters for `$1..$n`.
    pub params: Vec<SqlParam>,
}

/// A status transition guarded by the expected current status.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalUpdate {
    id: String,
    expected: PollingStatus,
    status: PollingStatus,
    modify_date: DateTime<Utc>,
    error_info: Option<String>,
    count_attempt: bool,
    fields: FieldValues,
}

impl ConditionalUpdate {
    /// Move `id` from `expected` to `status`, stamping `modify_date`.
    ///
    /// Counts one attempt and clears `error_info` unless told otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidTransition`] when the state machine forbids the move.
    pub fn transition(
        id: impl Into<String>,
        expected: PollingStatus,
        status: PollingStatus,
        modify_date: DateTime<Utc>,
    ) -> Result<Self, ControlError> {
        if !expected.can_transition_to(status) {
            return Err(ControlError::InvalidTransition {
                from: expected,
                to: status,
            });
        }
        Ok(Self {
            id: id.into(),
            expected,
            status,
            modify_date,
            error_info: None,
            count_attempt: true,
            fields: FieldValues::new(),
        })
    }

    /// Record failure detail, truncated to [`MAX_ERROR_INFO_CHARS`].
    #[must_use]
    pub fn with_error_info(mut self, info: &str) -> Self {
        self.error_info = Some(truncate_error_info(info));
        self
    }

    /// Leave `attempts` unchanged.
    #[must_use]
    pub const fn without_attempt(mut self) -> Self {
        self.count_attempt = false;
        self
    }

    /// Persist handler fields alongside the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidField`] for reserved or non-identifier names.
    pub fn with_fields(mut self, fields: FieldValues) -> Result<Self, ControlError> {
        for name in fields.keys() {
            validate_identifier(name, false)?;
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(ControlError::InvalidField(name.clone()));
            }
        }
        self.fields = fields;
        Ok(self)
    }

    /// Target row id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Status the row must hold for the update to apply.
    #[must_use]
    pub const fn expected(&self) -> PollingStatus {
        self.expected
    }

    /// Status written on success.
    #[must_use]
    pub const fn status(&self) -> PollingStatus {
        self.status
    }

    /// Failure detail written by this update.
    #[must_use]
    pub fn error_info(&self) -> Option<&str> {
        self.error_info.as_deref()
    }

    /// Whether `attempts` is incremented.
    #[must_use]
    pub const fn counts_attempt(&self) -> bool {
        self.count_attempt
    }

    /// Handler fields written by this update.
    #[must_use]
    pub const fn fields(&self) -> &FieldValues {
        &self.fields
    }

    /// Whether the update would apply to `entity` as it stands.
    pub fn matches<E: PollingEntity>(&self, entity: &E) -> bool {
        entity.id() == self.id && entity.status() == self.expected
    }

    /// Apply to an in-memory entity. Returns `false` (and changes nothing) on a lost race.
    ///
    /// # Errors
    ///
    /// Propagates [`PollingEntity::set_field`] failures; the entity is left unchanged.
    pub fn apply_to<E: PollingEntity>(&self, entity: &mut E) -> Result<bool, ControlError> {
        if !self.matches(entity) {
            return Ok(false);
        }
        let mut updated = entity.clone();
        updated.set_status(self.status);
        updated.set_modify_date(self.modify_date);
        updated.set_error_info(self.error_info.clone());
        if self.count_attempt {
            updated.set_attempts(updated.attempts() + 1);
        }
        for (name, value) in &self.fields {
            updated.set_field(name, value)?;
        }
        *entity = updated;
        Ok(true)
    }

    /// Render as a parameterized statement against `table`.
    ///
    /// Parameter order: `$1` id, `$2` expected status, `$3` new status,
    /// `$4` modify date, `$5` error info, then handler fields.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidField`] when `table` is not an identifier.
    pub fn to_sql(&self, table: &str) -> Result<SqlStatement, ControlError> {
        validate_identifier(table, true)?;
        let mut sql = format!(
            "UPDATE {table} SET status = $3, modify_date = $4, error_info = $5"
        );
        if self.count_attempt {
            sql.push_str(", attempts = attempts + 1");
        }
        let mut params = vec![
            SqlParam::Text(self.id.clone()),
            SqlParam::Text(self.expected.as_str().to_string()),
            SqlParam::Text(self.status.as_str().to_string()),
            SqlParam::Timestamp(self.modify_date),
            self.error_info
                .as_ref()
                .map_or(SqlParam::Null, |info| SqlParam::Text(info.clone())),
        ];
        for (name, value) in &self.fields {
            // A bound NULL carries a type; the literal lets Postgres infer the column's.
            if value.is_null() {
                let _ = write!(sql, ", {name} = NULL");
                continue;
            }
            params.push(SqlParam::Value(value.clone()));
            let _ = write!(sql, ", {name} = ${}", params.len());
        }
        sql.push_str(" WHERE id = $1 AND status = $2");
        Ok(SqlStatement { sql, params })
    }
}
