//! Control and backend configuration structures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Work queue backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-memory list store for development/testing.
    #[default]
    InMemory,
    /// JSONL file per queue under `dir`.
    File {
        /// Directory holding the queue files.
        dir: PathBuf,
    },
    /// Postgres-backed list table.
    Postgres {
        /// Connection string.
        url: String,
    },
}

/// Distributed lock backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockBackendConfig {
    /// Process-local lock registry.
    #[default]
    InMemory,
    /// Postgres session advisory locks.
    Postgres {
        /// Connection string.
        url: String,
    },
}

/// Per-control tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Concurrent drain tasks.
    pub threads: usize,
    /// Attempts before an entity is failed for good.
    pub max_attempts: u32,
    /// Retry `a` becomes due `interval_factor_secs * a` seconds after the last attempt.
    pub interval_factor_secs: u64,
    /// `PROCESSING` entities untouched this long are presumed orphaned.
    pub resubmit_interval_secs: u64,
    /// Batch size of the fresh-work and crash-recovery passes.
    pub batch_size: usize,
    /// Batch size of the retry passes.
    pub retry_batch_size: usize,
    /// Period of the enqueue tick (fixed rate).
    pub enqueue_rate_ms: u64,
    /// Pause between dequeue ticks (fixed delay).
    pub dequeue_delay_ms: u64,
    /// Queue name; defaults to the entity name.
    pub queue_name: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            threads: 5,
            max_attempts: 3,
            interval_factor_secs: 60,
            resubmit_interval_secs: 600,
            batch_size: 50,
            retry_batch_size: 10,
            enqueue_rate_ms: 10_000,
            dequeue_delay_ms: 10_000,
            queue_name: None,
        }
    }
}

impl ControlConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("threads must be greater than 0".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.retry_batch_size == 0 {
            return Err("retry_batch_size must be greater than 0".into());
        }
        if self.enqueue_rate_ms == 0 {
            return Err("enqueue_rate_ms must be greater than 0".into());
        }
        if self.dequeue_delay_ms == 0 {
            return Err("dequeue_delay_ms must be greater than 0".into());
        }
        if matches!(&self.queue_name, Some(name) if name.trim().is_empty()) {
            return Err("queue_name must not be blank".into());
        }
        Ok(())
    }

    /// Parse from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `<PREFIX>_*` environment variables (a `.env` file is honoured).
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        cfg.apply_env(prefix)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override fields from `<PREFIX>_*` environment variables that are set.
    pub fn apply_env(&mut self, prefix: &str) -> Result<(), String> {
        if let Some(v) = env_var(prefix, "THREADS")? {
            self.threads = v;
        }
        if let Some(v) = env_var(prefix, "MAX_ATTEMPTS")? {
            self.max_attempts = v;
        }
        if let Some(v) = env_var(prefix, "INTERVAL_FACTOR_SECS")? {
            self.interval_factor_secs = v;
        }
        if let Some(v) = env_var(prefix, "RESUBMIT_INTERVAL_SECS")? {
            self.resubmit_interval_secs = v;
        }
        if let Some(v) = env_var(prefix, "BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = env_var(prefix, "RETRY_BATCH_SIZE")? {
            self.retry_batch_size = v;
        }
        if let Some(v) = env_var(prefix, "ENQUEUE_RATE_MS")? {
            self.enqueue_rate_ms = v;
        }
        if let Some(v) = env_var(prefix, "DEQUEUE_DELAY_MS")? {
            self.dequeue_delay_ms = v;
        }
        if let Some(v) = env_var::<String>(prefix, "QUEUE_NAME")? {
            self.queue_name = Some(v);
        }
        Ok(())
    }

    /// Set `threads`.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set `max_attempts`.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set `interval_factor_secs`.
    #[must_use]
    pub const fn with_interval_factor_secs(mut self, secs: u64) -> Self {
        self.interval_factor_secs = secs;
        self
    }

    /// Set `resubmit_interval_secs`.
    #[must_use]
    pub const fn with_resubmit_interval_secs(mut self, secs: u64) -> Self {
        self.resubmit_interval_secs = secs;
        self
    }

    /// Set `batch_size`.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set `retry_batch_size`.
    #[must_use]
    pub const fn with_retry_batch_size(mut self, batch_size: usize) -> Self {
        self.retry_batch_size = batch_size;
        self
    }

    /// Set both tick periods in milliseconds.
    #[must_use]
    pub const fn with_ticks_ms(mut self, enqueue_rate_ms: u64, dequeue_delay_ms: u64) -> Self {
        self.enqueue_rate_ms = enqueue_rate_ms;
        self.dequeue_delay_ms = dequeue_delay_ms;
        self
    }

    /// Set the queue name.
    #[must_use]
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = Some(name.into());
        self
    }

    /// Backoff before retry number `attempt`.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> chrono::Duration {
        seconds(secs_i64(self.interval_factor_secs).saturating_mul(i64::from(attempt)))
    }

    /// Age after which a `PROCESSING` entity is resubmitted.
    #[must_use]
    pub fn resubmit_interval(&self) -> chrono::Duration {
        seconds(secs_i64(self.resubmit_interval_secs))
    }

    /// Enqueue tick period.
    #[must_use]
    pub const fn enqueue_rate(&self) -> Duration {
        Duration::from_millis(self.enqueue_rate_ms)
    }

    /// Dequeue tick pause.
    #[must_use]
    pub const fn dequeue_delay(&self) -> Duration {
        Duration::from_millis(self.dequeue_delay_ms)
    }
}

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn seconds(secs: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

fn env_var<T: FromStr>(prefix: &str, key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    let name = format!("{prefix}_{key}");
    match std::env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{name}: {e}")),
        Err(_) => Ok(None),
    }
}

/// Root configuration: shared backends and per-control overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Work queue backend.
    pub queue: QueueBackendConfig,
    /// Lock backend.
    pub lock: LockBackendConfig,
    /// Settings for controls without an entry in `controls`.
    pub defaults: ControlConfig,
    /// Map of control name to configuration.
    pub controls: HashMap<String, ControlConfig>,
}

impl PollingConfig {
    /// Validate defaults and every control.
    pub fn validate(&self) -> Result<(), String> {
        self.defaults
            .validate()
            .map_err(|e| format!("defaults invalid: {e}"))?;
        for (name, control) in &self.controls {
            control
                .validate()
                .map_err(|e| format!("control `{name}` invalid: {e}"))?;
        }
        match &self.queue {
            QueueBackendConfig::Postgres { url } if url.trim().is_empty() => {
                return Err("queue url must not be empty".into());
            }
            QueueBackendConfig::File { dir } if dir.as_os_str().is_empty() => {
                return Err("queue dir must not be empty".into());
            }
            _ => {}
        }
        if let LockBackendConfig::Postgres { url } = &self.lock {
            if url.trim().is_empty() {
                return Err("lock url must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Configuration for control `name`.
    #[must_use]
    pub fn control(&self, name: &str) -> ControlConfig {
        self.controls
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }
}
