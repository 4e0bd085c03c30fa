//! Drain loop and per-item processing.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::core::audit::AuditAction;
use crate::core::control::PollingControl;
use crate::core::entity::{PollingEntity, PollingStatus};
use crate::core::handler::PollingHandler;
use crate::core::stats::ControlCounters;
use crate::core::store::{EntityStore, UpdateHook};
use crate::core::update::ConditionalUpdate;
use crate::core::ControlError;

/// Error info stored when an entity is failed by the attempts guard.
pub const MAX_ATTEMPTS_REACHED: &str = "max attempts reached";

/// What happened to one popped id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No entity with that id; the id is dropped.
    NotFound,
    /// Entity already `SUCCESSFUL` or `FAILED`; the id is dropped.
    Stale,
    /// Entity had no attempts left and was failed without running the handler.
    MaxAttemptsReached,
    /// Handler succeeded and `SUCCESSFUL` was stored.
    Succeeded,
    /// Handler failed with a retryable error; `TEMPORARY_ERROR` was stored.
    TemporaryError,
    /// Handler failed for good; `FAILED` was stored.
    Failed,
    /// The outcome update found the entity already moved on and changed nothing.
    LostRace,
}

/// Tally of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Ids popped.
    pub popped: usize,
    /// Stored `SUCCESSFUL`.
    pub succeeded: usize,
    /// Stored `TEMPORARY_ERROR`.
    pub temporary_errors: usize,
    /// Stored `FAILED`, including the attempts guard.
    pub failed: usize,
    /// Updates that lost their race.
    pub lost_races: usize,
    /// Ids dropped as missing or stale.
    pub discarded: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: Outcome) {
        self.popped += 1;
        match outcome {
            Outcome::NotFound | Outcome::Stale => self.discarded += 1,
            Outcome::MaxAttemptsReached | Outcome::Failed => self.failed += 1,
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::TemporaryError => self.temporary_errors += 1,
            Outcome::LostRace => self.lost_races += 1,
        }
    }
}

/// Runs the handler's `after_updated` inside the success transaction.
struct AfterUpdated<'a, E, H> {
    handler: &'a H,
    entity: &'a E,
}

#[async_trait]
impl<E, H, X> UpdateHook<X> for AfterUpdated<'_, E, H>
where
    E: PollingEntity,
    H: PollingHandler<E, X>,
    X: Send,
{
    async fn run(&self, session: &mut X) -> anyhow::Result<()> {
        self.handler.after_updated(session, self.entity).await
    }
}

impl<E, S, H> PollingControl<E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    /// Pop and process ids until the queue is empty or the control shuts down.
    ///
    /// # Errors
    ///
    /// Queue and store failures end the cycle. The id in hand stays `PROCESSING`
    /// or `TEMPORARY_ERROR` in the store and is found again by a later scan.
    pub async fn do_dequeue(&self) -> Result<DrainReport, ControlError> {
        let mut report = DrainReport::default();
        while !self.is_shutdown() {
            let Some(id) = self.inner.queue.pop().await? else {
                break;
            };
            let outcome = self.process(&id).await?;
            report.record(outcome);
        }
        Ok(report)
    }

    /// Process one id as if it had just been popped.
    ///
    /// # Errors
    ///
    /// Store failures other than those of the success update, which are treated
    /// like handler failures.
    pub async fn process(&self, id: &str) -> Result<Outcome, ControlError> {
        let inner = &self.inner;
        let counters = &inner.counters;

        let Some(entity) = inner.store.get(id).await? else {
            warn!(control = %self.name(), id = %id, "not found: {id}");
            ControlCounters::incr(&counters.discarded);
            self.audit(id, AuditAction::NotFound, None);
            return Ok(Outcome::NotFound);
        };
        ControlCounters::incr(&counters.dequeued);
        info!(
            control = %self.name(),
            id = %id,
            status = %entity.status(),
            attempts = entity.attempts(),
            "dequeue {id}"
        );
        self.audit(id, AuditAction::Dequeued, None);

        if entity.status().is_terminal() {
            warn!(control = %self.name(), id = %id, status = %entity.status(), "status is {}: {id}", entity.status());
            ControlCounters::incr(&counters.discarded);
            self.audit(id, AuditAction::Stale, Some(entity.status().to_string()));
            return Ok(Outcome::Stale);
        }

        if entity.attempts() >= inner.config.max_attempts {
            error!(control = %self.name(), id = %id, attempts = entity.attempts(), "max attempts reached: {id}");
            let update = ConditionalUpdate::transition(
                id,
                entity.status(),
                PollingStatus::Failed,
                inner.clock.now(),
            )?
            .with_error_info(MAX_ATTEMPTS_REACHED)
            .without_attempt();
            let rows = inner.store.execute_update(&update, None).await?;
            if rows == 0 {
                return Ok(self.lost_race(&entity, PollingStatus::Failed));
            }
            ControlCounters::incr(&counters.failed);
            self.audit(id, AuditAction::MaxAttemptsReached, None);
            return Ok(Outcome::MaxAttemptsReached);
        }

        match self.try_succeed(&entity).await {
            Ok(0) => Ok(self.lost_race(&entity, PollingStatus::Successful)),
            Ok(_) => {
                info!(control = %self.name(), id = %id, "process {id} successful");
                ControlCounters::incr(&counters.succeeded);
                self.audit(id, AuditAction::Succeeded, None);
                Ok(Outcome::Succeeded)
            }
            Err(err) => self.record_failure(&entity, &err).await,
        }
    }

    /// Run the handler and store `SUCCESSFUL`. Any failure on the way is returned
    /// for classification; a failed transaction leaves the row unchanged.
    async fn try_succeed(&self, entity: &E) -> anyhow::Result<u64> {
        let inner = &self.inner;
        let fields = inner.handler.handle(entity).await?;
        let update = ConditionalUpdate::transition(
            entity.id(),
            entity.status(),
            PollingStatus::Successful,
            inner.clock.now(),
        )?
        .with_fields(fields)?;
        let hook: &(dyn UpdateHook<S::Session> + '_) = &AfterUpdated {
            handler: inner.handler.as_ref(),
            entity,
        };
        match inner.store.execute_update(&update, Some(hook)).await {
            Ok(rows) => Ok(rows),
            Err(ControlError::Hook(err)) => Err(err),
            Err(err) => Err(err.into()),
        }
    }

    async fn record_failure(
        &self,
        entity: &E,
        err: &anyhow::Error,
    ) -> Result<Outcome, ControlError> {
        let inner = &self.inner;
        let id = entity.id();
        let error_info = format!("{err:#}");
        error!(control = %self.name(), id = %id, attempts = entity.attempts(), error = %error_info, "process {id} raised error");

        let retryable = inner.handler.is_temporary_error(err);
        let next = if !retryable || entity.attempts().saturating_add(1) >= inner.config.max_attempts {
            PollingStatus::Failed
        } else {
            PollingStatus::TemporaryError
        };
        let update = ConditionalUpdate::transition(id, entity.status(), next, inner.clock.now())?
            .with_error_info(&error_info);
        let rows = inner.store.execute_update(&update, None).await?;
        if rows == 0 {
            return Ok(self.lost_race(entity, next));
        }

        info!(control = %self.name(), id = %id, status = %next, "process {id} failed");
        let counters = &inner.counters;
        let detail = Some(update.error_info().unwrap_or_default().to_owned());
        if next == PollingStatus::Failed {
            ControlCounters::incr(&counters.failed);
            self.audit(id, AuditAction::Failed, detail);
            Ok(Outcome::Failed)
        } else {
            ControlCounters::incr(&counters.temporary_errors);
            self.audit(id, AuditAction::TemporaryError, detail);
            Ok(Outcome::TemporaryError)
        }
    }

    fn lost_race(&self, entity: &E, intended: PollingStatus) -> Outcome {
        warn!(
            control = %self.name(),
            id = %entity.id(),
            expected = %entity.status(),
            intended = %intended,
            "process {} {} but ignored",
            entity.id(),
            intended
        );
        ControlCounters::incr(&self.inner.counters.lost_races);
        self.audit(entity.id(), AuditAction::LostRace, Some(intended.to_string()));
        Outcome::LostRace
    }
}
