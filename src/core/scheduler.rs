//! Scheduler scan: the four ordered enqueue passes.
//!
//! 1. fresh `INITIALIZED` work is flipped to `PROCESSING` and pushed as is;
//! 2. `TEMPORARY_ERROR` entities whose per-attempt backoff elapsed are pushed deduplicated;
//! 3. `TEMPORARY_ERROR` entities past the longest backoff are pushed deduplicated;
//! 4. `PROCESSING` entities older than the resubmit interval are pushed deduplicated.
//!
//! Only pass 1 changes the store; retried entities keep `TEMPORARY_ERROR` until a
//! worker records the next outcome.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::core::audit::AuditAction;
use crate::core::control::PollingControl;
use crate::core::criteria::{AttemptsFilter, Criteria};
use crate::core::entity::{PollingEntity, PollingStatus};
use crate::core::handler::PollingHandler;
use crate::core::stats::ControlCounters;
use crate::core::store::{BatchCallback, BatchMutator, EntityStore};
use crate::core::ControlError;

/// Ids pushed by one scan, per pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Fresh entities flipped to `PROCESSING`.
    pub fresh: usize,
    /// Retries whose backoff elapsed.
    pub retried: usize,
    /// Retries caught by the safety-net pass.
    pub abnormal: usize,
    /// Orphaned `PROCESSING` entities.
    pub resubmitted: usize,
    /// Ids that were already queued and moved to the pop end.
    pub cut: usize,
}

impl EnqueueReport {
    /// Total ids pushed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.fresh + self.retried + self.abnormal + self.resubmitted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Fresh,
    Retry,
    Abnormal,
    Resubmit,
}

impl Pass {
    const fn deduplication(self) -> bool {
        !matches!(self, Self::Fresh)
    }

    const fn action(self) -> AuditAction {
        match self {
            Self::Fresh => AuditAction::Enqueued,
            Self::Retry | Self::Abnormal => AuditAction::Retried,
            Self::Resubmit => AuditAction::Resubmitted,
        }
    }
}

/// Pushes each committed batch, preserving store order.
struct PushBatch<'a, E, S, H> {
    control: &'a PollingControl<E, S, H>,
    pass: Pass,
    cut: usize,
}

#[async_trait]
impl<E, S, H> BatchCallback<E> for PushBatch<'_, E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    async fn on_batch(&mut self, batch: &[E]) -> Result<(), ControlError> {
        let control = self.control;
        let ids: Vec<String> = batch.iter().map(|e| e.id().to_owned()).collect();
        for entity in batch {
            match self.pass {
                Pass::Fresh => info!(control = %control.name(), id = %entity.id(), "enqueue {}", entity.id()),
                Pass::Retry | Pass::Abnormal => info!(
                    control = %control.name(),
                    id = %entity.id(),
                    attempts = entity.attempts(),
                    "enqueue {} retried",
                    entity.id()
                ),
                Pass::Resubmit => info!(
                    control = %control.name(),
                    id = %entity.id(),
                    "enqueue {} resubmitted",
                    entity.id()
                ),
            }
        }

        let outcome = control
            .inner
            .queue
            .push(&ids, self.pass.deduplication())
            .await?;

        let counters = &control.inner.counters;
        let counter = match self.pass {
            Pass::Fresh => &counters.enqueued,
            Pass::Retry | Pass::Abnormal => &counters.retried,
            Pass::Resubmit => &counters.resubmitted,
        };
        ControlCounters::add(counter, ids.len());
        ControlCounters::add(&counters.cut, outcome.cut.len());
        self.cut += outcome.cut.len();

        for id in &ids {
            control.audit(id, self.pass.action(), None);
        }
        for id in &outcome.cut {
            control.audit(id, AuditAction::Cut, None);
        }
        Ok(())
    }
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl<E, S, H> PollingControl<E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    /// Run the four passes once, without taking the enqueue lock.
    ///
    /// Callers normally go through [`PollingControl::run_enqueue`].
    ///
    /// # Errors
    ///
    /// Stops at the first store or queue failure; ids pushed so far stay queued.
    pub async fn do_enqueue(&self) -> Result<EnqueueReport, ControlError> {
        let config = &self.inner.config;
        let mut report = EnqueueReport::default();

        let now = self.inner.clock.now();
        let mark_processing = move |entity: &mut E| {
            entity.set_status(PollingStatus::Processing);
            entity.set_modify_date(now);
        };
        let mutator: &BatchMutator<E> = &mark_processing;
        let fresh = Criteria::status(PollingStatus::Initialized);
        let (count, cut) = self
            .run_pass(Pass::Fresh, &fresh, config.batch_size, Some(mutator))
            .await?;
        report.fresh = count;
        report.cut += cut;

        for attempt in 1..config.max_attempts {
            let criteria = Criteria::status(PollingStatus::TemporaryError)
                .attempts(AttemptsFilter::Exactly(attempt))
                .modified_before(cutoff(self.inner.clock.now(), config.retry_delay(attempt)));
            let (count, cut) = self
                .run_pass(Pass::Retry, &criteria, config.retry_batch_size, None)
                .await?;
            report.retried += count;
            report.cut += cut;
        }

        let abnormal = Criteria::status(PollingStatus::TemporaryError)
            .attempts(AttemptsFilter::AtMost(config.max_attempts))
            .modified_before(cutoff(
                self.inner.clock.now(),
                config.retry_delay(config.max_attempts),
            ));
        let (count, cut) = self
            .run_pass(Pass::Abnormal, &abnormal, config.retry_batch_size, None)
            .await?;
        report.abnormal = count;
        report.cut += cut;

        let orphaned = Criteria::status(PollingStatus::Processing)
            .modified_before(cutoff(self.inner.clock.now(), config.resubmit_interval()));
        let (count, cut) = self
            .run_pass(Pass::Resubmit, &orphaned, config.batch_size, None)
            .await?;
        report.resubmitted = count;
        report.cut += cut;

        debug!(control = %self.name(), ?report, "enqueue finished");
        Ok(report)
    }

    async fn run_pass(
        &self,
        pass: Pass,
        criteria: &Criteria,
        batch_size: usize,
        mutator: Option<&BatchMutator<E>>,
    ) -> Result<(usize, usize), ControlError> {
        let mut callback = PushBatch {
            control: self,
            pass,
            cut: 0,
        };
        let count = self
            .inner
            .store
            .iterate(criteria, batch_size, mutator, &mut callback)
            .await?;
        Ok((count, callback.cut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_saturates() {
        let now = Utc::now();
        assert_eq!(cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoff(now, Duration::seconds(60)), now - Duration::seconds(60));
    }

    #[test]
    fn test_only_fresh_pass_appends_without_dedup() {
        assert!(!Pass::Fresh.deduplication());
        assert!(Pass::Retry.deduplication());
        assert!(Pass::Abnormal.deduplication());
        assert!(Pass::Resubmit.deduplication());
        assert_eq!(Pass::Abnormal.action(), AuditAction::Retried);
    }

    #[test]
    fn test_report_total() {
        let report = EnqueueReport {
            fresh: 2,
            retried: 1,
            abnormal: 1,
            resubmitted: 3,
            cut: 2,
        };
        assert_eq!(report.total(), 7);
    }
}
