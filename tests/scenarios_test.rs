//! End-to-end lifecycle scenarios over the in-memory backends.
//!
//! Scans and drains are driven directly (`run_enqueue`, `do_dequeue`) and time
//! is moved with a manual clock, so every retry window is deterministic.

mod common;

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use chrono::Duration;
use common::{harness, ScriptedHandler, Session, Step};
use prometheus_polling_control::config::ControlConfig;
use prometheus_polling_control::core::{
    AuditAction, FieldValues, Outcome, PollingHandler, PollingRecord, PollingStatus,
};
use prometheus_polling_control::util::Clock;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_a_first_attempt_succeeds() {
    let h = harness(ControlConfig::default(), ScriptedHandler::new([Step::Succeed]));
    h.create("e1", 0).await;

    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.fresh, 1);
    assert_eq!(h.entity("e1").await.status, PollingStatus::Processing);
    assert_eq!(h.queued(), vec!["e1"]);

    let drained = h.control.do_dequeue().await.unwrap();
    assert_eq!(drained.succeeded, 1);

    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::Successful);
    assert_eq!(e1.attempts, 1);
    assert_eq!(e1.error_info, None);
    assert_eq!(e1.fields.get("receipt"), Some(&serde_json::json!("e1-1")));
    assert!(h.queued().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_b_retryable_errors_then_success() {
    let config = ControlConfig::default()
        .with_max_attempts(3)
        .with_interval_factor_secs(1);
    let handler = ScriptedHandler::new([Step::Temporary, Step::Temporary, Step::Succeed]);
    let calls = handler.calls.clone();
    let h = harness(config, handler);
    h.create("e1", 0).await;

    h.control.run_enqueue().await.unwrap();
    h.control.do_dequeue().await.unwrap();
    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::TemporaryError);
    assert_eq!(e1.attempts, 1);
    assert!(e1.error_info.as_deref().unwrap().contains("downstream reset"));

    // Backoff for attempt 1 has not elapsed yet.
    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.total(), 0);

    h.clock.advance(Duration::seconds(2));
    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.abnormal, 0);
    // Retries keep their status until a worker records the next outcome.
    assert_eq!(h.entity("e1").await.status, PollingStatus::TemporaryError);
    h.control.do_dequeue().await.unwrap();
    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::TemporaryError);
    assert_eq!(e1.attempts, 2);

    h.clock.advance(Duration::seconds(3));
    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.retried, 1);
    h.control.do_dequeue().await.unwrap();

    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::Successful);
    assert_eq!(e1.attempts, 3);
    assert_eq!(e1.error_info, None);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_c_permanent_error_fails_immediately() {
    let handler = ScriptedHandler::always(Step::Permanent);
    let calls = handler.calls.clone();
    let h = harness(ControlConfig::default().with_max_attempts(2), handler);
    h.create("e1", 0).await;

    h.control.run_enqueue().await.unwrap();
    h.control.do_dequeue().await.unwrap();

    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::Failed);
    assert_eq!(e1.attempts, 1);
    assert_eq!(e1.error_info.as_deref(), Some("payload rejected"));

    h.clock.advance(Duration::hours(1));
    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.total(), 0);
    h.control.do_dequeue().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.audit.count("e1", AuditAction::Failed), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_d_orphaned_processing_is_resubmitted() {
    let h = harness(ControlConfig::default(), ScriptedHandler::new([]));
    let orphan_modified = h.clock.now() - Duration::seconds(601);
    let orphan = PollingRecord::new("e1", serde_json::Value::Null, orphan_modified)
        .with_state(PollingStatus::Processing, 0);
    let fresh_processing = PollingRecord::new("e2", serde_json::Value::Null, h.clock.now())
        .with_state(PollingStatus::Processing, 0);
    h.store.insert_all([orphan, fresh_processing]).await;

    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.resubmitted, 1);
    assert_eq!(h.queued(), vec!["e1"]);

    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::Processing);
    assert_eq!(e1.modify_date, orphan_modified);
    assert_eq!(e1.attempts, 0);

    // Still overdue on the next scan: the queued id is cut, not duplicated.
    let report = h.control.run_enqueue().await.unwrap().unwrap();
    assert_eq!(report.resubmitted, 1);
    assert_eq!(report.cut, 1);
    assert_eq!(h.queued(), vec!["e1"]);
    assert_eq!(h.audit.count("e1", AuditAction::Cut), 1);
}

/// Holds every call at a barrier so both workers load the entity first.
struct Rendezvous {
    barrier: Barrier,
}

#[async_trait]
impl PollingHandler<PollingRecord, Session> for Rendezvous {
    async fn handle(&self, _entity: &PollingRecord) -> anyhow::Result<FieldValues> {
        self.barrier.wait().await;
        Ok(FieldValues::new())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_e_concurrent_workers_one_wins() {
    let h = harness(
        ControlConfig::default(),
        Rendezvous {
            barrier: Barrier::new(2),
        },
    );
    h.create("e1", 0).await;
    h.control.run_enqueue().await.unwrap();

    let (first, second) = tokio::join!(h.control.process("e1"), h.control.process("e1"));
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| format!("{o:?}"));
    assert_eq!(outcomes, vec![Outcome::LostRace, Outcome::Succeeded]);

    let e1 = h.entity("e1").await;
    assert_eq!(e1.status, PollingStatus::Successful);
    assert_eq!(e1.attempts, 1);

    let stats = h.control.stats();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.lost_races, 1);
    assert_eq!(h.audit.count("e1", AuditAction::LostRace), 1);
}
