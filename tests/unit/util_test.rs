//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};
use prometheus_polling_control::util::{init_tracing, Clock, ManualClock, SystemClock};

#[test]
fn test_manual_clock_only_moves_when_told() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now(), start + Duration::minutes(5));
    clock.set(start);
    assert_eq!(clock.now(), start);
}

#[test]
fn test_system_clock_is_close_to_now() {
    let delta = Utc::now() - SystemClock.now();
    assert!(delta.num_seconds().abs() < 5);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
