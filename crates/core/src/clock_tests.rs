// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let before = clock.now();
    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.now() - before, TimeDelta::seconds(90));
}

#[test]
fn fake_clock_set_overrides() {
    let clock = FakeClock::new();
    let at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
    clock.set(at);
    assert_eq!(clock.now(), at);
    assert_eq!(clock.epoch_ms(), at.timestamp_millis() as u64);
}

#[test]
fn clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now(), other.now());
}

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
