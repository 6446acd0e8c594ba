//! Tests for the connection timers.

use super::*;
use std::time::Duration;
use tokio::time::{Instant, timeout};

#[test]
fn test_arm_and_clear_bump_generation() {
    let now = Instant::now();
    let mut table = TimerTable::new();
    assert!(!table.is_pending(TimerKind::RtoTlp));

    table.arm(TimerKind::RtoTlp, now + Duration::from_millis(10));
    let first = table.generation(TimerKind::RtoTlp);
    table.arm(TimerKind::RtoTlp, now + Duration::from_millis(20));
    assert_eq!(table.generation(TimerKind::RtoTlp), first + 1);
    assert_eq!(
        table.deadline(TimerKind::RtoTlp),
        Some(now + Duration::from_millis(20))
    );

    assert!(table.clear(TimerKind::RtoTlp));
    assert!(!table.clear(TimerKind::RtoTlp));
    assert!(!table.is_pending(TimerKind::RtoTlp));
}

#[test]
fn test_stale_generation_is_not_current() {
    let now = Instant::now();
    let mut table = TimerTable::new();
    table.arm(TimerKind::DelayedAck, now);
    let old = TimerFired {
        kind: TimerKind::DelayedAck,
        generation: table.generation(TimerKind::DelayedAck),
    };
    assert!(table.is_current(old));

    table.arm(TimerKind::DelayedAck, now + Duration::from_millis(5));
    assert!(!table.is_current(old));

    table.clear(TimerKind::DelayedAck);
    let cleared = TimerFired {
        kind: TimerKind::DelayedAck,
        generation: table.generation(TimerKind::DelayedAck),
    };
    assert!(!table.is_current(cleared));
}

#[test]
fn test_timers_are_independent() {
    let now = Instant::now();
    let mut table = TimerTable::new();
    table.arm(TimerKind::HandshakeLoss, now + Duration::from_millis(30));
    table.arm(TimerKind::EarlyRetransmit, now + Duration::from_millis(10));

    assert_eq!(table.next_deadline(), Some(now + Duration::from_millis(10)));
    let expired = table.expire(now + Duration::from_millis(15));
    assert_eq!(expired, vec![TimerKind::EarlyRetransmit]);
    assert!(table.is_pending(TimerKind::HandshakeLoss));

    table.clear_all();
    assert_eq!(table.next_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_delivers_expiry() {
    let (mut scheduler, mut rx) = TimerScheduler::new(8);
    let mut table = TimerTable::new();
    table.arm(TimerKind::RtoTlp, Instant::now() + Duration::from_millis(100));
    scheduler.sync(&table);

    let fired = rx.recv().await.unwrap();
    assert_eq!(fired.kind, TimerKind::RtoTlp);
    assert!(table.is_current(fired));
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_rearm_replaces_pending_sleep() {
    let (mut scheduler, mut rx) = TimerScheduler::new(8);
    let mut table = TimerTable::new();
    let start = Instant::now();

    table.arm(TimerKind::DelayedAck, start + Duration::from_millis(10));
    scheduler.sync(&table);
    table.arm(TimerKind::DelayedAck, start + Duration::from_millis(50));
    scheduler.sync(&table);

    let fired = rx.recv().await.unwrap();
    assert!(Instant::now() >= start + Duration::from_millis(50));
    assert!(table.is_current(fired));
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "the replaced sleep must not fire"
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_clear_and_shutdown_cancel() {
    let (mut scheduler, mut rx) = TimerScheduler::new(8);
    let mut table = TimerTable::new();
    let start = Instant::now();

    table.arm(TimerKind::HandshakeLoss, start + Duration::from_millis(10));
    table.arm(TimerKind::EarlyRetransmit, start + Duration::from_millis(10));
    scheduler.sync(&table);
    assert_eq!(scheduler.active(), 2);

    table.clear(TimerKind::HandshakeLoss);
    scheduler.sync(&table);
    scheduler.shutdown();

    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}
