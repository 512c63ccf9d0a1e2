//! Integration tests for the timer engine.
//!
//! These drive the engine through a real SQLite store with a manual clock
//! and check the accounting and consistency rules across operations.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use common::FlakyStore;
use proptest::prelude::*;
use tasktrack_core::events::EventBus;
use tasktrack_core::notification::{NotificationScheduler, RecordingNotifier};
use tasktrack_core::storage::{NotificationsConfig, SqliteStore, Store};
use tasktrack_core::task::{NewTask, Task, TaskFilter};
use tasktrack_core::timer::{TimeEntryFilter, TimerEngine};
use tasktrack_core::{CoreError, ManualClock};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn engine_over(store: Arc<dyn Store>, clock: &ManualClock) -> TimerEngine {
    let bus = Arc::new(EventBus::new());
    let scheduler = Arc::new(NotificationScheduler::new(
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        bus.clone(),
        Arc::new(clock.clone()),
        NotificationsConfig::default(),
    ));
    TimerEngine::new(store, scheduler, bus, Arc::new(clock.clone()))
}

fn memory_store(clock: &ManualClock) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone())),
    )
}

async fn new_task(store: &dyn Store, estimate: Option<i64>) -> Task {
    let task = NewTask {
        estimated_duration: estimate,
        ..NewTask::titled("Focus work")
    }
    .into_task(t0());
    store.create_task(&task).await.unwrap();
    task
}

async fn assert_consistent(store: &dyn Store, engine: &TimerEngine) {
    for task in store.list_tasks(&TaskFilter::default()).await.unwrap() {
        assert_eq!(
            task.is_timer_running,
            engine.is_timer_running(&task.id),
            "task {} disagrees with the engine",
            task.id
        );
    }
}

#[tokio::test]
async fn running_flag_tracks_engine_after_every_operation() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let a = new_task(store.as_ref(), None).await;
    let b = new_task(store.as_ref(), None).await;

    engine.start(&a.id).await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    engine.start(&b.id).await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    clock.advance_minutes(4);
    engine.pause(&a.id).await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    engine.tick().await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    engine.resume(&a.id).await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    engine.stop(&b.id).await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
    engine.stop_all().await.unwrap();
    assert_consistent(store.as_ref(), &engine).await;
}

#[tokio::test]
async fn restart_records_exactly_one_entry() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(10);
    engine.start(&task.id).await.unwrap();

    let entries = store
        .list_time_entries(&TimeEntryFilter::by_task(&task.id))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].duration, 10);
    assert_eq!(store.get_task(&task.id).await.unwrap().unwrap().time_spent, 10);
    assert_eq!(engine.current_elapsed_minutes(&task.id), 0);
}

#[tokio::test]
async fn instantaneous_restart_records_nothing() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    engine.start(&task.id).await.unwrap();
    assert!(store
        .list_time_entries(&TimeEntryFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(engine.is_timer_running(&task.id));
}

#[tokio::test]
async fn second_stop_is_invalid_and_changes_nothing() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(25);
    engine.stop(&task.id).await.unwrap();
    let before = store.get_task(&task.id).await.unwrap().unwrap().time_spent;

    clock.advance_minutes(5);
    let err = engine.stop(&task.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    assert_eq!(store.get_task(&task.id).await.unwrap().unwrap().time_spent, before);
}

#[tokio::test]
async fn pause_resume_stop_adds_both_segments() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(8);
    engine.pause(&task.id).await.unwrap();
    clock.advance_minutes(60);
    engine.resume(&task.id).await.unwrap();
    clock.advance_minutes(12);
    let outcome = engine.stop(&task.id).await.unwrap();

    assert_eq!(outcome.task.time_spent, 20);
    assert_eq!(outcome.entry.duration, 12);
}

#[tokio::test]
async fn stop_while_paused_records_segment_up_to_pause() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(9);
    engine.pause(&task.id).await.unwrap();
    clock.advance_minutes(30);
    let outcome = engine.stop(&task.id).await.unwrap();

    assert_eq!(outcome.task.time_spent, 9);
    assert_eq!(outcome.entry.duration, 9);
    assert_eq!(outcome.entry.end_time, t0() + chrono::Duration::minutes(9));
}

#[tokio::test]
async fn recovery_measures_from_original_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasktrack.db");
    let clock = ManualClock::new(t0());

    let task_id = {
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::open(&path).unwrap().with_clock(Arc::new(clock.clone())));
        let engine = engine_over(store.clone(), &clock);
        let task = new_task(store.as_ref(), None).await;
        engine.start(&task.id).await.unwrap();
        clock.advance_minutes(5);
        engine.tick().await.unwrap();
        task.id
    };

    // Simulated restart 40 minutes later.
    clock.advance_minutes(35);
    let store: Arc<dyn Store> =
        Arc::new(SqliteStore::open(&path).unwrap().with_clock(Arc::new(clock.clone())));
    let engine = engine_over(store.clone(), &clock);
    assert_eq!(engine.recover().await.unwrap(), 1);

    assert!(engine.is_timer_running(&task_id));
    assert_eq!(engine.current_elapsed_minutes(&task_id), 40);
    let task = store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.time_spent, 40);
    assert_eq!(task.timer_start_time, Some(t0()));

    clock.advance_minutes(2);
    assert_eq!(engine.stop(&task_id).await.unwrap().task.time_spent, 42);
}

#[tokio::test]
async fn recovery_keeps_paused_timers_frozen() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let task = new_task(store.as_ref(), None).await;
    {
        let engine = engine_over(store.clone(), &clock);
        engine.start(&task.id).await.unwrap();
        clock.advance_minutes(6);
        engine.pause(&task.id).await.unwrap();
    }

    clock.advance_minutes(120);
    let engine = engine_over(store.clone(), &clock);
    engine.recover().await.unwrap();
    assert!(!engine.is_timer_running(&task.id));
    assert_eq!(engine.current_elapsed_minutes(&task.id), 6);
    assert_eq!(store.get_task(&task.id).await.unwrap().unwrap().time_spent, 6);
}

#[tokio::test]
async fn overdue_once_after_estimate() {
    let clock = ManualClock::new(t0());
    let store = memory_store(&clock);
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), Some(30)).await;

    engine.start(&task.id).await.unwrap();
    let mut crossings = 0;
    for _ in 0..31 {
        clock.advance_minutes(1);
        crossings += engine.tick().await.unwrap().timed_up;
    }
    assert_eq!(crossings, 1);
    let task = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(task.status, tasktrack_core::TaskStatus::Overdue);
    assert_eq!(task.time_spent, 31);
}

#[tokio::test]
async fn one_transient_failure_is_retried() {
    let clock = ManualClock::new(t0());
    let store = Arc::new(FlakyStore::in_memory(&clock));
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(15);
    store.fail_entries(1);
    let outcome = engine.stop(&task.id).await.unwrap();

    assert_eq!(outcome.entry.duration, 15);
    assert_eq!(
        store
            .list_time_entries(&TimeEntryFilter::by_task(&task.id))
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(!engine.is_timer_running(&task.id));
}

#[tokio::test]
async fn two_failures_surface_and_keep_timer_active() {
    let clock = ManualClock::new(t0());
    let store = Arc::new(FlakyStore::in_memory(&clock));
    let engine = engine_over(store.clone(), &clock);
    let task = new_task(store.as_ref(), None).await;

    engine.start(&task.id).await.unwrap();
    clock.advance_minutes(15);
    store.fail_entries(2);
    let err = engine.stop(&task.id).await.unwrap_err();
    assert!(err.is_persistence());

    assert!(engine.is_timer_running(&task.id));
    assert!(store
        .list_time_entries(&TimeEntryFilter::default())
        .await
        .unwrap()
        .is_empty());
    let stored = store.get_task(&task.id).await.unwrap().unwrap();
    assert!(stored.is_timer_running);
    assert_eq!(stored.time_spent, 0);

    // The timer is still usable once the store recovers.
    clock.advance_minutes(5);
    let outcome = engine.stop(&task.id).await.unwrap();
    assert_eq!(outcome.task.time_spent, 20);
}

#[tokio::test]
async fn unreadable_task_does_not_block_other_recoveries() {
    let clock = ManualClock::new(t0());
    let store = Arc::new(FlakyStore::in_memory(&clock));
    let broken = new_task(store.as_ref(), None).await;
    let healthy = new_task(store.as_ref(), None).await;
    {
        let engine = engine_over(store.clone(), &clock);
        engine.start(&broken.id).await.unwrap();
        engine.start(&healthy.id).await.unwrap();
    }

    clock.advance_minutes(10);
    store.corrupt_task(&broken.id);
    let engine = engine_over(store.clone(), &clock);
    assert_eq!(engine.recover().await.unwrap(), 1);
    assert!(engine.is_timer_running(&healthy.id));
    assert_eq!(engine.current_elapsed_minutes(&healthy.id), 10);
    assert!(engine.active_timer(&broken.id).is_none());

    // The unrecovered snapshot and its running flag survive for a later attempt.
    assert!(store.get_active_timer(&broken.id).await.unwrap().is_some());
    store.repair_task(&broken.id);
    assert!(store.get_task(&broken.id).await.unwrap().unwrap().is_timer_running);

    let engine = engine_over(store.clone(), &clock);
    assert_eq!(engine.recover().await.unwrap(), 2);
    assert_eq!(engine.current_elapsed_minutes(&broken.id), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_racing_tick_settles_once() {
    let clock = ManualClock::new(t0());
    let store = Arc::new(FlakyStore::in_memory(&clock));
    let engine = Arc::new(engine_over(store.clone(), &clock));
    store.delay_updates(std::time::Duration::from_millis(20));

    for round in 0..4 {
        let task = new_task(store.as_ref(), None).await;
        engine.start(&task.id).await.unwrap();
        clock.advance_minutes(10);

        let ticker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.tick().await })
        };
        let stopper = {
            let engine = engine.clone();
            let id = task.id.clone();
            tokio::spawn(async move { engine.stop(&id).await })
        };
        ticker.await.unwrap().unwrap();
        let outcome = stopper.await.unwrap().unwrap();

        let entries = store
            .list_time_entries(&TimeEntryFilter::by_task(&task.id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1, "round {round}");
        assert_eq!(entries[0].duration, 10);
        assert_eq!(outcome.task.time_spent, 10);
        assert!(store.get_active_timer(&task.id).await.unwrap().is_none());
        let stored = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.time_spent, 10);
        assert!(!stored.is_timer_running);
        assert!(!engine.is_timer_running(&task.id));
    }
}

// ── Accounting property ─────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Start,
    Stop,
    Pause,
    Resume,
    Tick,
    Wait(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Stop),
        Just(Op::Pause),
        Just(Op::Resume),
        Just(Op::Tick),
        (1i64..90).prop_map(Op::Wait),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// time_spent always equals the wall-clock minutes spent in running
    /// segments, however the operations interleave.
    #[test]
    fn time_spent_matches_running_segments(ops in prop::collection::vec(op(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let clock = ManualClock::new(t0());
            let store = memory_store(&clock);
            let engine = engine_over(store.clone(), &clock);
            let task = new_task(store.as_ref(), None).await;
            let minutes = |from: DateTime<Utc>| (clock_now(&clock) - from).num_minutes();

            let mut folded = 0;
            let mut segment: Option<DateTime<Utc>> = None;
            for op in ops {
                // Rejected transitions leave state untouched.
                match op {
                    Op::Start => {
                        if engine.start(&task.id).await.is_ok() {
                            folded += segment.map_or(0, minutes);
                            segment = Some(clock_now(&clock));
                        }
                    }
                    Op::Stop | Op::Pause => {
                        let ok = match op {
                            Op::Stop => engine.stop(&task.id).await.is_ok(),
                            _ => engine.pause(&task.id).await.is_ok(),
                        };
                        if ok {
                            folded += segment.take().map_or(0, minutes);
                        }
                    }
                    Op::Resume => {
                        if engine.resume(&task.id).await.is_ok() {
                            segment = Some(clock_now(&clock));
                        }
                    }
                    Op::Tick => {
                        engine.tick().await.unwrap();
                    }
                    Op::Wait(m) => clock.advance_minutes(m),
                }

                let stored = store.get_task(&task.id).await.unwrap().unwrap();
                prop_assert_eq!(stored.is_timer_running, engine.is_timer_running(&task.id));
                let expected = folded + segment.map_or(0, minutes);
                prop_assert_eq!(engine.live_time_spent(&stored), expected);
                if matches!(op, Op::Tick) {
                    prop_assert_eq!(stored.time_spent, expected);
                }
            }
            Ok(())
        })?;
    }
}

fn clock_now(clock: &ManualClock) -> DateTime<Utc> {
    use tasktrack_core::Clock;
    clock.now()
}
