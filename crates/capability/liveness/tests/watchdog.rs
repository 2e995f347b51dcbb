use aq_ingest::{ConnectionState, ConnectionView, SessionEvent};
use aq_liveness::{ExitReason, Supervisor, Watchdog, WatchdogConfig, WatchdogVerdict};
use aq_sink::MemorySink;
use domain::{LivenessSource, WatchdogPolicy, monotonic_ms};
use std::sync::Arc;
use std::time::Duration;

const MINUTE_MS: i64 = 60_000;

fn view_with(started_at_ms: i64) -> (Arc<ConnectionState>, ConnectionView) {
    let state = Arc::new(ConnectionState::new(LivenessSource::ConnectOnly, started_at_ms));
    let view = ConnectionView::new(state.clone());
    (state, view)
}

fn config(policy: WatchdogPolicy) -> WatchdogConfig {
    WatchdogConfig {
        policy,
        ..WatchdogConfig::default()
    }
}

#[test]
fn disconnected_and_stale_trips_with_exit_code_one() {
    let now = monotonic_ms();
    let (_state, view) = view_with(now - 6 * MINUTE_MS);
    let watchdog = Watchdog::new(view, config(WatchdogPolicy::DisconnectedOnly));

    let verdict = watchdog.check(now);
    assert_eq!(verdict, WatchdogVerdict::Tripped { elapsed_ms: 6 * MINUTE_MS });
    assert_eq!(ExitReason::WatchdogTripped.exit_code(), 1);
}

#[test]
fn connected_never_trips_under_disconnected_only_policy() {
    let now = monotonic_ms();
    let (state, view) = view_with(now - 60 * MINUTE_MS);
    state.apply(SessionEvent::Connected, now - 30 * MINUTE_MS);

    let watchdog = Watchdog::new(view, config(WatchdogPolicy::DisconnectedOnly));
    assert_eq!(watchdog.check(now), WatchdogVerdict::Healthy);
}

#[test]
fn elapsed_policy_trips_even_while_connected() {
    let now = monotonic_ms();
    let (state, view) = view_with(now - 60 * MINUTE_MS);
    state.apply(SessionEvent::Connected, now - 30 * MINUTE_MS);

    let watchdog = Watchdog::new(view, config(WatchdogPolicy::Elapsed));
    assert!(watchdog.check(now).is_tripped());
}

#[test]
fn within_threshold_is_healthy() {
    let now = monotonic_ms();
    let (_state, view) = view_with(now - 4 * MINUTE_MS);
    let watchdog = Watchdog::new(view, config(WatchdogPolicy::Elapsed));
    assert_eq!(watchdog.check(now), WatchdogVerdict::Healthy);
    // 恰好等于阈值不触发
    assert_eq!(watchdog.check(now + MINUTE_MS), WatchdogVerdict::Healthy);
}

#[test]
fn close_after_connect_keeps_connect_time_for_watchdog() {
    let now = monotonic_ms();
    let (state, view) = view_with(now - 20 * MINUTE_MS);
    state.apply(SessionEvent::Connected, now - 10 * MINUTE_MS);
    state.apply(SessionEvent::Closed, now - MINUTE_MS);

    let watchdog = Watchdog::new(view, config(WatchdogPolicy::DisconnectedOnly));
    assert_eq!(
        watchdog.check(now),
        WatchdogVerdict::Tripped { elapsed_ms: 10 * MINUTE_MS }
    );
}

#[tokio::test]
async fn tripped_watchdog_drives_supervisor_shutdown() {
    let (_state, view) = view_with(monotonic_ms() - 6 * MINUTE_MS);
    let sink = Arc::new(MemorySink::new());
    let mut supervisor = Supervisor::new(sink.clone());

    let watchdog = Watchdog::new(
        view,
        WatchdogConfig {
            interval: Duration::from_millis(10),
            ..WatchdogConfig::default()
        },
    );
    let task = watchdog.spawn(supervisor.exit_sender());

    let reason = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
        .await
        .expect("watchdog fires");
    assert_eq!(reason, ExitReason::WatchdogTripped);
    assert_eq!(supervisor.shutdown(&reason).await, 1);
    assert!(sink.is_closed());
    task.await.expect("watchdog task ends after trip");
}

#[tokio::test]
async fn unusable_interval_stops_watchdog_without_panic() {
    let supervisor = Supervisor::new(Arc::new(MemorySink::new()));
    for interval in [Duration::MAX, Duration::ZERO] {
        let (_state, view) = view_with(monotonic_ms() - 6 * MINUTE_MS);
        let watchdog = Watchdog::new(
            view,
            WatchdogConfig {
                interval,
                ..WatchdogConfig::default()
            },
        );
        tokio::time::timeout(Duration::from_secs(5), watchdog.spawn(supervisor.exit_sender()))
            .await
            .expect("watchdog task returns")
            .expect("no panic");
    }
}
