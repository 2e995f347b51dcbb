use aq_telemetry::{
    TelemetryMetrics, metrics, record_broker_connect, record_point_dropped,
    record_points_written, record_uplink_received,
};

#[test]
fn fresh_metrics_start_at_zero() {
    let local = TelemetryMetrics::new();
    assert_eq!(local.snapshot(), Default::default());
}

#[test]
fn recorders_increment_global_counters() {
    let before = metrics().snapshot();
    record_uplink_received();
    record_broker_connect();
    record_points_written(3);
    record_point_dropped();
    let after = metrics().snapshot();

    assert!(after.uplinks_received >= before.uplinks_received + 1);
    assert!(after.broker_connects >= before.broker_connects + 1);
    assert!(after.points_written >= before.points_written + 3);
    assert!(after.points_dropped >= before.points_dropped + 1);
}
