//! 日志初始化与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uplinks_received: u64,
    pub decode_failures: u64,
    pub points_mapped: u64,
    pub fields_skipped: u64,
    pub points_enqueued: u64,
    pub points_dropped: u64,
    pub points_written: u64,
    pub write_failures: u64,
    pub broker_connects: u64,
    pub broker_disconnects: u64,
    pub watchdog_trips: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    uplinks_received: AtomicU64,
    decode_failures: AtomicU64,
    points_mapped: AtomicU64,
    fields_skipped: AtomicU64,
    points_enqueued: AtomicU64,
    points_dropped: AtomicU64,
    points_written: AtomicU64,
    write_failures: AtomicU64,
    broker_connects: AtomicU64,
    broker_disconnects: AtomicU64,
    watchdog_trips: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            uplinks_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            points_mapped: AtomicU64::new(0),
            fields_skipped: AtomicU64::new(0),
            points_enqueued: AtomicU64::new(0),
            points_dropped: AtomicU64::new(0),
            points_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            broker_connects: AtomicU64::new(0),
            broker_disconnects: AtomicU64::new(0),
            watchdog_trips: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uplinks_received: self.uplinks_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            points_mapped: self.points_mapped.load(Ordering::Relaxed),
            fields_skipped: self.fields_skipped.load(Ordering::Relaxed),
            points_enqueued: self.points_enqueued.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            broker_connects: self.broker_connects.load(Ordering::Relaxed),
            broker_disconnects: self.broker_disconnects.load(Ordering::Relaxed),
            watchdog_trips: self.watchdog_trips.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录收到的上行报文数。
pub fn record_uplink_received() {
    metrics().uplinks_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败（报文被丢弃）次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录映射成功的点位数。
pub fn record_point_mapped() {
    metrics().points_mapped.fetch_add(1, Ordering::Relaxed);
}

/// 记录映射时被跳过的字段数。
pub fn record_field_skipped() {
    metrics().fields_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录进入写入队列的点位数。
pub fn record_point_enqueued() {
    metrics().points_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录因写入队列已满被丢弃的点位数。
pub fn record_point_dropped() {
    metrics().points_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录 InfluxDB 确认写入的行数。
pub fn record_points_written(count: u64) {
    metrics().points_written.fetch_add(count, Ordering::Relaxed);
}

/// 记录写入失败次数（入队失败或批量提交失败）。
pub fn record_write_failure() {
    metrics().write_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 握手成功次数。
pub fn record_broker_connect() {
    metrics().broker_connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 断开次数。
pub fn record_broker_disconnect() {
    metrics().broker_disconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录看门狗触发次数。
pub fn record_watchdog_trip() {
    metrics().watchdog_trips.fetch_add(1, Ordering::Relaxed);
}
