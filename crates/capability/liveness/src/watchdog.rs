//! 存活看门狗。
//!
//! 按固定周期检查距上次 broker 握手成功的时长，超过阈值即请求进程以非零码退出，
//! 由外部进程管理器负责重启。

use crate::supervisor::{ExitReason, ExitSender};
use aq_ingest::ConnectionView;
use aq_telemetry::record_watchdog_trip;
use domain::{WatchdogPolicy, monotonic_ms};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

/// 看门狗参数。
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub interval: Duration,
    pub threshold: Duration,
    pub policy: WatchdogPolicy,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            threshold: Duration::from_secs(5 * 60),
            policy: WatchdogPolicy::DisconnectedOnly,
        }
    }
}

/// 单次检查结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Healthy,
    Tripped { elapsed_ms: i64 },
}

impl WatchdogVerdict {
    pub fn is_tripped(&self) -> bool {
        matches!(self, Self::Tripped { .. })
    }
}

pub struct Watchdog {
    view: ConnectionView,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(view: ConnectionView, config: WatchdogConfig) -> Self {
        Self { view, config }
    }

    /// 基于当前连接状态做一次检查，不产生副作用。`now_ms` 与连接状态同为单调时钟。
    pub fn check(&self, now_ms: i64) -> WatchdogVerdict {
        let elapsed_ms = now_ms.saturating_sub(self.view.last_connected_at_ms());
        let threshold_ms = i64::try_from(self.config.threshold.as_millis()).unwrap_or(i64::MAX);
        if elapsed_ms <= threshold_ms {
            return WatchdogVerdict::Healthy;
        }
        match self.config.policy {
            WatchdogPolicy::DisconnectedOnly if self.view.is_connected() => WatchdogVerdict::Healthy,
            _ => WatchdogVerdict::Tripped { elapsed_ms },
        }
    }

    /// 启动周期检查任务；触发后把退出原因交给 Supervisor 并结束。
    pub fn spawn(self, exits: ExitSender) -> JoinHandle<()> {
        tokio::spawn(async move {
            let first_tick = Instant::now()
                .checked_add(self.config.interval)
                .filter(|_| !self.config.interval.is_zero());
            let Some(first_tick) = first_tick else {
                error!(
                    target: "aq.liveness",
                    interval_s = self.config.interval.as_secs(),
                    "watchdog_interval_invalid"
                );
                return;
            };
            let mut ticker = tokio::time::interval_at(first_tick, self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.check(monotonic_ms()) {
                    WatchdogVerdict::Healthy => {
                        debug!(
                            target: "aq.liveness",
                            state = self.view.state().as_str(),
                            "watchdog_healthy"
                        );
                    }
                    WatchdogVerdict::Tripped { elapsed_ms } => {
                        record_watchdog_trip();
                        error!(
                            target: "aq.liveness",
                            elapsed_ms,
                            threshold_ms = self.config.threshold.as_millis() as u64,
                            is_connected = self.view.is_connected(),
                            "watchdog_tripped"
                        );
                        let reason = ExitReason::WatchdogTripped;
                        if let Err(err) = exits.trigger(reason.clone()) {
                            // Supervisor 已不在：无法刷写，直接退出
                            error!(target: "aq.liveness", error = %err, "watchdog_trigger_failed");
                            std::process::exit(reason.exit_code());
                        }
                        return;
                    }
                }
            }
        })
    }
}
