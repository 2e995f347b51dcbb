//! 存活监督能力。
//!
//! - [`Watchdog`]：周期检查 broker 连接，超时请求退出
//! - [`Supervisor`]：信号、panic、任务失败与看门狗统一的“刷写 → 退出”流程
//! - [`http`]：外部健康检查用的静态存活探针

pub mod http;
mod supervisor;
mod watchdog;

pub use supervisor::{DEFAULT_FLUSH_TIMEOUT, ExitReason, ExitSender, Supervisor};
pub use watchdog::{Watchdog, WatchdogConfig, WatchdogVerdict};

/// 存活监督错误。
#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("supervisor is gone")]
    SupervisorGone,
    #[error("bind {0} failed: {1}")]
    Bind(String, String),
    #[error("http serve failed: {0}")]
    Serve(String),
}
