//! 进程监督：信号、崩溃与看门狗触发统一走“刷写 → 退出”流程。
//!
//! 退出码：信号触发为 0，看门狗触发或故障为 1。

use crate::LivenessError;
use aq_ingest::SessionHandle;
use aq_sink::PointSink;
use aq_telemetry::metrics;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 关闭时等待 sink 刷写的上限。
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// 进程退出原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Signal(&'static str),
    WatchdogTripped,
    Fault(String),
}

impl ExitReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Signal(_) => 0,
            Self::WatchdogTripped | Self::Fault(_) => 1,
        }
    }
}

impl Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "signal {}", name),
            Self::WatchdogTripped => write!(f, "watchdog tripped"),
            Self::Fault(message) => write!(f, "fault: {}", message),
        }
    }
}

/// 退出请求发送端（看门狗、panic hook、任务监视器共用）。
#[derive(Debug, Clone)]
pub struct ExitSender {
    tx: mpsc::UnboundedSender<ExitReason>,
}

impl ExitSender {
    pub fn trigger(&self, reason: ExitReason) -> Result<(), LivenessError> {
        self.tx
            .send(reason)
            .map_err(|_| LivenessError::SupervisorGone)
    }
}

pub struct Supervisor {
    sink: Arc<dyn PointSink>,
    session: Option<SessionHandle>,
    exits_tx: mpsc::UnboundedSender<ExitReason>,
    exits_rx: mpsc::UnboundedReceiver<ExitReason>,
    flush_timeout: Duration,
}

impl Supervisor {
    pub fn new(sink: Arc<dyn PointSink>) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            session: None,
            exits_tx,
            exits_rx,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn exit_sender(&self) -> ExitSender {
        ExitSender {
            tx: self.exits_tx.clone(),
        }
    }

    /// 关闭时先结束 broker 会话。
    pub fn attach_session(&mut self, session: SessionHandle) {
        self.session = Some(session);
    }

    /// 任何线程/任务 panic 都转为 `Fault` 退出。
    pub fn install_panic_hook(&self) {
        let exits = self.exit_sender();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic| {
            let message = panic.to_string();
            error!(target: "aq.supervisor", panic = %message, "uncaught_panic");
            let _ = exits.trigger(ExitReason::Fault(message));
            previous(panic);
        }));
    }

    /// 监视后台任务：以错误结束或 panic 时请求 `Fault` 退出。
    pub fn watch_task<T, E>(&self, name: &'static str, task: JoinHandle<Result<T, E>>)
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let exits = self.exit_sender();
        tokio::spawn(async move {
            let fault = match task.await {
                Ok(Ok(_)) => {
                    info!(target: "aq.supervisor", task = name, "task_finished");
                    return;
                }
                Ok(Err(err)) => format!("{} failed: {}", name, err),
                Err(err) => format!("{} aborted: {}", name, err),
            };
            error!(target: "aq.supervisor", task = name, fault = %fault, "task_failed");
            let _ = exits.trigger(ExitReason::Fault(fault));
        });
    }

    /// 等待第一个退出原因（信号、看门狗或故障）。
    pub async fn wait(&mut self) -> ExitReason {
        tokio::select! {
            _ = wait_interrupt() => ExitReason::Signal("SIGINT"),
            _ = wait_terminate() => ExitReason::Signal("SIGTERM"),
            reason = self.exits_rx.recv() => {
                // 自身持有发送端，通道不会关闭
                reason.unwrap_or_else(|| ExitReason::Fault("exit channel closed".to_string()))
            }
        }
    }

    /// 结束会话并尽力刷写 sink，返回退出码。不会阻塞超过 `flush_timeout`。
    pub async fn shutdown(&self, reason: &ExitReason) -> i32 {
        let code = reason.exit_code();
        if code == 0 {
            info!(target: "aq.supervisor", reason = %reason, "shutdown_started");
        } else {
            error!(target: "aq.supervisor", reason = %reason, "shutdown_started");
        }

        if let Some(session) = &self.session {
            session.shutdown();
        }

        match tokio::time::timeout(self.flush_timeout, self.sink.close()).await {
            Ok(Ok(lines)) => info!(target: "aq.supervisor", lines, "sink_flushed"),
            Ok(Err(err)) => warn!(target: "aq.supervisor", error = %err, "sink_flush_failed"),
            Err(_) => warn!(
                target: "aq.supervisor",
                timeout_ms = self.flush_timeout.as_millis() as u64,
                "sink_flush_timeout"
            ),
        }

        let snapshot = metrics().snapshot();
        info!(target: "aq.supervisor", exit_code = code, metrics = ?snapshot, "shutdown_complete");
        code
    }

    /// 等待退出原因、执行关闭流程并结束进程。
    pub async fn run(mut self) {
        let reason = self.wait().await;
        let code = self.shutdown(&reason).await;
        std::process::exit(code)
    }
}

async fn wait_interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "aq.supervisor", error = %err, "sigint_handler_unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(target: "aq.supervisor", error = %err, "sigterm_handler_unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_terminate() {
    std::future::pending::<()>().await;
}
