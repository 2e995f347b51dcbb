use crate::buffer::BatchBuffer;
use crate::line_protocol::encode_point;
use crate::{LineTransport, PointSink, SinkError};
use async_trait::async_trait;
use aq_telemetry::{
    record_point_dropped, record_point_enqueued, record_points_written, record_write_failure,
};
use domain::MetricPoint;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// InfluxSink 参数。
#[derive(Debug, Clone)]
pub struct InfluxSinkConfig {
    /// 附加到每个点位的默认标签。
    pub default_tags: BTreeMap<String, String>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// 待写行队列上限，满时新点位直接丢弃。
    pub queue_capacity: usize,
}

impl Default for InfluxSinkConfig {
    fn default() -> Self {
        Self::with_host_tag("render-ttn")
    }
}

impl InfluxSinkConfig {
    pub fn with_host_tag(host: impl Into<String>) -> Self {
        Self {
            default_tags: BTreeMap::from([("host".to_string(), host.into())]),
            batch_size: 500,
            flush_interval: Duration::from_secs(1),
            queue_capacity: 10_000,
        }
    }
}

type Reply = oneshot::Sender<Result<usize, SinkError>>;

enum SinkCommand {
    Line(String),
    Flush(Reply),
    Close(Reply),
}

/// 批量写入 InfluxDB 的点位 sink。
///
/// `write_point` 只负责编码与入队，真正的 HTTP 提交在后台写入任务中完成；
/// 提交失败的批次记录日志后直接丢弃，不重试。队列有上限：InfluxDB 不可用时
/// 写入任务被阻塞，超出上限的新点位被丢弃并计数，调用方不会等待。
pub struct InfluxSink {
    commands: mpsc::Sender<SinkCommand>,
    default_tags: BTreeMap<String, String>,
    closed: AtomicBool,
}

impl InfluxSink {
    /// 启动后台写入任务（需在 tokio 运行时内调用）。
    pub fn spawn(transport: Arc<dyn LineTransport>, config: InfluxSinkConfig) -> Self {
        let (commands, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let buffer = BatchBuffer::new(config.batch_size, config.flush_interval);
        tokio::spawn(run_writer(transport, receiver, buffer, config.flush_interval));
        Self {
            commands,
            default_tags: config.default_tags,
            closed: AtomicBool::new(false),
        }
    }

    async fn request(&self, command: impl FnOnce(Reply) -> SinkCommand) -> Result<usize, SinkError> {
        let (reply, response) = oneshot::channel();
        // 写入任务已退出：没有待写数据
        if self.commands.send(command(reply)).await.is_err() {
            return Ok(0);
        }
        response.await.unwrap_or(Ok(0))
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write_point(&self, point: MetricPoint) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let line = encode_point(&point, &self.default_tags)?;
        match self.commands.try_send(SinkCommand::Line(line)) {
            Ok(()) => {
                record_point_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                record_point_dropped();
                Err(SinkError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    async fn flush(&self) -> Result<usize, SinkError> {
        self.request(SinkCommand::Flush).await
    }

    async fn close(&self) -> Result<usize, SinkError> {
        self.closed.store(true, Ordering::Release);
        self.request(SinkCommand::Close).await
    }
}

async fn run_writer(
    transport: Arc<dyn LineTransport>,
    mut commands: mpsc::Receiver<SinkCommand>,
    mut buffer: BatchBuffer,
    flush_interval: Duration,
) {
    let mut ticker = tokio::time::interval(flush_interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SinkCommand::Line(line)) => {
                    if let Some(batch) = buffer.add(line) {
                        let _ = submit(transport.as_ref(), batch).await;
                    }
                }
                Some(SinkCommand::Flush(reply)) => {
                    let result = submit(transport.as_ref(), buffer.flush()).await;
                    let _ = reply.send(result);
                }
                Some(SinkCommand::Close(reply)) => {
                    let result = submit(transport.as_ref(), buffer.flush()).await;
                    info!(target: "aq.sink", ok = result.is_ok(), "sink_closed");
                    let _ = reply.send(result);
                    break;
                }
                None => {
                    let _ = submit(transport.as_ref(), buffer.flush()).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if buffer.should_flush() {
                    let _ = submit(transport.as_ref(), buffer.flush()).await;
                }
            }
        }
    }
}

async fn submit(transport: &dyn LineTransport, batch: Vec<String>) -> Result<usize, SinkError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let count = batch.len();
    match transport.send(batch.join("\n")).await {
        Ok(()) => {
            record_points_written(count as u64);
            debug!(target: "aq.sink", lines = count, "batch_written");
            Ok(count)
        }
        Err(err) => {
            record_write_failure();
            warn!(target: "aq.sink", lines = count, error = %err, "batch_write_failed");
            Err(err)
        }
    }
}
