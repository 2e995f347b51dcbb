//! 时序写入能力（InfluxDB v2）。
//!
//! - [`PointSink`]：点位写入抽象（`write_point` / `flush` / `close`）
//! - [`InfluxSink`]：后台批量刷写实现，调用方只负责入队
//! - [`MemorySink`]：内存实现（用于测试）
//! - [`LineTransport`]：Line Protocol 批次的提交通道（HTTP 或测试桩）

mod buffer;
mod influx;
mod line_protocol;
mod memory;
mod transport;

pub use buffer::BatchBuffer;
pub use influx::{InfluxSink, InfluxSinkConfig};
pub use line_protocol::encode_point;
pub use memory::MemorySink;
pub use transport::{HttpLineTransport, InfluxTarget, LineTransport};

use async_trait::async_trait;
use domain::MetricPoint;

/// 写入错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("point for {0} has no fields")]
    NoFields(String),
    #[error("field {0:?} cannot be encoded")]
    InvalidField(String),
    #[error("tag {0} cannot be encoded")]
    InvalidTag(String),
    #[error("sink closed")]
    Closed,
    #[error("write queue full, point dropped")]
    QueueFull,
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("influx rejected write: status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// 点位写入抽象。
#[async_trait]
pub trait PointSink: Send + Sync {
    /// 入队一个点位，不等待落盘。
    async fn write_point(&self, point: MetricPoint) -> Result<(), SinkError>;

    /// 立即提交所有待写数据，返回提交的行数。
    async fn flush(&self) -> Result<usize, SinkError>;

    /// 刷写剩余数据并释放句柄；可重复调用。
    async fn close(&self) -> Result<usize, SinkError>;
}
