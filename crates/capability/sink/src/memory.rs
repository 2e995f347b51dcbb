//! 内存点位写入实现
//!
//! 仅用于本地测试和占位。

use crate::{PointSink, SinkError};
use async_trait::async_trait;
use domain::MetricPoint;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemorySink {
    points: RwLock<Vec<MetricPoint>>,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入点位的副本（用于测试）。
    pub fn points(&self) -> Vec<MetricPoint> {
        self.points.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn write_point(&self, point: MetricPoint) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        if point.fields.is_empty() {
            return Err(SinkError::NoFields(point.measurement));
        }
        let mut points = self
            .points
            .write()
            .map_err(|_| SinkError::Unavailable("lock failed".to_string()))?;
        points.push(point);
        Ok(())
    }

    async fn flush(&self) -> Result<usize, SinkError> {
        Ok(0)
    }

    async fn close(&self) -> Result<usize, SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(0)
    }
}
