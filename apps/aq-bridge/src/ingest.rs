//! 采集链路装配：原始上行 → 解码 → 字段映射 → sink 入队。

use aq_ingest::{IngestError, UplinkHandler};
use aq_normalize::{FieldMapper, decode_uplink};
use aq_sink::PointSink;
use aq_telemetry::{
    record_decode_failure, record_field_skipped, record_point_mapped, record_write_failure,
};
use domain::RawUplink;
use std::sync::Arc;
use tracing::{debug, warn};

/// 逐条处理上行消息。
///
/// 单条消息的任何失败都只记录并丢弃，不向会话返回错误，
/// 保证后续消息继续处理。
pub struct UplinkPipelineHandler {
    mapper: FieldMapper,
    sink: Arc<dyn PointSink>,
}

impl UplinkPipelineHandler {
    pub fn new(mapper: FieldMapper, sink: Arc<dyn PointSink>) -> Self {
        Self { mapper, sink }
    }
}

#[async_trait::async_trait]
impl UplinkHandler for UplinkPipelineHandler {
    async fn handle(&self, uplink: RawUplink) -> Result<(), IngestError> {
        let message = match decode_uplink(&uplink.payload) {
            Ok(message) => message,
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "aq.ingest",
                    topic = %uplink.topic,
                    payload_size = uplink.payload.len(),
                    error = %err,
                    "uplink_decode_failed"
                );
                return Ok(());
            }
        };

        let mapped = self.mapper.map(&message, uplink.received_at_ms);
        for _ in &mapped.skipped {
            record_field_skipped();
        }
        record_point_mapped();
        debug!(
            target: "aq.ingest",
            device_id = %message.device_id,
            fields = mapped.point.fields.len(),
            skipped = mapped.skipped.len(),
            "uplink_mapped"
        );

        if let Err(err) = self.sink.write_point(mapped.point).await {
            record_write_failure();
            warn!(
                target: "aq.ingest",
                device_id = %message.device_id,
                error = %err,
                "point_write_failed"
            );
        }
        Ok(())
    }
}
