pub mod data;
pub mod liveness;

pub use data::{
    MetricPoint, RawUplink, UplinkMessage, is_encodable_key, monotonic_ms, now_epoch_ms,
};
pub use liveness::{LivenessSource, WatchdogPolicy};

/// 写入 InfluxDB 的 measurement 名称。
pub const AIR_QUALITY_MEASUREMENT: &str = "air_quality";

/// 每个点位必带的设备标签名。
pub const DEVICE_TAG: &str = "device";
