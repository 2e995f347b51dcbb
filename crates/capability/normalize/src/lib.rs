//! TTN 上行报文解码与字段映射。
//!
//! - [`decode_uplink`]：原始字节 → [`domain::UplinkMessage`]
//! - [`FieldMapper`]：[`domain::UplinkMessage`] → [`domain::MetricPoint`]
//!
//! 两者都不做 I/O，失败以 `Result` 返回，由调用方记录日志后丢弃。

mod decoder;
mod mapper;

pub use decoder::{DecodeError, decode_uplink};
pub use mapper::{FieldMapper, MapError, MappedPoint, pm10_field_name};

