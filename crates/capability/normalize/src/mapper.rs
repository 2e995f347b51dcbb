use domain::{AIR_QUALITY_MEASUREMENT, DEVICE_TAG, MetricPoint, UplinkMessage, is_encodable_key};
use tracing::warn;

const PM10_FIELD: &str = "pm10";

/// 已知设备的 pm10 字段后缀，其他设备使用完整 device_id。
const PM10_DEVICE_SUFFIXES: &[(&str, &str)] = &[("mkrwan-1", "1"), ("mkrwan-2", "2")];

/// 单字段映射错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("field {field} is not finite: {value}")]
    NonFinite { field: String, value: f64 },
    #[error("field key {field:?} cannot be encoded")]
    UnencodableKey { field: String },
}

/// 映射结果：点位 + 被跳过的字段。
#[derive(Debug, Clone, PartialEq)]
pub struct MappedPoint {
    pub point: MetricPoint,
    pub skipped: Vec<MapError>,
}

/// UplinkMessage → MetricPoint 的字段映射。
///
/// 不同设备都上报 `pm10`，写入同一 measurement 时会互相覆盖，
/// 因此 `pm10` 按设备改名（见 [`pm10_field_name`]），其余字段原样复制。
#[derive(Debug, Clone)]
pub struct FieldMapper {
    measurement: String,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new(AIR_QUALITY_MEASUREMENT)
    }
}

impl FieldMapper {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// 映射一条消息，时间戳取报文接收时间（秒）。
    pub fn map(&self, message: &UplinkMessage, received_at_ms: i64) -> MappedPoint {
        let mut point = MetricPoint::new(self.measurement.clone(), received_at_ms.div_euclid(1000));
        point
            .tags
            .insert(DEVICE_TAG.to_string(), message.device_id.clone());

        let mut skipped = Vec::new();
        for (name, value) in &message.fields {
            let field = if name == PM10_FIELD {
                pm10_field_name(&message.device_id)
            } else {
                name.clone()
            };
            match encode_field(&field, *value) {
                Ok(value) => {
                    point.fields.insert(field, value);
                }
                Err(err) => {
                    warn!(
                        target: "aq.normalize",
                        device_id = %message.device_id,
                        error = %err,
                        "field_skipped"
                    );
                    skipped.push(err);
                }
            }
        }

        MappedPoint { point, skipped }
    }
}

/// 设备对应的 pm10 字段名。
pub fn pm10_field_name(device_id: &str) -> String {
    let suffix = PM10_DEVICE_SUFFIXES
        .iter()
        .find(|(device, _)| *device == device_id)
        .map(|(_, suffix)| *suffix)
        .unwrap_or(device_id);
    format!("{}_{}", PM10_FIELD, suffix)
}

// Line Protocol 无法表达 NaN/inf，也无法表达空键、换行或结尾反斜杠。
fn encode_field(field: &str, value: f64) -> Result<f64, MapError> {
    if !is_encodable_key(field) {
        return Err(MapError::UnencodableKey {
            field: field.to_string(),
        });
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MapError::NonFinite {
            field: field.to_string(),
            value,
        })
    }
}
