//! InfluxDB v2 Line Protocol 编码。
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_s
//! ```
//!
//! 写入精度固定为秒（请求参数 `precision=s`）。

use crate::SinkError;
use domain::{MetricPoint, is_encodable_key};
use std::collections::BTreeMap;

/// 将点位编码为一行 Line Protocol。
///
/// `default_tags` 会合并进点位自身的标签，同名时以点位标签为准；
/// 空值标签会被丢弃（InfluxDB 不接受空 tag value）。含换行等无法转义内容的
/// 标签或字段键使整行被拒绝，避免污染同批次的其他行。
pub fn encode_point(
    point: &MetricPoint,
    default_tags: &BTreeMap<String, String>,
) -> Result<String, SinkError> {
    if point.fields.is_empty() {
        return Err(SinkError::NoFields(point.measurement.clone()));
    }

    let mut line = escape_measurement(&point.measurement);

    let mut tags = default_tags.clone();
    tags.extend(point.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in tags.iter().filter(|(_, value)| !value.is_empty()) {
        if !is_encodable_key(key) || !is_encodable_key(value) {
            return Err(SinkError::InvalidTag(key.clone()));
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        if !value.is_finite() || !is_encodable_key(key) {
            return Err(SinkError::InvalidField(key.clone()));
        }
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_string());
    }

    line.push(' ');
    line.push_str(&point.timestamp_s.to_string());
    Ok(line)
}

/// measurement 中逗号与空格需转义。
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// tag key / tag value / field key 中逗号、等号、空格需转义。
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
