use std::collections::BTreeMap;

/// MQTT 收到的原始上行报文。
#[derive(Debug, Clone)]
pub struct RawUplink {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

impl RawUplink {
    /// 按当前时间构造原始报文。
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at_ms: now_epoch_ms(),
        }
    }
}

/// 解码后的上行消息（单条报文，处理完即丢弃）。
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkMessage {
    pub device_id: String,
    /// decoded_payload 中所有数值型顶层字段。
    pub fields: BTreeMap<String, f64>,
}

impl UplinkMessage {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// 追加一个数值字段（测试与构造便捷方法）。
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// 一次时序写入单元：measurement + tags + fields + 秒级时间戳。
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp_s: i64,
}

impl MetricPoint {
    pub fn new(measurement: impl Into<String>, timestamp_s: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_s,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }
}

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}

/// 进程内单调时钟（毫秒），起点为首次调用。
///
/// 只用于计算时长，不受系统时间校正影响；不可与 [`now_epoch_ms`] 混用。
pub fn monotonic_ms() -> i64 {
    static ORIGIN: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let origin = ORIGIN.get_or_init(std::time::Instant::now);
    i64::try_from(origin.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// 能否原样作为 Line Protocol 的键或标签值。
///
/// 要求非空、不含控制字符、不以反斜杠结尾；逗号、等号、空格由编码端转义。
pub fn is_encodable_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(char::is_control) && !key.ends_with('\\')
}
