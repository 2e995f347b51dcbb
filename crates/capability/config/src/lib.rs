//! 桥接进程运行配置加载。

use domain::{LivenessSource, WatchdogPolicy};
use std::env;
use std::ops::RangeInclusive;

const MAX_BATCH_SIZE: u64 = 100_000;
const MAX_QUEUE_CAPACITY: u64 = 1_000_000;
const MAX_FLUSH_INTERVAL_MS: u64 = 60 * 60 * 1000;
const MAX_WATCHDOG_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub mqtt_uri: String,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub ttn_application_id: String,
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_host_tag: String,
    pub influx_batch_size: usize,
    /// 待写队列上限，满时新点位被丢弃。
    pub influx_queue_capacity: usize,
    pub influx_flush_interval_ms: u64,
    pub watchdog_interval_seconds: u64,
    pub watchdog_threshold_seconds: u64,
    pub watchdog_policy: WatchdogPolicy,
    pub liveness_source: LivenessSource,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_uri = read_required("TTN_MQTT_URI")?;
        let mqtt_username = read_required("TTN_MQTT_USERNAME")?;
        let mqtt_password = read_required("TTN_MQTT_PASSWORD")?;
        // TTN 的用户名即 `<app-id>@ttn`，默认直接作为 topic 中的应用段
        let ttn_application_id =
            read_optional("TTN_APPLICATION_ID").unwrap_or_else(|| mqtt_username.clone());
        let influx_url = read_required("INFLUX_URL")?;
        let influx_token = read_required("INFLUX_TOKEN")?;
        let influx_org = read_required("INFLUX_ORG")?;
        let influx_bucket = read_required("INFLUX_BUCKET")?;
        let influx_host_tag =
            read_optional("INFLUX_HOST_TAG").unwrap_or_else(|| "render-ttn".to_string());
        let influx_batch_size =
            read_u64_in_range("INFLUX_BATCH_SIZE", 500, 1..=MAX_BATCH_SIZE)? as usize;
        let influx_queue_capacity =
            read_u64_in_range("INFLUX_QUEUE_CAPACITY", 10_000, 1..=MAX_QUEUE_CAPACITY)? as usize;
        let influx_flush_interval_ms =
            read_u64_in_range("INFLUX_FLUSH_INTERVAL_MS", 1000, 1..=MAX_FLUSH_INTERVAL_MS)?;
        let http_port = read_u16_with_default("PORT", 10000)?;
        let watchdog_interval_seconds =
            read_u64_in_range("WATCHDOG_INTERVAL_SECONDS", 30, 1..=MAX_WATCHDOG_INTERVAL_SECONDS)?;
        let watchdog_threshold_seconds =
            read_u64_with_default("WATCHDOG_THRESHOLD_SECONDS", 300)?;
        let watchdog_policy = match read_optional("WATCHDOG_POLICY") {
            Some(value) => value
                .parse::<WatchdogPolicy>()
                .map_err(|_| ConfigError::Invalid("WATCHDOG_POLICY".to_string(), value))?,
            None => WatchdogPolicy::default(),
        };
        let liveness_source =
            LivenessSource::from_flag(read_bool_with_default("WATCHDOG_UPLINK_REFRESHES", false));

        Ok(Self {
            http_port,
            mqtt_uri,
            mqtt_username,
            mqtt_password,
            ttn_application_id,
            influx_url,
            influx_token,
            influx_org,
            influx_bucket,
            influx_host_tag,
            influx_batch_size,
            influx_queue_capacity,
            influx_flush_interval_ms,
            watchdog_interval_seconds,
            watchdog_threshold_seconds,
            watchdog_policy,
            liveness_source,
        })
    }

    /// 存活探针监听地址。
    pub fn http_addr(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }

    /// TTN 上行订阅主题。
    pub fn uplink_topic(&self) -> String {
        format!("v3/{}/devices/+/up", self.ttn_application_id)
    }
}

fn read_required(key: &str) -> Result<String, ConfigError> {
    read_optional(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_in_range(
    key: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(key.to_string(), value.to_string()))
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
