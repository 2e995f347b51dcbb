//! TTN 上行 → InfluxDB 桥接进程。
//!
//! 订阅 TTN 应用的全部设备上行，按设备映射字段后批量写入 InfluxDB；
//! 同时提供存活探针，并在长时间未连上 broker 时以非零码退出交由平台重启。

mod ingest;

use aq_config::AppConfig;
use aq_ingest::{BrokerSession, BrokerSettings};
use aq_liveness::{Supervisor, Watchdog, WatchdogConfig};
use aq_normalize::FieldMapper;
use aq_sink::{HttpLineTransport, InfluxSink, InfluxSinkConfig, InfluxTarget, PointSink};
use aq_telemetry::init_tracing;
use ingest::UplinkPipelineHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // InfluxDB 写入：后台按批量/周期刷写
    let transport = HttpLineTransport::new(&InfluxTarget {
        url: config.influx_url.clone(),
        token: config.influx_token.clone(),
        org: config.influx_org.clone(),
        bucket: config.influx_bucket.clone(),
    })?;
    let mut sink_config = InfluxSinkConfig::with_host_tag(config.influx_host_tag.clone());
    sink_config.batch_size = config.influx_batch_size;
    sink_config.flush_interval = Duration::from_millis(config.influx_flush_interval_ms);
    sink_config.queue_capacity = config.influx_queue_capacity;
    let sink: Arc<dyn PointSink> = Arc::new(InfluxSink::spawn(Arc::new(transport), sink_config));

    // 进程监督：信号、panic、后台任务失败、看门狗统一收口
    let mut supervisor = Supervisor::new(sink.clone());
    supervisor.install_panic_hook();

    // 存活探针
    let http = tokio::spawn(aq_liveness::http::serve(config.http_addr()));
    supervisor.watch_task("liveness_http", http);

    // TTN 订阅会话
    let session = BrokerSession::new(BrokerSettings {
        uri: config.mqtt_uri.clone(),
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic: config.uplink_topic(),
        liveness_source: config.liveness_source,
    });
    let view = session.view();
    let handler = Arc::new(UplinkPipelineHandler::new(FieldMapper::default(), sink));
    let (session_handle, session_task) = session.spawn(handler)?;
    supervisor.attach_session(session_handle);
    supervisor.watch_task("broker_session", session_task);

    // 看门狗：只读连接状态，触发后交给 Supervisor 退出
    let watchdog = Watchdog::new(
        view,
        WatchdogConfig {
            interval: Duration::from_secs(config.watchdog_interval_seconds),
            threshold: Duration::from_secs(config.watchdog_threshold_seconds),
            policy: config.watchdog_policy,
        },
    );
    watchdog.spawn(supervisor.exit_sender());

    info!(
        target: "aq.bridge",
        http_addr = %config.http_addr(),
        topic = %config.uplink_topic(),
        influx_bucket = %config.influx_bucket,
        "bridge_started"
    );
    supervisor.run().await;
    Ok(())
}
