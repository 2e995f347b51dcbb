//! TTN MQTT 上行订阅会话。
//!
//! - [`BrokerSession`]：连接、订阅、固定间隔重连，逐条把消息交给 [`UplinkHandler`]
//! - [`ConnectionState`] / [`ConnectionView`]：会话持有的连接状态与只读视图
//! - [`BrokerSettings`]：broker 地址、凭据、订阅主题

mod broker;
mod session;
mod state;

pub use broker::{BrokerSettings, BrokerUri, CONNECT_TIMEOUT_SECS, KEEP_ALIVE, RECONNECT_PERIOD};
pub use session::{BrokerSession, SessionHandle, session_event_for};
pub use state::{ConnectionState, ConnectionView, SessionEvent, SessionState};

use async_trait::async_trait;
use domain::RawUplink;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid broker uri: {0}")]
    InvalidUri(String),
    #[error("handler error: {0}")]
    Handler(String),
}

/// 上行报文处理器。
#[async_trait]
pub trait UplinkHandler: Send + Sync {
    async fn handle(&self, uplink: RawUplink) -> Result<(), IngestError>;
}
