//! Broker 会话连接状态机。
//!
//! ```text
//! Disconnected → Connecting → Connected ⇄ Offline/Closed → Connecting → … → Ended
//! ```
//!
//! 状态只由会话事件推进（[`ConnectionState::apply`]）；看门狗通过只读的
//! [`ConnectionView`] 读取，读写均为无锁原子操作。时间戳取自
//! [`domain::monotonic_ms`]，不随系统时间跳变。

use domain::LivenessSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};

/// 会话状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Offline = 3,
    Closed = 4,
    /// 终态，仅在显式关闭时进入。
    Ended = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Offline,
            4 => Self::Closed,
            5 => Self::Ended,
            _ => Self::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Offline => "offline",
            Self::Closed => "closed",
            Self::Ended => "ended",
        }
    }
}

/// 会话事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// 发起（重）连接。
    ConnectAttempt,
    /// 收到 CONNACK。
    Connected,
    /// 收到上行消息。
    UplinkReceived,
    /// 连接中断（网络丢失）。
    Offline,
    /// 连接关闭（broker 断开或连接失败）。
    Closed,
    /// 显式关闭。
    Ended,
    /// 传输层错误，仅记录，不改变状态。
    TransportError,
}

/// 连接状态（会话持有，看门狗只读）。
#[derive(Debug)]
pub struct ConnectionState {
    state: AtomicU8,
    is_connected: AtomicBool,
    last_connected_at_ms: AtomicI64,
    liveness_source: LivenessSource,
}

impl ConnectionState {
    /// `started_at_ms` 作为初始 `last_connected_at`，避免启动即被看门狗判定超时。
    pub fn new(liveness_source: LivenessSource, started_at_ms: i64) -> Self {
        Self {
            state: AtomicU8::new(SessionState::Disconnected as u8),
            is_connected: AtomicBool::new(false),
            last_connected_at_ms: AtomicI64::new(started_at_ms),
            liveness_source,
        }
    }

    /// 应用一个事件，返回事件后的状态。`Ended` 之后的事件一律忽略。
    pub fn apply(&self, event: SessionEvent, now_ms: i64) -> SessionState {
        let current = self.state();
        if current == SessionState::Ended {
            return current;
        }
        let next = match event {
            SessionEvent::ConnectAttempt => SessionState::Connecting,
            SessionEvent::Connected => {
                self.last_connected_at_ms.store(now_ms, Ordering::Release);
                self.is_connected.store(true, Ordering::Release);
                SessionState::Connected
            }
            SessionEvent::UplinkReceived => {
                if self.liveness_source == LivenessSource::ConnectOrUplink {
                    self.last_connected_at_ms.store(now_ms, Ordering::Release);
                }
                current
            }
            SessionEvent::Offline => {
                self.is_connected.store(false, Ordering::Release);
                SessionState::Offline
            }
            SessionEvent::Closed => {
                self.is_connected.store(false, Ordering::Release);
                SessionState::Closed
            }
            SessionEvent::Ended => {
                self.is_connected.store(false, Ordering::Release);
                SessionState::Ended
            }
            SessionEvent::TransportError => current,
        };
        self.state.store(next as u8, Ordering::Release);
        next
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    pub fn last_connected_at_ms(&self) -> i64 {
        self.last_connected_at_ms.load(Ordering::Acquire)
    }
}

/// 连接状态的只读视图。
#[derive(Debug, Clone)]
pub struct ConnectionView {
    inner: Arc<ConnectionState>,
}

impl ConnectionView {
    pub fn new(inner: Arc<ConnectionState>) -> Self {
        Self { inner }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn last_connected_at_ms(&self) -> i64 {
        self.inner.last_connected_at_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_MS: i64 = 1_000_000;

    #[test]
    fn starts_disconnected_with_start_time() {
        let state = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        assert_eq!(state.state(), SessionState::Disconnected);
        assert!(!state.is_connected());
        assert_eq!(state.last_connected_at_ms(), START_MS);
    }

    #[test]
    fn connect_refreshes_and_close_keeps_timestamp() {
        let state = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        state.apply(SessionEvent::ConnectAttempt, START_MS + 10);
        assert_eq!(state.state(), SessionState::Connecting);

        state.apply(SessionEvent::Connected, START_MS + 20);
        assert!(state.is_connected());
        assert_eq!(state.last_connected_at_ms(), START_MS + 20);

        state.apply(SessionEvent::Closed, START_MS + 30);
        assert!(!state.is_connected());
        assert_eq!(state.state(), SessionState::Closed);
        assert_eq!(state.last_connected_at_ms(), START_MS + 20);
    }

    #[test]
    fn offline_clears_connected_flag() {
        let state = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        state.apply(SessionEvent::Connected, START_MS + 1);
        state.apply(SessionEvent::Offline, START_MS + 2);
        assert!(!state.is_connected());
        assert_eq!(state.state(), SessionState::Offline);
        assert_eq!(state.last_connected_at_ms(), START_MS + 1);

        state.apply(SessionEvent::ConnectAttempt, START_MS + 3);
        state.apply(SessionEvent::Connected, START_MS + 4);
        assert!(state.is_connected());
        assert_eq!(state.last_connected_at_ms(), START_MS + 4);
    }

    #[test]
    fn transport_error_changes_nothing() {
        let state = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        state.apply(SessionEvent::Connected, START_MS + 1);
        let after = state.apply(SessionEvent::TransportError, START_MS + 2);
        assert_eq!(after, SessionState::Connected);
        assert!(state.is_connected());
        assert_eq!(state.last_connected_at_ms(), START_MS + 1);
    }

    #[test]
    fn uplink_refreshes_only_when_configured() {
        let connect_only = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        connect_only.apply(SessionEvent::Connected, START_MS + 1);
        connect_only.apply(SessionEvent::UplinkReceived, START_MS + 500);
        assert_eq!(connect_only.last_connected_at_ms(), START_MS + 1);

        let with_uplinks = ConnectionState::new(LivenessSource::ConnectOrUplink, START_MS);
        with_uplinks.apply(SessionEvent::Connected, START_MS + 1);
        with_uplinks.apply(SessionEvent::UplinkReceived, START_MS + 500);
        assert_eq!(with_uplinks.last_connected_at_ms(), START_MS + 500);
        assert_eq!(with_uplinks.state(), SessionState::Connected);
    }

    #[test]
    fn ended_is_terminal() {
        let state = ConnectionState::new(LivenessSource::ConnectOnly, START_MS);
        state.apply(SessionEvent::Connected, START_MS + 1);
        state.apply(SessionEvent::Ended, START_MS + 2);
        assert!(!state.is_connected());

        assert_eq!(
            state.apply(SessionEvent::Connected, START_MS + 3),
            SessionState::Ended
        );
        assert!(!state.is_connected());
        assert_eq!(state.last_connected_at_ms(), START_MS + 1);
    }

    #[test]
    fn view_reads_shared_state() {
        let state = Arc::new(ConnectionState::new(LivenessSource::ConnectOnly, START_MS));
        let view = ConnectionView::new(state.clone());
        assert!(!view.is_connected());
        state.apply(SessionEvent::Connected, START_MS + 7);
        assert!(view.is_connected());
        assert_eq!(view.last_connected_at_ms(), START_MS + 7);
        assert_eq!(view.state().as_str(), "connected");
    }
}
