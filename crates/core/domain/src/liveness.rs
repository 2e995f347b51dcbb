use std::str::FromStr;

/// 看门狗触发条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchdogPolicy {
    /// 仅在已断开且超过阈值时触发。
    #[default]
    DisconnectedOnly,
    /// 只看距上次连接成功的时长，不管当前是否在线。
    Elapsed,
}

impl FromStr for WatchdogPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disconnected" | "disconnected_only" => Ok(Self::DisconnectedOnly),
            "elapsed" | "always" => Ok(Self::Elapsed),
            other => Err(other.to_string()),
        }
    }
}

/// 哪些事件会刷新 `last_connected_at`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessSource {
    /// 只有 broker 握手成功才刷新。
    #[default]
    ConnectOnly,
    /// 握手成功或收到任意上行消息都刷新。
    ConnectOrUplink,
}

impl LivenessSource {
    pub fn from_flag(uplink_refreshes: bool) -> Self {
        if uplink_refreshes {
            Self::ConnectOrUplink
        } else {
            Self::ConnectOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_names() {
        assert_eq!(
            "disconnected".parse::<WatchdogPolicy>(),
            Ok(WatchdogPolicy::DisconnectedOnly)
        );
        assert_eq!("ELAPSED".parse::<WatchdogPolicy>(), Ok(WatchdogPolicy::Elapsed));
        assert!("sometimes".parse::<WatchdogPolicy>().is_err());
    }

    #[test]
    fn liveness_source_from_flag() {
        assert_eq!(LivenessSource::from_flag(false), LivenessSource::ConnectOnly);
        assert_eq!(LivenessSource::from_flag(true), LivenessSource::ConnectOrUplink);
    }
}
