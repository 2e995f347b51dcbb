use crate::IngestError;
use domain::LivenessSource;
use rumqttc::{MqttOptions, NetworkOptions, Transport};
use std::time::Duration;

/// 固定重连间隔。
pub const RECONNECT_PERIOD: Duration = Duration::from_secs(5);
/// 建连超时（秒）。
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
/// MQTT keepalive。
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// 解析后的 broker 地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUri {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerUri {
    /// 支持 `mqtt://`、`tcp://`（明文，默认 1883）与 `mqtts://`、`ssl://`、`tls://`（TLS，默认 8883）。
    pub fn parse(uri: &str) -> Result<Self, IngestError> {
        let invalid = || IngestError::InvalidUri(uri.to_string());
        let (scheme, rest) = uri.trim().split_once("://").ok_or_else(invalid)?;
        let (tls, default_port) = match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => (false, 1883),
            "mqtts" | "ssl" | "tls" => (true, 8883),
            _ => return Err(invalid()),
        };

        // 去掉路径部分
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
                None if after.is_empty() => default_port,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

/// Broker 会话配置。
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub uri: String,
    pub username: String,
    pub password: String,
    /// 订阅主题，如 `v3/<app>/devices/+/up`。
    pub topic: String,
    pub liveness_source: LivenessSource,
}

impl BrokerSettings {
    /// 构造 rumqttc 连接参数（每次生成新的 client_id）。
    pub fn mqtt_options(&self) -> Result<MqttOptions, IngestError> {
        let uri = BrokerUri::parse(&self.uri)?;
        let client_id = format!("aq-bridge-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, uri.host, uri.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_credentials(self.username.clone(), self.password.clone());
        if uri.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        Ok(options)
    }

    pub fn network_options(&self) -> NetworkOptions {
        let mut network = NetworkOptions::new();
        network.set_connection_timeout(CONNECT_TIMEOUT_SECS);
        network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tls_uri_with_port() {
        let uri = BrokerUri::parse("mqtts://eu1.cloud.thethings.network:8883").expect("uri");
        assert_eq!(
            uri,
            BrokerUri {
                host: "eu1.cloud.thethings.network".to_string(),
                port: 8883,
                tls: true,
            }
        );
    }

    #[test]
    fn applies_default_ports() {
        let plain = BrokerUri::parse("mqtt://localhost").expect("uri");
        assert_eq!((plain.port, plain.tls), (1883, false));
        let tls = BrokerUri::parse("ssl://broker.example.com/").expect("uri");
        assert_eq!((tls.host.as_str(), tls.port, tls.tls), ("broker.example.com", 8883, true));
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let uri = BrokerUri::parse("tcp://[::1]:1884").expect("uri");
        assert_eq!(uri.host, "::1");
        assert_eq!(uri.port, 1884);
    }

    #[test]
    fn rejects_bad_uris() {
        for bad in ["localhost:1883", "http://host", "mqtt://", "mqtt://host:port"] {
            assert!(
                matches!(BrokerUri::parse(bad), Err(IngestError::InvalidUri(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn options_carry_keepalive_and_credentials() {
        let settings = BrokerSettings {
            uri: "mqtt://localhost:1883".to_string(),
            username: "app@ttn".to_string(),
            password: "secret".to_string(),
            topic: "v3/app@ttn/devices/+/up".to_string(),
            liveness_source: LivenessSource::ConnectOnly,
        };
        let options = settings.mqtt_options().expect("options");
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
        assert_eq!(
            options.credentials(),
            Some(("app@ttn".to_string(), "secret".to_string()))
        );
        assert!(options.client_id().starts_with("aq-bridge-"));
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }
}
