use crate::broker::{BrokerSettings, RECONNECT_PERIOD};
use crate::state::{ConnectionState, ConnectionView, SessionEvent, SessionState};
use crate::{IngestError, UplinkHandler};
use aq_telemetry::{record_broker_connect, record_broker_disconnect, record_uplink_received};
use domain::{RawUplink, monotonic_ms, now_epoch_ms};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 关闭时等待 DISCONNECT 发出的时长。
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// 会话关闭句柄。
#[derive(Debug, Clone)]
pub struct SessionHandle {
    stop: watch::Sender<bool>,
}

impl SessionHandle {
    /// 请求会话结束（进入 `Ended`）。可重复调用。
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }
}

/// TTN 上行订阅会话。
///
/// 单任务顺序处理：每条消息的解码、映射、入队都在事件循环内 await 完成，
/// 不存在消息间并发。重连由事件循环在出错后按固定间隔重新 poll 完成。
pub struct BrokerSession {
    settings: BrokerSettings,
    state: Arc<ConnectionState>,
}

impl BrokerSession {
    pub fn new(settings: BrokerSettings) -> Self {
        let state = Arc::new(ConnectionState::new(
            settings.liveness_source,
            monotonic_ms(),
        ));
        Self { settings, state }
    }

    /// 连接状态的只读视图（供看门狗使用）。
    pub fn view(&self) -> ConnectionView {
        ConnectionView::new(self.state.clone())
    }

    /// 启动会话任务。连接参数非法时立即返回错误。
    pub fn spawn(
        self,
        handler: Arc<dyn UplinkHandler>,
    ) -> Result<(SessionHandle, JoinHandle<Result<(), IngestError>>), IngestError> {
        let options = self.settings.mqtt_options()?;
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        eventloop.set_network_options(self.settings.network_options());
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(client, eventloop, handler, stop_rx));
        Ok((SessionHandle { stop }, task))
    }

    async fn run(
        self,
        client: AsyncClient,
        mut eventloop: EventLoop,
        handler: Arc<dyn UplinkHandler>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        info!(
            target: "aq.ingest",
            uri = %self.settings.uri,
            topic = %self.settings.topic,
            "broker_session_started"
        );
        self.transition(SessionEvent::ConnectAttempt);

        loop {
            tokio::select! {
                // 句柄被释放同样视为关闭请求
                _ = stop.changed() => break,
                polled = eventloop.poll() => match polled {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        record_uplink_received();
                        self.transition(SessionEvent::UplinkReceived);
                        let uplink = RawUplink {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                            received_at_ms: now_epoch_ms(),
                        };
                        if let Err(err) = handler.handle(uplink).await {
                            warn!(target: "aq.ingest", topic = %publish.topic, error = %err, "uplink_handler_failed");
                        }
                    }
                    Ok(event) => self.on_event(&client, &event),
                    Err(err) => {
                        warn!(target: "aq.ingest", error = %err, "broker_transport_error");
                        self.transition(SessionEvent::TransportError);
                        let lost = if self.state.state() == SessionState::Connected {
                            SessionEvent::Offline
                        } else {
                            SessionEvent::Closed
                        };
                        self.transition(lost);

                        tokio::select! {
                            _ = stop.changed() => break,
                            _ = tokio::time::sleep(RECONNECT_PERIOD) => {}
                        }
                        self.transition(SessionEvent::ConnectAttempt);
                    }
                },
            }
        }

        self.disconnect(&client, &mut eventloop).await;
        self.transition(SessionEvent::Ended);
        Ok(())
    }

    fn on_event(&self, client: &AsyncClient, event: &Event) {
        match session_event_for(event) {
            Some(SessionEvent::Connected) => {
                self.transition(SessionEvent::Connected);
                // 干净会话：每次重连都需要重新订阅
                match client.try_subscribe(self.settings.topic.clone(), QoS::AtLeastOnce) {
                    Ok(()) => {
                        debug!(target: "aq.ingest", topic = %self.settings.topic, "subscribe_requested")
                    }
                    Err(err) => {
                        warn!(target: "aq.ingest", topic = %self.settings.topic, error = %err, "subscribe_request_failed")
                    }
                }
            }
            Some(other) => {
                self.transition(other);
            }
            None => {
                if let Event::Incoming(Packet::SubAck(ack)) = event {
                    if ack
                        .return_codes
                        .iter()
                        .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
                    {
                        info!(target: "aq.ingest", topic = %self.settings.topic, "subscribed");
                    } else {
                        warn!(
                            target: "aq.ingest",
                            topic = %self.settings.topic,
                            codes = ?ack.return_codes,
                            "subscribe_rejected"
                        );
                    }
                }
            }
        }
    }

    fn transition(&self, event: SessionEvent) {
        let before = self.state.state();
        let after = self.state.apply(event, monotonic_ms());
        if event == SessionEvent::Connected && after == SessionState::Connected {
            record_broker_connect();
        }
        if before == SessionState::Connected && after != SessionState::Connected {
            record_broker_disconnect();
        }
        if before != after {
            info!(
                target: "aq.ingest",
                from = before.as_str(),
                to = after.as_str(),
                is_connected = self.state.is_connected(),
                "broker_state_changed"
            );
        }
    }

    /// 尽力发送 DISCONNECT，不阻塞退出。
    async fn disconnect(&self, client: &AsyncClient, eventloop: &mut EventLoop) {
        if self.state.state() != SessionState::Connected {
            return;
        }
        if client.try_disconnect().is_err() {
            return;
        }
        let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }
}

/// 将 rumqttc 事件归类为会话事件；与状态无关的事件返回 `None`。
pub fn session_event_for(event: &Event) -> Option<SessionEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(SessionEvent::Connected),
        Event::Incoming(Packet::Disconnect) => Some(SessionEvent::Closed),
        Event::Incoming(Packet::Publish(_)) => Some(SessionEvent::UplinkReceived),
        Event::Outgoing(Outgoing::Disconnect) => Some(SessionEvent::Ended),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::LivenessSource;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    fn settings(uri: &str) -> BrokerSettings {
        BrokerSettings {
            uri: uri.to_string(),
            username: "app@ttn".to_string(),
            password: "secret".to_string(),
            topic: "v3/app@ttn/devices/+/up".to_string(),
            liveness_source: LivenessSource::ConnectOnly,
        }
    }

    #[test]
    fn classifies_lifecycle_events() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(session_event_for(&connack), Some(SessionEvent::Connected));
        assert_eq!(
            session_event_for(&Event::Incoming(Packet::Disconnect)),
            Some(SessionEvent::Closed)
        );
        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "v3/app@ttn/devices/mkrwan-1/up",
            QoS::AtLeastOnce,
            b"{}".to_vec(),
        )));
        assert_eq!(session_event_for(&publish), Some(SessionEvent::UplinkReceived));
        assert_eq!(session_event_for(&Event::Incoming(Packet::PingResp)), None);
        assert_eq!(session_event_for(&Event::Outgoing(Outgoing::PingReq)), None);
    }

    #[test]
    fn new_session_starts_disconnected() {
        let started = monotonic_ms();
        let session = BrokerSession::new(settings("mqtt://localhost:1883"));
        let view = session.view();
        assert_eq!(view.state(), SessionState::Disconnected);
        assert!(!view.is_connected());
        assert!(view.last_connected_at_ms() >= started);
    }

    #[test]
    fn connack_marks_connected_and_requests_subscribe() {
        let session = BrokerSession::new(settings("mqtt://127.0.0.1:1"));
        let view = session.view();
        let before = view.last_connected_at_ms();
        let options = session.settings.mqtt_options().expect("options");
        // 请求通道容量为 1：订阅请求入队后通道即满
        let (client, _eventloop) = AsyncClient::new(options, 1);
        std::thread::sleep(Duration::from_millis(5));

        session.on_event(
            &client,
            &Event::Incoming(Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::Success,
            })),
        );

        assert_eq!(view.state(), SessionState::Connected);
        assert!(view.is_connected());
        assert!(view.last_connected_at_ms() > before);
        assert!(client.try_subscribe("v3/other@ttn/devices/+/up", QoS::AtMostOnce).is_err());

        session.on_event(&client, &Event::Incoming(Packet::Disconnect));
        assert_eq!(view.state(), SessionState::Closed);
        assert!(!view.is_connected());
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_uri() {
        struct NoopHandler;

        #[async_trait::async_trait]
        impl UplinkHandler for NoopHandler {
            async fn handle(&self, _uplink: RawUplink) -> Result<(), IngestError> {
                Ok(())
            }
        }

        let session = BrokerSession::new(settings("localhost"));
        assert!(matches!(
            session.spawn(Arc::new(NoopHandler)),
            Err(IngestError::InvalidUri(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_ends_session_without_broker() {
        struct NoopHandler;

        #[async_trait::async_trait]
        impl UplinkHandler for NoopHandler {
            async fn handle(&self, _uplink: RawUplink) -> Result<(), IngestError> {
                Ok(())
            }
        }

        // 本地未监听端口：连接失败后进入重连等待
        let session = BrokerSession::new(settings("mqtt://127.0.0.1:1"));
        let view = session.view();
        let (handle, task) = session.spawn(Arc::new(NoopHandler)).expect("spawn");
        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("session ends")
            .expect("join");
        assert!(result.is_ok());
        assert_eq!(view.state(), SessionState::Ended);
        assert!(!view.is_connected());
    }
}
