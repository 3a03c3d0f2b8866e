//! Stream connection manager
//!
//! Owns the lifecycle of the push subscription: connect, STOMP handshake,
//! topic subscription, message demultiplexing into the dashboard store, and
//! indefinite reconnection. The transport sits behind a trait so the
//! reconnect policy and routing are testable without a live broker.

use crate::errors::{DashboardError, Result};
use crate::state::SharedDashboard;
use crate::stomp::Frame;
use crate::telemetry::{ConnectionStatus, LogEvent, MetricsSnapshot};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{RwLock, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const METRICS_TOPIC: &str = "/topic/metrics";
pub const LOGS_TOPIC: &str = "/topic/logs";

const TOPICS: [&str; 2] = [METRICS_TOPIC, LOGS_TOPIC];

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// One demultiplexed message from a subscribed topic.
#[derive(Clone, Debug)]
pub struct TopicMessage {
    pub destination: String,
    pub body: String,
}

/// One established stream session, post-handshake.
#[async_trait]
pub trait StreamSession: Send {
    async fn subscribe(&mut self, destination: &str) -> Result<()>;

    /// Next topic message; `None` means the session ended.
    async fn next_message(&mut self) -> Option<TopicMessage>;

    async fn close(&mut self);
}

/// Transport seam producing connected sessions.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self) -> Result<Box<dyn StreamSession>>;
}

/// Drives the connection state machine and routes inbound messages into the
/// dashboard store. The store is never created or cleared here: buffered
/// history survives reconnects.
pub struct StreamManager {
    transport: Arc<dyn StreamTransport>,
    store: SharedDashboard,
    reconnect_delay: Duration,
    machine: RwLock<StreamState>,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl StreamManager {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        store: SharedDashboard,
        reconnect_delay: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            transport,
            store,
            reconnect_delay,
            machine: RwLock::new(StreamState::Idle),
            status_tx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Connection-status signal for consumers that prefer awaiting changes
    /// over polling the store.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub async fn stream_state(&self) -> StreamState {
        *self.machine.read().await
    }

    /// Request teardown. Idempotent; messages delivered after this point are
    /// ignored.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Connection loop: connect, subscribe, drain messages, reconnect after
    /// a delay, forever, until teardown is requested.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(StreamState::Connecting).await;

            let opened = tokio::select! {
                _ = shutdown.changed() => break,
                opened = self.transport.open() => opened,
            };

            match opened {
                Ok(session) => self.drive_session(session, &mut shutdown).await,
                Err(e) => warn!("Stream connect failed: {}", e),
            }

            if *shutdown.borrow() {
                break;
            }

            self.set_state(StreamState::Disconnected).await;
            self.publish_status(ConnectionStatus::Disconnected).await;

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(StreamState::Idle).await;
        self.publish_status(ConnectionStatus::Disconnected).await;
        info!("Stream manager stopped");
    }

    async fn drive_session(
        &self,
        mut session: Box<dyn StreamSession>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        for topic in TOPICS {
            if let Err(e) = session.subscribe(topic).await {
                warn!("Subscription to {} failed: {}", topic, e);
                session.close().await;
                return;
            }
        }

        self.set_state(StreamState::Connected).await;
        self.publish_status(ConnectionStatus::Connected).await;
        info!("Stream connected, subscribed to {} topics", TOPICS.len());

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    session.close().await;
                    return;
                }
                message = session.next_message() => match message {
                    Some(message) => self.route(message).await,
                    None => {
                        info!("Stream session ended");
                        return;
                    }
                }
            }
        }
    }

    /// Route one topic message into the store. Malformed payloads are
    /// dropped and logged; they never affect the connection or other topics.
    async fn route(&self, message: TopicMessage) {
        if *self.shutdown_rx.borrow() {
            debug!("Ignoring message delivered after teardown");
            return;
        }

        match message.destination.as_str() {
            METRICS_TOPIC => match serde_json::from_str::<MetricsSnapshot>(&message.body) {
                Ok(snapshot) => self.store.write().await.apply_metrics(snapshot),
                Err(e) => warn!("Dropping malformed metrics payload: {}", e),
            },
            LOGS_TOPIC => match serde_json::from_str::<LogEvent>(&message.body) {
                Ok(event) => self.store.write().await.apply_log(event),
                Err(e) => warn!("Dropping malformed log payload: {}", e),
            },
            other => debug!("Message on unexpected destination: {}", other),
        }
    }

    async fn set_state(&self, next: StreamState) {
        let mut machine = self.machine.write().await;
        if *machine != next {
            debug!("Stream state {:?} -> {:?}", *machine, next);
            *machine = next;
        }
    }

    async fn publish_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
        self.store.write().await.set_connection(status);
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live transport over STOMP-on-WebSocket.
pub struct WsTransport {
    url: String,
    host: String,
    handshake_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: String, host: String, handshake_timeout: Duration) -> Self {
        Self {
            url,
            host,
            handshake_timeout,
        }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn open(&self) -> Result<Box<dyn StreamSession>> {
        debug!("Connecting to {}", self.url);

        let (ws, _) = connect_async(self.url.as_str()).await?;
        let mut session = WsSession { ws };
        session.handshake(&self.host, self.handshake_timeout).await?;

        Ok(Box::new(session))
    }
}

struct WsSession {
    ws: WsStream,
}

impl WsSession {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.ws.send(Message::Text(frame.serialize())).await?;
        Ok(())
    }

    async fn handshake(&mut self, host: &str, timeout: Duration) -> Result<()> {
        self.send_frame(Frame::connect(host)).await?;

        tokio::time::timeout(timeout, self.await_connected())
            .await
            .map_err(|_| DashboardError::Transport("STOMP handshake timed out".to_string()))?
    }

    async fn await_connected(&mut self) -> Result<()> {
        while let Some(message) = self.ws.next().await {
            match message? {
                Message::Text(text) => {
                    if is_heartbeat(&text) {
                        continue;
                    }
                    let frame = Frame::parse(&text)?;
                    match frame.command.as_str() {
                        "CONNECTED" => return Ok(()),
                        "ERROR" => {
                            return Err(DashboardError::Transport(format!(
                                "broker rejected connection: {}",
                                frame.header("message").unwrap_or(&frame.body)
                            )));
                        }
                        other => debug!("Ignoring {} frame during handshake", other),
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        Err(DashboardError::Transport(
            "connection closed during handshake".to_string(),
        ))
    }
}

#[async_trait]
impl StreamSession for WsSession {
    async fn subscribe(&mut self, destination: &str) -> Result<()> {
        let id = format!("sub-{}", Uuid::new_v4());
        debug!("Subscribing to {} as {}", destination, id);
        self.send_frame(Frame::subscribe(&id, destination)).await
    }

    async fn next_message(&mut self) -> Option<TopicMessage> {
        loop {
            let message = self.ws.next().await?;
            match message {
                Ok(Message::Text(text)) => {
                    if is_heartbeat(&text) {
                        continue;
                    }
                    match Frame::parse(&text) {
                        Ok(frame) => match frame.command.as_str() {
                            "MESSAGE" => {
                                let destination =
                                    frame.header("destination").map(str::to_string);
                                match destination {
                                    Some(destination) => {
                                        return Some(TopicMessage {
                                            destination,
                                            body: frame.body,
                                        });
                                    }
                                    None => warn!("Dropping MESSAGE frame without destination"),
                                }
                            }
                            "ERROR" => {
                                error!(
                                    "Broker error frame: {}",
                                    frame.header("message").unwrap_or(&frame.body)
                                );
                                return None;
                            }
                            other => debug!("Ignoring {} frame", other),
                        },
                        Err(e) => warn!("Dropping unparseable frame: {}", e),
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket read failed: {}", e);
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.send_frame(Frame::disconnect()).await {
            debug!("DISCONNECT frame not delivered: {}", e);
        }
        if let Err(e) = self.ws.close(None).await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}

/// STOMP heartbeats are bare end-of-line frames.
fn is_heartbeat(text: &str) -> bool {
    text.trim_matches(|c| c == '\n' || c == '\r').is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DashboardState;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct ScriptedSession {
        messages: VecDeque<TopicMessage>,
        hang_when_drained: bool,
        subscriptions: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedSession {
        fn new(messages: Vec<TopicMessage>, hang_when_drained: bool) -> Self {
            Self {
                messages: messages.into(),
                hang_when_drained,
                subscriptions: Arc::new(StdMutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl StreamSession for ScriptedSession {
        async fn subscribe(&mut self, destination: &str) -> Result<()> {
            self.subscriptions
                .lock()
                .unwrap()
                .push(destination.to_string());
            Ok(())
        }

        async fn next_message(&mut self) -> Option<TopicMessage> {
            if let Some(message) = self.messages.pop_front() {
                return Some(message);
            }
            if self.hang_when_drained {
                std::future::pending::<()>().await;
            }
            None
        }

        async fn close(&mut self) {}
    }

    struct ScriptedTransport {
        sessions: StdMutex<VecDeque<ScriptedSession>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(sessions: Vec<ScriptedSession>) -> Self {
            Self {
                sessions: StdMutex::new(sessions.into()),
                opens: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn open(&self) -> Result<Box<dyn StreamSession>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().unwrap().pop_front() {
                Some(session) => Ok(Box::new(session)),
                None => Err(DashboardError::Transport("no session scripted".to_string())),
            }
        }
    }

    fn metrics_message() -> TopicMessage {
        TopicMessage {
            destination: METRICS_TOPIC.to_string(),
            body: r#"{"TotalLogsToday":120,"UsedMemory":52428800,"ErrorLogs":{"auth":2,"billing":1}}"#
                .to_string(),
        }
    }

    fn log_message(sequence: u32) -> TopicMessage {
        TopicMessage {
            destination: LOGS_TOPIC.to_string(),
            body: format!(
                r#"{{"id":"evt-{0}","logLevel":"INFO","serviceName":"auth","message":"event {0}","receivedAt":"2024-03-14T12:00:00Z"}}"#,
                sequence
            ),
        }
    }

    async fn wait_for_logs(store: &SharedDashboard, count: usize) {
        timeout(WAIT, async {
            loop {
                if store.read().await.logs().len() >= count {
                    break;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for log count");
    }

    #[tokio::test]
    async fn test_subscribes_and_routes_both_topics() {
        let session = ScriptedSession::new(vec![metrics_message(), log_message(1)], true);
        let subscriptions = Arc::clone(&session.subscriptions);
        let transport = Arc::new(ScriptedTransport::new(vec![session]));
        let store = DashboardState::shared();
        let manager = Arc::new(StreamManager::new(
            transport,
            Arc::clone(&store),
            Duration::from_millis(10),
        ));

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run().await }
        });

        wait_for_logs(&store, 1).await;

        {
            let state = store.read().await;
            let summary = state.summary();
            assert_eq!(summary.total_logs_today, 120);
            assert_eq!(summary.used_memory_display, "50 MB");
            assert_eq!(summary.services_with_errors, 2);
            assert_eq!(summary.chart_points, 1);
            assert_eq!(summary.latest_value_mb, Some(50.0));
            assert_eq!(state.connection(), ConnectionStatus::Connected);
        }
        assert_eq!(
            *subscriptions.lock().unwrap(),
            vec![METRICS_TOPIC.to_string(), LOGS_TOPIC.to_string()]
        );
        assert_eq!(manager.stream_state().await, StreamState::Connected);

        manager.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_other_topic_and_status_intact() {
        let session = ScriptedSession::new(
            vec![
                TopicMessage {
                    destination: METRICS_TOPIC.to_string(),
                    body: "not json at all".to_string(),
                },
                log_message(1),
            ],
            true,
        );
        let transport = Arc::new(ScriptedTransport::new(vec![session]));
        let store = DashboardState::shared();
        let manager = Arc::new(StreamManager::new(
            transport,
            Arc::clone(&store),
            Duration::from_millis(10),
        ));

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run().await }
        });

        wait_for_logs(&store, 1).await;

        {
            let state = store.read().await;
            assert!(state.metrics().is_none());
            assert_eq!(state.chart().len(), 0);
            assert_eq!(state.logs().len(), 1);
            assert_eq!(state.connection(), ConnectionStatus::Connected);
        }

        manager.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_buffers_survive_reconnect() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedSession::new(vec![log_message(1)], false),
            ScriptedSession::new(vec![log_message(2)], true),
        ]));
        let store = DashboardState::shared();
        let manager = Arc::new(StreamManager::new(
            Arc::clone(&transport) as Arc<dyn StreamTransport>,
            Arc::clone(&store),
            Duration::from_millis(200),
        ));

        let mut status_rx = manager.status();
        let history: Arc<StdMutex<Vec<ConnectionStatus>>> = Arc::new(StdMutex::new(Vec::new()));
        let status_task = tokio::spawn({
            let history = Arc::clone(&history);
            async move {
                while status_rx.changed().await.is_ok() {
                    let status = *status_rx.borrow_and_update();
                    history.lock().unwrap().push(status);
                }
            }
        });

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run().await }
        });

        wait_for_logs(&store, 2).await;

        {
            let state = store.read().await;
            assert_eq!(state.logs().len(), 2);
            assert_eq!(state.logs().front().unwrap().message, "event 2");
            assert_eq!(state.logs().back().unwrap().message, "event 1");
            assert_eq!(state.connection(), ConnectionStatus::Connected);
        }
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);

        // The status signal reflected the gap: Disconnected, then Connected
        timeout(WAIT, async {
            loop {
                {
                    let seen = history.lock().unwrap();
                    let disconnect_at = seen
                        .iter()
                        .position(|s| *s == ConnectionStatus::Disconnected);
                    if let Some(disconnect_at) = disconnect_at {
                        if seen[disconnect_at..].contains(&ConnectionStatus::Connected) {
                            break;
                        }
                    }
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status signal did not reflect Disconnected then Connected");

        manager.shutdown();
        task.await.unwrap();
        status_task.abort();
    }

    #[tokio::test]
    async fn test_reconnects_indefinitely_on_connect_failure() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let store = DashboardState::shared();
        let manager = Arc::new(StreamManager::new(
            Arc::clone(&transport) as Arc<dyn StreamTransport>,
            store,
            Duration::from_millis(1),
        ));

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run().await }
        });

        timeout(WAIT, async {
            while transport.opens.load(Ordering::SeqCst) < 5 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("manager stopped retrying");

        manager.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let session = ScriptedSession::new(Vec::new(), true);
        let transport = Arc::new(ScriptedTransport::new(vec![session]));
        let store = DashboardState::shared();
        let manager = Arc::new(StreamManager::new(
            transport,
            store,
            Duration::from_millis(10),
        ));

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run().await }
        });

        manager.shutdown();
        manager.shutdown();
        task.await.unwrap();

        assert_eq!(manager.stream_state().await, StreamState::Idle);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_messages_after_teardown_are_ignored() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let store = DashboardState::shared();
        let manager = StreamManager::new(transport, Arc::clone(&store), Duration::from_millis(10));

        manager.shutdown();
        manager.route(metrics_message()).await;
        manager.route(log_message(1)).await;

        let state = store.read().await;
        assert!(state.metrics().is_none());
        assert_eq!(state.logs().len(), 0);
        assert_eq!(state.chart().len(), 0);
    }

    #[test]
    fn test_heartbeat_detection() {
        assert!(is_heartbeat("\n"));
        assert!(is_heartbeat("\r\n"));
        assert!(is_heartbeat(""));
        assert!(!is_heartbeat("MESSAGE\n\n\0"));
    }
}
