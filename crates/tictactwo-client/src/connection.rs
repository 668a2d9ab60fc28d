// crates/tictactwo-client/src/connection.rs

//! Broker session lifecycle.
//!
//! A [`ConnectionManager`] is a cheap handle onto one driver task that
//! owns the transport. The driver:
//! - performs the `connect` handshake within `connect_timeout`,
//! - forwards subscribe / unsubscribe / send frames,
//! - routes inbound `message` frames to per-topic sinks,
//! - sends heartbeats and drops half-open connections,
//! - reconnects after a fixed delay until `disconnect()`.
//!
//! Subscriptions are not carried across a reconnect. Consumers watch
//! [`SessionEvent::Connected`] and subscribe again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tictactwo_protocol::{ClientFrame, ConnectionPurpose, ProtocolError, ServerFrame};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result, TransportErrorKind};
use crate::transport::{handshake, Connector, Handshake, Transport};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    /// Opening, handshaking, or waiting to retry.
    Connecting,
    Connected,
}

/// Lifecycle notifications. Every `events()` receiver sees all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    /// The live session dropped; a retry follows.
    ConnectionLost,
    Reconnecting { attempt: u32, delay: Duration },
    /// `disconnect()` completed.
    Disconnected,
    Error(TransportErrorKind),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One inbound message on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub body: String,
}

pub type DeliverySink = mpsc::UnboundedSender<Delivery>;

struct Subscription {
    id: SubscriptionId,
    sink: DeliverySink,
}

enum Command {
    Frame(ClientFrame),
    Shutdown,
}

struct Driver {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    identity: Mutex<Option<String>>,
    status: watch::Sender<TransportStatus>,
    events: broadcast::Sender<SessionEvent>,
    subscriptions: DashMap<String, Subscription>,
    next_subscription: AtomicU64,
    connected_at: Mutex<Option<DateTime<Utc>>>,
    driver: Mutex<Option<Driver>>,
}

/// Handle onto one broker session. Clones share the session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, config: ConnectionConfig) -> Self {
        let (status, _) = watch::channel(TransportStatus::Disconnected);
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                identity: Mutex::new(None),
                status,
                events,
                subscriptions: DashMap::new(),
                next_subscription: AtomicU64::new(1),
                connected_at: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Start the session. No-op while connecting or connected.
    ///
    /// Must be called from within a tokio runtime. Failures are reported
    /// through [`SessionEvent::Error`] and retried.
    pub fn connect(&self, identity: impl Into<String>, purpose: ConnectionPurpose) {
        let mut driver = lock(&self.inner.driver);
        if driver.is_some() {
            info!("connect() ignored: session already active");
            return;
        }

        let hello = Handshake {
            identity: identity.into(),
            purpose,
        };
        *lock(&self.inner.identity) = Some(hello.identity.clone());
        self.inner.status.send_replace(TransportStatus::Connecting);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_driver(self.inner.clone(), hello, rx));
        *driver = Some(Driver { commands: tx, task });
    }

    /// Unsubscribe everything, close the transport and stop retrying.
    pub async fn disconnect(&self) {
        let driver = lock(&self.inner.driver).take();
        let Some(driver) = driver else {
            debug!("disconnect() ignored: no active session");
            return;
        };

        let _ = driver.commands.send(Command::Shutdown);
        if let Err(e) = driver.task.await {
            error!("Connection driver ended abnormally: {}", e);
        }

        self.inner.subscriptions.clear();
        *lock(&self.inner.connected_at) = None;
        self.inner.status.send_replace(TransportStatus::Disconnected);
        self.inner.emit(SessionEvent::Disconnected);
        info!("Disconnected");
    }

    /// Route `topic` to `sink`. Re-subscribing returns the existing id
    /// and keeps the original sink.
    pub fn subscribe(&self, topic: &str, sink: DeliverySink) -> Result<SubscriptionId> {
        if self.status() != TransportStatus::Connected {
            warn!("Cannot subscribe to {}: not connected", topic);
            return Err(ClientError::NotConnected);
        }
        self.register(topic, sink)
    }

    fn register(&self, topic: &str, sink: DeliverySink) -> Result<SubscriptionId> {
        let id = match self.inner.subscriptions.entry(topic.to_string()) {
            Entry::Occupied(existing) => {
                debug!("Already subscribed to {}", topic);
                return Ok(existing.get().id);
            }
            Entry::Vacant(slot) => {
                let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
                slot.insert(Subscription { id, sink });
                id
            }
        };

        // The driver flips the status before clearing the registry, so an
        // entry that outlived a clear is caught here.
        if self.status() != TransportStatus::Connected {
            self.inner
                .subscriptions
                .remove_if(topic, |_, sub| sub.id == id);
            warn!("Cannot subscribe to {}: session dropped", topic);
            return Err(ClientError::NotConnected);
        }

        let frame = ClientFrame::Subscribe {
            id: id.0,
            topic: topic.to_string(),
        };
        if let Err(e) = self.inner.send_command(Command::Frame(frame)) {
            self.inner.subscriptions.remove(topic);
            return Err(e);
        }
        debug!("Subscribed to {} as {}", topic, id);
        Ok(id)
    }

    /// Stop routing `topic`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let Some((_, sub)) = self.inner.subscriptions.remove(topic) else {
            return false;
        };
        if self.status() == TransportStatus::Connected {
            let _ = self
                .inner
                .send_command(Command::Frame(ClientFrame::Unsubscribe { id: sub.id.0 }));
        }
        debug!("Unsubscribed from {}", topic);
        true
    }

    pub fn publish(&self, destination: &str, body: impl Into<String>) -> Result<()> {
        if self.status() != TransportStatus::Connected {
            warn!("Cannot publish to {}: not connected", destination);
            return Err(ClientError::NotConnected);
        }
        self.inner.send_command(Command::Frame(ClientFrame::Send {
            destination: destination.to_string(),
            body: body.into(),
        }))
    }

    pub fn status(&self) -> TransportStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<TransportStatus> {
        self.inner.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Currently subscribed topics, sorted.
    pub fn active_subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.inner.identity).clone()
    }

    #[cfg(test)]
    pub(crate) fn force_status(&self, status: TransportStatus) {
        self.inner.status.send_replace(status);
    }

    /// Wall-clock time the current session was established.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.inner.connected_at)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn send_command(&self, command: Command) -> Result<()> {
        let driver = lock(&self.driver);
        let driver = driver.as_ref().ok_or(ClientError::NotConnected)?;
        driver
            .commands
            .send(command)
            .map_err(|_| ClientError::NotConnected)
    }

    fn on_connected(&self) {
        *lock(&self.connected_at) = Some(Utc::now());
        self.status.send_replace(TransportStatus::Connected);
        self.emit(SessionEvent::Connected);
    }

    fn on_lost(&self, kind: TransportErrorKind) {
        self.status.send_replace(TransportStatus::Connecting);
        self.subscriptions.clear();
        *lock(&self.connected_at) = None;
        self.emit(SessionEvent::Error(kind));
        self.emit(SessionEvent::ConnectionLost);
    }

    fn deliver(&self, subscription: u64, topic: String, body: String) {
        let Some(sub) = self.subscriptions.get(&topic) else {
            debug!("Dropping message on unsubscribed topic {}", topic);
            return;
        };
        if sub.id.0 != subscription {
            debug!("Dropping message for stale subscription {} on {}", subscription, topic);
            return;
        }
        if sub.sink.send(Delivery { topic, body }).is_err() {
            debug!("Subscriber for {} has gone away", sub.id);
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(TransportErrorKind),
}

async fn run_driver(
    inner: Arc<Inner>,
    hello: Handshake,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut attempt: u32 = 0;

    loop {
        let started = Instant::now();
        info!("Connecting as {} ({:?})", hello.identity, hello.purpose);

        let opened = tokio::select! {
            opened = open(inner.connector.as_ref(), &hello, inner.config.connect_timeout) => opened,
            _ = until_shutdown(&mut commands) => return,
        };

        match opened {
            Ok((transport, session)) => {
                info!(
                    "Connected as {} (session {}) in {:?}",
                    hello.identity,
                    session,
                    started.elapsed()
                );
                attempt = 0;
                inner.on_connected();

                match run_session(&inner, transport, &mut commands).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Lost(kind) => {
                        warn!("Connection lost ({})", kind);
                        inner.on_lost(kind);
                    }
                }
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                inner.emit(SessionEvent::Error(TransportErrorKind::ConnectFailed));
            }
        }

        attempt = attempt.saturating_add(1);
        let delay = inner.config.reconnect_delay;
        info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        inner.emit(SessionEvent::Reconnecting { attempt, delay });

        tokio::select! {
            _ = sleep(delay) => {}
            _ = until_shutdown(&mut commands) => return,
        }
    }
}

async fn open(
    connector: &dyn Connector,
    hello: &Handshake,
    limit: Duration,
) -> Result<(Box<dyn Transport>, String)> {
    let attempt = async {
        let mut transport = connector.connect().await?;
        let session = handshake(transport.as_mut(), hello).await?;
        Ok::<_, ClientError>((transport, session))
    };
    if limit.is_zero() {
        return attempt.await;
    }
    timeout(limit, attempt).await.map_err(|_| {
        ClientError::Transport(format!("no handshake reply within {:?}", limit))
    })?
}

/// Resolves on shutdown. Frames queued while no session is live are dropped.
async fn until_shutdown(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Frame(frame) => debug!("Dropping {:?}: no live session", frame),
            Command::Shutdown => return,
        }
    }
}

async fn run_session(
    inner: &Inner,
    mut transport: Box<dyn Transport>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    let mut outgoing = heartbeat(inner.config.heartbeat_outgoing);
    let watchdog = inner.config.heartbeat_incoming * 3;
    let mut last_inbound = tokio::time::Instant::now();

    let end = loop {
        let deadline = last_inbound + watchdog;

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(frame)) => {
                    if let Err(e) = transport.send(frame).await {
                        warn!("Send failed: {}", e);
                        break SessionEnd::Lost(TransportErrorKind::Dropped);
                    }
                }
                Some(Command::Shutdown) | None => {
                    shutdown(inner, transport.as_mut()).await;
                    break SessionEnd::Shutdown;
                }
            },

            frame = transport.recv() => match frame {
                Some(Ok(frame)) => {
                    last_inbound = tokio::time::Instant::now();
                    match frame {
                        ServerFrame::Message { subscription, topic, body } => {
                            inner.deliver(subscription, topic, body);
                        }
                        ServerFrame::Heartbeat => trace!("Heartbeat from broker"),
                        ServerFrame::Connected { session } => {
                            debug!("Unexpected connected frame for session {}", session);
                        }
                        ServerFrame::Error { message } => {
                            error!("Broker error: {}", message);
                            break SessionEnd::Lost(TransportErrorKind::Broker);
                        }
                    }
                }
                Some(Err(ClientError::Protocol(ProtocolError::Json(e)))) => {
                    warn!("Skipping undecodable frame: {}", e);
                }
                Some(Err(e)) => {
                    warn!("Receive failed: {}", e);
                    break SessionEnd::Lost(TransportErrorKind::Dropped);
                }
                None => {
                    info!("Broker closed the connection");
                    break SessionEnd::Lost(TransportErrorKind::Dropped);
                }
            },

            _ = tick(&mut outgoing) => {
                if let Err(e) = transport.send(ClientFrame::Heartbeat).await {
                    warn!("Heartbeat failed: {}", e);
                    break SessionEnd::Lost(TransportErrorKind::Dropped);
                }
            }

            _ = sleep_until(deadline), if !watchdog.is_zero() => {
                warn!("No inbound frame for {:?}", watchdog);
                break SessionEnd::Lost(TransportErrorKind::HeartbeatTimeout);
            }
        }
    };

    if let SessionEnd::Lost(_) = end {
        if let Err(e) = transport.close().await {
            debug!("Close after drop failed: {}", e);
        }
    }
    end
}

async fn shutdown(inner: &Inner, transport: &mut dyn Transport) {
    let ids: Vec<u64> = inner.subscriptions.iter().map(|entry| entry.id.0).collect();
    for id in ids {
        if transport.send(ClientFrame::Unsubscribe { id }).await.is_err() {
            break;
        }
    }
    let _ = transport.send(ClientFrame::Disconnect).await;
    if let Err(e) = transport.close().await {
        debug!("Close failed: {}", e);
    }
}

fn heartbeat(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBroker, MemoryConnector, MemoryRemote};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            reconnect_delay: Duration::from_millis(20),
            heartbeat_outgoing: Duration::ZERO,
            heartbeat_incoming: Duration::ZERO,
            connect_timeout: Duration::ZERO,
            event_channel_capacity: 64,
        }
    }

    fn manager() -> (ConnectionManager, MemoryBroker) {
        let (connector, broker) = MemoryConnector::new();
        (ConnectionManager::new(Arc::new(connector), config()), broker)
    }

    async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn wait_for(events: &mut broadcast::Receiver<SessionEvent>, wanted: SessionEvent) {
        loop {
            if next_event(events).await == wanted {
                return;
            }
        }
    }

    async fn accept(broker: &mut MemoryBroker) -> MemoryRemote {
        let mut remote = timeout(Duration::from_secs(2), broker.accept())
            .await
            .unwrap()
            .unwrap();
        // Consume the connect frame.
        remote.next_frame().await.unwrap();
        remote
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let (conn, _broker) = manager();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            conn.subscribe("/topic/public", tx),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            conn.publish("/app/joinRoom", "{}"),
            Err(ClientError::NotConnected)
        ));
        assert_eq!(conn.status(), TransportStatus::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_noop() {
        let (conn, _broker) = manager();
        let mut events = conn.events();
        conn.disconnect().await;
        assert!(events.try_recv().is_err());
        assert_eq!(conn.status(), TransportStatus::Disconnected);
    }

    #[tokio::test]
    async fn resubscribe_is_idempotent() {
        let (conn, mut broker) = manager();
        let mut events = conn.events();
        conn.connect("alice", ConnectionPurpose::Player);
        conn.connect("alice", ConnectionPurpose::Player);
        let mut remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;
        assert_eq!(remote.identity(), Some("alice"));
        assert!(conn.connected_at().is_some());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = conn.subscribe("/topic/public", tx.clone()).unwrap();
        let second = conn.subscribe("/topic/public", tx).unwrap();
        assert_eq!(first, second);
        assert_eq!(conn.active_subscriptions(), vec!["/topic/public".to_string()]);

        remote.expect_subscribe("/topic/public").await.unwrap();
        assert!(remote.publish("/topic/public", r#"{"type":"active_players","count":1}"#));
        let delivery = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(delivery.topic, "/topic/public");
        assert!(rx.try_recv().is_err());

        // Only one subscribe frame was ever sent.
        conn.publish("/app/joinRoom", r#"{"roomId":null}"#).unwrap();
        let frame = remote.next_frame().await.unwrap();
        assert!(matches!(frame, ClientFrame::Send { .. }));
    }

    #[tokio::test]
    async fn reconnect_clears_subscriptions() {
        let (conn, mut broker) = manager();
        let mut events = conn.events();
        conn.connect("alice", ConnectionPurpose::Player);
        let remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        conn.subscribe("/topic/room/r1", tx).unwrap();

        remote.hang_up();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Error(TransportErrorKind::Dropped)
        );
        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionLost);
        assert!(conn.active_subscriptions().is_empty());
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Reconnecting { attempt: 1, .. }
        ));

        let mut remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;
        assert!(conn.active_subscriptions().is_empty());
        assert!(!remote.subscribed("/topic/room/r1"));

        conn.disconnect().await;
        assert!(matches!(remote.next_frame().await, Some(ClientFrame::Disconnect)));
    }

    #[tokio::test]
    async fn failed_attempts_are_retried() {
        let (conn, mut broker) = manager();
        broker.fail_next(2);
        let mut events = conn.events();
        conn.connect("bob", ConnectionPurpose::Player);

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Error(TransportErrorKind::ConnectFailed)
        );
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Reconnecting { attempt: 1, .. }
        ));
        wait_for(&mut events, SessionEvent::Connected).await;
        let _remote = accept(&mut broker).await;
        assert_eq!(conn.status(), TransportStatus::Connected);
    }

    #[tokio::test]
    async fn disconnect_unsubscribes_and_stops() {
        let (conn, mut broker) = manager();
        let mut events = conn.events();
        conn.connect("carol", ConnectionPurpose::Player);
        let mut remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let id = conn.subscribe("/topic/public", tx).unwrap();
        remote.expect_subscribe("/topic/public").await.unwrap();

        conn.disconnect().await;
        assert_eq!(
            remote.next_frame().await,
            Some(ClientFrame::Unsubscribe { id: id.0 })
        );
        assert_eq!(remote.next_frame().await, Some(ClientFrame::Disconnect));
        wait_for(&mut events, SessionEvent::Disconnected).await;
        assert_eq!(conn.status(), TransportStatus::Disconnected);
        assert!(conn.active_subscriptions().is_empty());

        // A second disconnect emits nothing.
        conn.disconnect().await;
        assert!(events.try_recv().is_err());
    }

    /// Accepts the connection but never answers the handshake.
    struct MuteConnector {
        attempts: Arc<AtomicU32>,
    }

    struct MuteTransport;

    #[async_trait]
    impl Transport for MuteTransport {
        async fn send(&mut self, _frame: ClientFrame) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<ServerFrame>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for MuteConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MuteTransport))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_handshake_is_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let conn = ConnectionManager::new(
            Arc::new(MuteConnector {
                attempts: attempts.clone(),
            }),
            ConnectionConfig {
                connect_timeout: Duration::from_millis(300),
                ..config()
            },
        );
        let mut events = conn.events();
        conn.connect("erin", ConnectionPurpose::Player);

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Error(TransportErrorKind::ConnectFailed)
        );
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Reconnecting { attempt: 1, .. }
        ));
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Error(TransportErrorKind::ConnectFailed)
        );
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert_eq!(conn.status(), TransportStatus::Connecting);

        conn.disconnect().await;
        assert_eq!(conn.status(), TransportStatus::Disconnected);
    }

    #[tokio::test]
    async fn subscription_racing_a_drop_is_rolled_back() {
        let (conn, mut broker) = manager();
        let mut events = conn.events();
        conn.connect("frank", ConnectionPurpose::Player);
        let _remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;

        // The status check passed, then the driver flipped the status and
        // cleared the registry before the insert landed.
        conn.inner.status.send_replace(TransportStatus::Connecting);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            conn.register("/topic/public", tx),
            Err(ClientError::NotConnected)
        ));
        assert!(conn.active_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn lost_session_flips_status_before_clearing() {
        let (conn, _broker) = manager();
        let (tx, _rx) = mpsc::unbounded_channel();
        conn.inner.status.send_replace(TransportStatus::Connected);
        conn.inner.subscriptions.insert(
            "/topic/public".to_string(),
            Subscription {
                id: SubscriptionId(7),
                sink: tx,
            },
        );

        let mut status = conn.watch_status();
        conn.inner.on_lost(TransportErrorKind::Dropped);
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), TransportStatus::Connecting);
        assert!(conn.active_subscriptions().is_empty());
        assert!(conn.connected_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_broker_is_dropped() {
        let (connector, mut broker) = MemoryConnector::new();
        let conn = ConnectionManager::new(
            Arc::new(connector),
            ConnectionConfig {
                heartbeat_incoming: Duration::from_millis(100),
                ..config()
            },
        );
        let mut events = conn.events();
        conn.connect("dave", ConnectionPurpose::Player);
        let _remote = accept(&mut broker).await;
        wait_for(&mut events, SessionEvent::Connected).await;

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Error(TransportErrorKind::HeartbeatTimeout)
        );
    }
}
