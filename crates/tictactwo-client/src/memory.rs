//! In-process broker link.
//!
//! [`MemoryConnector`] hands out transports whose far ends surface on a
//! [`MemoryBroker`] as [`MemoryRemote`]s. The `connect` handshake is
//! answered automatically; everything after that is driven by the test
//! (or embedding) through the remote handle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tictactwo_protocol::{ClientFrame, ConnectionPurpose, ServerFrame};
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};
use crate::transport::{Connector, Transport};

/// Creates linked in-memory transports.
#[derive(Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<MemoryRemote>,
    failures: Arc<AtomicU32>,
    sessions: Arc<AtomicU64>,
}

/// Receives the far end of every successful connect.
pub struct MemoryBroker {
    accepted: mpsc::UnboundedReceiver<MemoryRemote>,
    failures: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryBroker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU32::new(0));
        let connector = MemoryConnector {
            accepted: tx,
            failures: failures.clone(),
            sessions: Arc::new(AtomicU64::new(0)),
        };
        (connector, MemoryBroker {
            accepted: rx,
            failures,
        })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ClientError::Transport("connection refused".to_string()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;

        let remote = MemoryRemote {
            session,
            identity: None,
            purpose: None,
            sent: sent_rx,
            inbound: inbound_tx,
            subscriptions: HashMap::new(),
        };
        self.accepted
            .send(remote)
            .map_err(|_| ClientError::Transport("broker gone".to_string()))?;

        Ok(Box::new(MemoryTransport {
            session,
            sent: sent_tx,
            inbound: inbound_rx,
            pending: VecDeque::new(),
            closed: false,
        }))
    }
}

impl MemoryBroker {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryRemote> {
        self.accepted.recv().await
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

struct MemoryTransport {
    session: u64,
    sent: mpsc::UnboundedSender<ClientFrame>,
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
    pending: VecDeque<ServerFrame>,
    closed: bool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<()> {
        if self.closed {
            return Err(ClientError::Transport("transport closed".to_string()));
        }
        if matches!(frame, ClientFrame::Connect { .. }) {
            self.pending.push_back(ServerFrame::Connected {
                session: format!("mem-{}", self.session),
            });
        }
        self.sent
            .send(frame)
            .map_err(|_| ClientError::Transport("remote dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerFrame>> {
        if let Some(frame) = self.pending.pop_front() {
            return Some(Ok(frame));
        }
        if self.closed {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }
}

/// The broker's view of one client connection.
///
/// Dropping the remote (or calling [`MemoryRemote::hang_up`]) ends the
/// client's session as a transport drop.
pub struct MemoryRemote {
    session: u64,
    identity: Option<String>,
    purpose: Option<ConnectionPurpose>,
    sent: mpsc::UnboundedReceiver<ClientFrame>,
    inbound: mpsc::UnboundedSender<ServerFrame>,
    subscriptions: HashMap<String, u64>,
}

impl MemoryRemote {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Identity from the `connect` frame, once it has been read.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn purpose(&self) -> Option<ConnectionPurpose> {
        self.purpose
    }

    /// Topics the client currently holds on this connection.
    pub fn subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains_key(topic)
    }

    /// Next non-heartbeat frame from the client. `None` once it is gone.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        loop {
            let frame = self.sent.recv().await?;
            match &frame {
                ClientFrame::Heartbeat => continue,
                ClientFrame::Connect { identity, purpose } => {
                    self.identity = Some(identity.clone());
                    self.purpose = Some(*purpose);
                }
                ClientFrame::Subscribe { id, topic } => {
                    self.subscriptions.insert(topic.clone(), *id);
                }
                ClientFrame::Unsubscribe { id } => {
                    self.subscriptions.retain(|_, sub| sub != id);
                }
                ClientFrame::Send { .. } | ClientFrame::Disconnect => {}
            }
            return Some(frame);
        }
    }

    /// Read frames until a subscription to `topic` is seen.
    pub async fn expect_subscribe(&mut self, topic: &str) -> Option<u64> {
        while !self.subscribed(topic) {
            self.next_frame().await?;
        }
        self.subscriptions.get(topic).copied()
    }

    /// Read frames until the next `send`; returns destination and body.
    pub async fn expect_send(&mut self) -> Option<(String, String)> {
        loop {
            if let ClientFrame::Send { destination, body } = self.next_frame().await? {
                return Some((destination, body));
            }
        }
    }

    /// Deliver `body` on `topic` using the client's subscription id.
    ///
    /// Returns `false` when the client is not subscribed to `topic`.
    pub fn publish(&self, topic: &str, body: impl Into<String>) -> bool {
        let Some(&subscription) = self.subscriptions.get(topic) else {
            return false;
        };
        self.push(ServerFrame::Message {
            subscription,
            topic: topic.to_string(),
            body: body.into(),
        })
    }

    /// Push a raw frame to the client.
    pub fn push(&self, frame: ServerFrame) -> bool {
        self.inbound.send(frame).is_ok()
    }

    pub fn hang_up(self) {}
}
