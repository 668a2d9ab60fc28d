// crates/tictactwo-client/src/status.rs

//! Fleet status monitoring.
//!
//! [`StatusBoard`] is a plain aggregate of the latest `game_state_update`
//! snapshot. [`StatusMonitor`] keeps one current over a read-only
//! connection that never joins rooms and never publishes.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use tictactwo_core::{EventKind, InboundEvent, Occupancy, RoomId, RoomSummary};
use tictactwo_protocol::wire_types::{TOPIC_PUBLIC, TOPIC_STATUS};
use tictactwo_protocol::ConnectionPurpose;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, Delivery, DeliverySink, SessionEvent, TransportStatus};
use crate::router::MessageRouter;

/// Latest fleet snapshot plus derived figures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBoard {
    rooms: IndexMap<RoomId, RoomSummary>,
    active_players: u32,
    connected: bool,
    updated_at: Option<DateTime<Local>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale.
    pub fn apply(&mut self, rooms: &BTreeMap<RoomId, RoomSummary>) {
        self.rooms = rooms
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();
        self.updated_at = Some(Local::now());
    }

    pub fn set_active_players(&mut self, count: u32) {
        self.active_players = count;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn rooms(&self) -> impl Iterator<Item = (&RoomId, &RoomSummary)> {
        self.rooms.iter()
    }

    pub fn room(&self, id: &str) -> Option<&RoomSummary> {
        self.rooms.get(id)
    }

    pub fn total_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn active_games(&self) -> usize {
        self.rooms.values().filter(|room| room.is_game_active).count()
    }

    /// Rooms without a game in progress.
    pub fn waiting_rooms(&self) -> usize {
        self.rooms.values().filter(|room| !room.is_game_active).count()
    }

    /// Rooms with a free seat.
    pub fn open_seats(&self) -> usize {
        self.rooms
            .values()
            .filter(|room| room.occupancy == Occupancy::WaitingForOpponent)
            .count()
    }

    pub fn total_players(&self) -> u32 {
        self.rooms.values().map(|room| room.player_count).sum()
    }

    /// Fleet-wide connected players, from `active_players`.
    pub fn active_players(&self) -> u32 {
        self.active_players
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at
    }
}

/// Handle onto a running status monitor.
pub struct StatusMonitor {
    identity: String,
    board: watch::Receiver<StatusBoard>,
    shutdown: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl StatusMonitor {
    /// Connect with a `status_monitor_<millis>` identity and start tracking.
    pub fn start(conn: ConnectionManager) -> Self {
        let identity = format!("status_monitor_{}", chrono::Utc::now().timestamp_millis());
        Self::start_as(conn, identity)
    }

    pub fn start_as(conn: ConnectionManager, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let (board_tx, board_rx) = watch::channel(StatusBoard::new());
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        let events = conn.events();
        conn.connect(identity.clone(), ConnectionPurpose::Monitoring);
        let task = tokio::spawn(run(conn, board_tx, events, shutdown_rx));

        Self {
            identity,
            board: board_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Latest board.
    pub fn board(&self) -> StatusBoard {
        self.board.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StatusBoard> {
        self.board.clone()
    }

    /// Unsubscribe, disconnect, and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Status monitor ended abnormally: {}", e);
        }
    }
}

fn router() -> MessageRouter<StatusBoard> {
    let mut router = MessageRouter::new();
    router
        .on(EventKind::StatusUpdate, |board: &mut StatusBoard, event| {
            if let InboundEvent::StatusUpdate(rooms) = event {
                board.apply(rooms);
            }
        })
        .on(EventKind::ActivePlayers, |board: &mut StatusBoard, event| {
            if let InboundEvent::ActivePlayers { count } = event {
                board.set_active_players(*count);
            }
        });
    router
}

fn subscribe_all(conn: &ConnectionManager, sink: &DeliverySink) {
    for topic in [TOPIC_STATUS, TOPIC_PUBLIC] {
        if let Err(e) = conn.subscribe(topic, sink.clone()) {
            warn!("Status subscribe to {} failed: {}", topic, e);
        }
    }
}

async fn run(
    conn: ConnectionManager,
    board_tx: watch::Sender<StatusBoard>,
    mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
    mut shutdown: mpsc::UnboundedReceiver<()>,
) {
    let mut router = router();
    let mut board = StatusBoard::new();
    let (sink, mut deliveries) = mpsc::unbounded_channel::<Delivery>();

    if conn.status() == TransportStatus::Connected {
        subscribe_all(&conn, &sink);
        board.set_connected(true);
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,

            event = events.recv() => match event {
                Ok(SessionEvent::Connected) => {
                    info!("Status monitor connected, subscribing to {}", TOPIC_STATUS);
                    subscribe_all(&conn, &sink);
                    board.set_connected(true);
                }
                Ok(SessionEvent::ConnectionLost) | Ok(SessionEvent::Disconnected) => {
                    board.set_connected(false);
                }
                Ok(other) => debug!("Status monitor saw {:?}", other),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Status monitor missed {} session events", missed);
                    let connected = conn.status() == TransportStatus::Connected;
                    if connected {
                        subscribe_all(&conn, &sink);
                    }
                    board.set_connected(connected);
                }
                Err(RecvError::Closed) => break,
            },

            Some(delivery) = deliveries.recv() => {
                router.route(&mut board, &delivery.body);
            }
        }

        board_tx.send_if_modified(|current| {
            if *current == board {
                return false;
            }
            *current = board.clone();
            true
        });
    }

    conn.unsubscribe(TOPIC_STATUS);
    conn.unsubscribe(TOPIC_PUBLIC);
    conn.disconnect().await;
    board.set_connected(false);
    board_tx.send_replace(board);
}
