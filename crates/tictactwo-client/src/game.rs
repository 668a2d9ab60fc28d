// crates/tictactwo-client/src/game.rs

//! Player-facing game client.
//!
//! One task owns the [`RoomSession`] and processes, in a single
//! `select!` loop:
//! - local [`GameCommand`]s from the [`GameHandle`],
//! - [`SessionEvent`]s from the connection,
//! - deliveries from `/topic/public`, `/user/queue/join` and the room topic,
//! - expiry of the transient notice.
//!
//! Observers read the latest [`GameView`] through a `watch` channel and
//! discrete [`GameEvent`]s through a `broadcast` channel.

use std::time::Duration;

use chrono::Utc;
use tictactwo_core::{
    EventKind, InboundEvent, MoveRejection, OutboundCommand, Reaction, RemoteUpdate, Room,
    RoomId, RoomSession, SessionRejection, SessionState, Symbol,
};
use tictactwo_protocol::wire_types::{room_topic, QUEUE_JOIN, TOPIC_PUBLIC};
use tictactwo_protocol::{encode_command, ConnectionPurpose};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, Delivery, DeliverySink, SessionEvent, TransportStatus};
use crate::error::{ClientError, Result};
use crate::router::MessageRouter;

/// A local user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    /// Create a room; `None` picks an id from the identity and clock.
    CreateRoom(Option<RoomId>),
    /// Join a room by id, or `None` for matchmaking.
    JoinRoom(Option<RoomId>),
    Play(usize),
    NewGame,
    Leave,
}

/// Discrete things that happened, for observers that want more than the
/// latest [`GameView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Connection(SessionEvent),
    Room(Reaction),
    MovePlayed { cell: usize, symbol: Symbol },
    NewGame,
    Rejected(SessionRejection),
    Notice(String),
}

/// Everything a front end needs to draw the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameView {
    pub identity: String,
    pub connection: TransportStatus,
    pub session: SessionState,
    /// Rooms with a free seat, as last announced.
    pub lobby: Vec<RoomId>,
    pub active_players: u32,
    /// Transient message; cleared after the notice TTL.
    pub notice: Option<String>,
}

impl GameView {
    pub fn room(&self) -> Option<&Room> {
        match &self.session {
            SessionState::Joined(room) => Some(room),
            _ => None,
        }
    }

    /// One-line turn summary for a joined room.
    pub fn turn_message(&self) -> Option<&'static str> {
        let room = self.room()?;
        let mine = room.my_symbol()?;
        let outcome = room.outcome();
        Some(match outcome.winner {
            Some(winner) if winner == mine => "you won!",
            Some(_) => "you lost!",
            None if room.is_my_turn() => "it's your turn!",
            None if room.occupancy() == tictactwo_core::Occupancy::WaitingForOpponent => {
                "waiting for an opponent"
            }
            None => "wait for other player to play!",
        })
    }
}

enum Request {
    Command(GameCommand),
    Shutdown,
}

/// Handle onto a running game client.
pub struct GameHandle {
    requests: mpsc::UnboundedSender<Request>,
    view: watch::Receiver<GameView>,
    events: broadcast::Sender<GameEvent>,
    task: JoinHandle<()>,
}

impl GameHandle {
    pub fn send(&self, command: GameCommand) -> Result<()> {
        self.requests
            .send(Request::Command(command))
            .map_err(|_| ClientError::Closed)
    }

    pub fn create_room(&self, room_id: Option<RoomId>) -> Result<()> {
        self.send(GameCommand::CreateRoom(room_id))
    }

    pub fn join_room(&self, room_id: Option<RoomId>) -> Result<()> {
        self.send(GameCommand::JoinRoom(room_id))
    }

    pub fn play(&self, cell: usize) -> Result<()> {
        self.send(GameCommand::Play(cell))
    }

    pub fn new_game(&self) -> Result<()> {
        self.send(GameCommand::NewGame)
    }

    pub fn leave(&self) -> Result<()> {
        self.send(GameCommand::Leave)
    }

    /// Latest view.
    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<GameView> {
        self.view.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Leave any room, disconnect, and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Game task ended abnormally: {}", e);
        }
    }
}

pub struct GameClient;

impl GameClient {
    /// Connect as a player and start the game task.
    pub fn start(
        conn: ConnectionManager,
        identity: impl Into<String>,
        notice_ttl: Duration,
        event_capacity: usize,
    ) -> GameHandle {
        let identity = identity.into();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (sink, deliveries) = mpsc::unbounded_channel();

        let game = Game {
            session: RoomSession::new(identity.clone()),
            lobby: Vec::new(),
            active_players: 0,
            notice: None,
            notice_ttl,
            sink,
            events: events.clone(),
            view: watch::channel(GameView {
                identity: identity.clone(),
                connection: conn.status(),
                session: SessionState::Idle,
                lobby: Vec::new(),
                active_players: 0,
                notice: None,
            })
            .0,
            conn: conn.clone(),
        };
        let view = game.view.subscribe();

        // Listen before connecting so the first `Connected` is not missed.
        let session_events = conn.events();
        conn.connect(identity, ConnectionPurpose::Player);

        let task = tokio::spawn(run(game, requests_rx, session_events, deliveries));
        GameHandle {
            requests: requests_tx,
            view,
            events,
            task,
        }
    }
}

struct Notice {
    text: String,
    expires_at: Instant,
}

struct Game {
    conn: ConnectionManager,
    session: RoomSession,
    lobby: Vec<RoomId>,
    active_players: u32,
    notice: Option<Notice>,
    notice_ttl: Duration,
    sink: DeliverySink,
    events: broadcast::Sender<GameEvent>,
    view: watch::Sender<GameView>,
}

fn router() -> MessageRouter<Game> {
    let mut router = MessageRouter::new();
    router
        .on(EventKind::Rooms, |game: &mut Game, event| {
            if let InboundEvent::Rooms(rooms) = event {
                game.lobby = rooms.clone();
            }
        })
        .on(EventKind::ActivePlayers, |game: &mut Game, event| {
            if let InboundEvent::ActivePlayers { count } = event {
                game.active_players = *count;
            }
        })
        .on_each(
            &[
                EventKind::RoomCreated,
                EventKind::RoomJoined,
                EventKind::RoomAssigned,
                EventKind::GameStateUpdated,
                EventKind::PlayerJoined,
                EventKind::PlayerDisconnected,
            ],
            |game: &mut Game, event| game.on_room_event(event),
        );
    router
}

async fn run(
    mut game: Game,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut session_events: broadcast::Receiver<SessionEvent>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    let mut router = router();
    if game.conn.status() == TransportStatus::Connected {
        game.resubscribe();
    }

    loop {
        let expiry = game.notice.as_ref().map(|notice| notice.expires_at);

        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Command(command)) => game.execute(command),
                Some(Request::Shutdown) | None => break,
            },

            event = session_events.recv() => match event {
                Ok(event) => game.on_session_event(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} session events", missed);
                    if game.conn.status() == TransportStatus::Connected {
                        game.resubscribe();
                    }
                }
                Err(RecvError::Closed) => break,
            },

            Some(delivery) = deliveries.recv() => {
                router.route(&mut game, &delivery.body);
            }

            _ = sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                game.notice = None;
            }
        }

        game.publish_view();
    }

    if let Some(room_id) = game.session.leave() {
        game.conn.unsubscribe(&room_topic(&room_id));
    }
    game.conn.disconnect().await;
    game.publish_view();
    info!("Game client stopped");
}

impl Game {
    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("Notice: {}", text);
        self.notice = Some(Notice {
            text: text.clone(),
            expires_at: Instant::now() + self.notice_ttl,
        });
        self.emit(GameEvent::Notice(text));
    }

    fn publish_view(&self) {
        let next = GameView {
            identity: self.session.identity().to_string(),
            connection: self.conn.status(),
            session: self.session.state().clone(),
            lobby: self.lobby.clone(),
            active_players: self.active_players,
            notice: self.notice.as_ref().map(|notice| notice.text.clone()),
        };
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn publish(&self, command: &OutboundCommand) -> Result<()> {
        let publish = encode_command(command)?;
        self.conn.publish(publish.destination, publish.body)
    }

    fn subscribe(&self, topic: &str) {
        if let Err(e) = self.conn.subscribe(topic, self.sink.clone()) {
            warn!("Subscribe to {} failed: {}", topic, e);
        }
    }

    fn resubscribe(&self) {
        self.subscribe(TOPIC_PUBLIC);
        self.subscribe(QUEUE_JOIN);
        if let Some(room_id) = self.session.room_id() {
            self.subscribe(&room_topic(room_id));
        }
    }

    fn execute(&mut self, command: GameCommand) {
        let needs_connection = !matches!(command, GameCommand::Leave);
        if needs_connection && self.conn.status() != TransportStatus::Connected {
            self.notify("not connected");
            return;
        }

        match command {
            GameCommand::CreateRoom(room_id) => {
                let room_id = room_id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| {
                        format!("{}-{}", self.session.identity(), Utc::now().timestamp_millis())
                    });
                match self.session.request_create(room_id) {
                    Ok(command) => {
                        if let Err(e) = self.publish(&command) {
                            warn!("Create request not sent: {}", e);
                            self.session.leave();
                            self.notify("could not create room");
                            return;
                        }
                        self.notify("creating room...");
                    }
                    Err(rejection) => self.reject(rejection),
                }
            }
            GameCommand::JoinRoom(room_id) => match self.session.request_join(room_id) {
                Ok(command) => {
                    if let Err(e) = self.publish(&command) {
                        warn!("Join request not sent: {}", e);
                        return;
                    }
                    self.notify("joining room...");
                }
                Err(rejection) => self.reject(rejection),
            },
            // Board changes are made on a copy and kept only once the
            // broker has the update, so the replicas cannot diverge.
            GameCommand::Play(cell) => {
                let symbol = self.session.room().and_then(Room::my_symbol);
                let mut next = self.session.clone();
                match next.play(cell) {
                    Ok(command) => {
                        if let Err(e) = self.publish(&command) {
                            warn!("Move not sent: {}", e);
                            self.notify("move not sent, try again");
                            return;
                        }
                        self.session = next;
                        if let Some(symbol) = symbol {
                            self.emit(GameEvent::MovePlayed { cell, symbol });
                        }
                        self.notice = None;
                    }
                    Err(rejection) => self.reject(rejection),
                }
            }
            GameCommand::NewGame => {
                let mut next = self.session.clone();
                match next.new_game() {
                    Ok(command) => {
                        if let Err(e) = self.publish(&command) {
                            warn!("Reset not sent: {}", e);
                            self.notify("new game not sent, try again");
                            return;
                        }
                        self.session = next;
                        self.emit(GameEvent::NewGame);
                    }
                    Err(rejection) => self.reject(rejection),
                }
            }
            GameCommand::Leave => {
                if let Some(room_id) = self.session.leave() {
                    self.conn.unsubscribe(&room_topic(&room_id));
                    self.notify(format!("left room: {}", room_id));
                }
            }
        }
    }

    fn reject(&mut self, rejection: SessionRejection) {
        debug!("Rejected locally: {}", rejection);
        let text = match &rejection {
            SessionRejection::Move(MoveRejection::OutOfTurn) => "it's not your turn!".to_string(),
            other => other.to_string(),
        };
        self.notify(text);
        self.emit(GameEvent::Rejected(rejection));
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match &event {
            SessionEvent::Connected => self.resubscribe(),
            SessionEvent::ConnectionLost => self.notify("connection lost, reconnecting..."),
            _ => {}
        }
        self.emit(GameEvent::Connection(event));
    }

    fn on_room_event(&mut self, event: &InboundEvent) {
        let reaction = self.session.handle(event);
        match &reaction {
            Reaction::Ignored => return,
            Reaction::CreateConfirmed { room_id, join } => {
                self.subscribe(&room_topic(room_id));
                if let Err(e) = self.publish(join) {
                    warn!("Join for created room {} not sent: {}", room_id, e);
                }
                self.notify(format!("joining room: {}", room_id));
            }
            Reaction::Joined { room_id, symbol, .. } => {
                self.subscribe(&room_topic(room_id));
                info!("Joined room {} as {}", room_id, symbol);
                self.notify(format!("joined room: {}", room_id));
            }
            Reaction::SnapshotRejected(err) => {
                warn!("Join snapshot rejected: {}", err);
                self.notify(format!("could not join: {}", err));
            }
            Reaction::OccupancyChanged(occupancy) => debug!("Occupancy now {:?}", occupancy),
            Reaction::OpponentLeft { identity } => {
                info!("{} left the room", identity);
                self.notify("other player disconnected");
            }
            Reaction::Board(update) => match update {
                RemoteUpdate::Echo => debug!("Own state echoed back"),
                RemoteUpdate::Applied { cell, by } => debug!("{} played {}", by, cell),
                RemoteUpdate::Reset => debug!("Board reset by opponent"),
                RemoteUpdate::Resynced => warn!("Board resynced from remote snapshot"),
                RemoteUpdate::Rejected(err) => warn!("Remote board rejected: {}", err),
            },
        }
        self.emit(GameEvent::Room(reaction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::memory::MemoryConnector;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tictactwo_core::{BoardState, GameStateSnapshot, JoinConfirmation, JoinVia, Occupancy};

    fn view_in(room_state: &BoardState, symbol: Symbol, occupancy: Occupancy) -> GameView {
        let mut session = RoomSession::new("me");
        session.on_joined(&JoinConfirmation {
            via: JoinVia::Explicit,
            room_id: "r".into(),
            symbol,
            state: GameStateSnapshot::from(room_state),
            occupancy,
            players: BTreeMap::new(),
        });
        GameView {
            identity: "me".into(),
            connection: TransportStatus::Connected,
            session: session.state().clone(),
            lobby: Vec::new(),
            active_players: 2,
            notice: None,
        }
    }

    fn board(moves: &[usize]) -> BoardState {
        let mut board = BoardState::new();
        for &cell in moves {
            board = board.apply_move(cell, board.turn()).unwrap();
        }
        board
    }

    #[test]
    fn turn_message_follows_board() {
        let fresh = BoardState::new();
        assert_eq!(
            view_in(&fresh, Symbol::First, Occupancy::Full).turn_message(),
            Some("it's your turn!")
        );
        assert_eq!(
            view_in(&fresh, Symbol::Second, Occupancy::Full).turn_message(),
            Some("wait for other player to play!")
        );
        assert_eq!(
            view_in(&fresh, Symbol::First, Occupancy::WaitingForOpponent).turn_message(),
            Some("waiting for an opponent")
        );
    }

    #[test]
    fn turn_message_reports_result() {
        // X takes the top row.
        let won = board(&[0, 3, 1, 4, 2]);
        assert_eq!(
            view_in(&won, Symbol::First, Occupancy::Full).turn_message(),
            Some("you won!")
        );
        assert_eq!(
            view_in(&won, Symbol::Second, Occupancy::Full).turn_message(),
            Some("you lost!")
        );
    }

    fn seated_game(conn: ConnectionManager) -> Game {
        let mut session = RoomSession::new("me");
        session.on_joined(&JoinConfirmation {
            via: JoinVia::Explicit,
            room_id: "r".into(),
            symbol: Symbol::First,
            state: GameStateSnapshot::from(&BoardState::new()),
            occupancy: Occupancy::Full,
            players: BTreeMap::new(),
        });
        let (sink, _deliveries) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(8);
        let view = GameView {
            identity: "me".into(),
            connection: conn.status(),
            session: session.state().clone(),
            lobby: Vec::new(),
            active_players: 0,
            notice: None,
        };
        Game {
            conn,
            session,
            lobby: Vec::new(),
            active_players: 0,
            notice: None,
            notice_ttl: Duration::from_secs(4),
            sink,
            events,
            view: watch::channel(view).0,
        }
    }

    #[tokio::test]
    async fn unsent_move_is_not_kept_locally() {
        let (connector, _broker) = MemoryConnector::new();
        let conn = ConnectionManager::new(Arc::new(connector), ConnectionConfig::default());
        // Reported live, but no driver is there to take the frame.
        conn.force_status(TransportStatus::Connected);
        let mut game = seated_game(conn);
        let mut events = game.events.subscribe();

        game.execute(GameCommand::Play(4));
        let room = game.session.room().unwrap();
        assert!(room.board().is_initial());
        assert!(room.is_my_turn());
        assert_eq!(
            game.notice.as_ref().map(|n| n.text.as_str()),
            Some("move not sent, try again")
        );
        assert_eq!(
            events.try_recv().unwrap(),
            GameEvent::Notice("move not sent, try again".into())
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn idle_view_has_no_turn_message() {
        let view = GameView {
            identity: "me".into(),
            connection: TransportStatus::Disconnected,
            session: SessionState::Idle,
            lobby: Vec::new(),
            active_players: 0,
            notice: None,
        };
        assert_eq!(view.turn_message(), None);
        assert!(view.room().is_none());
    }
}
