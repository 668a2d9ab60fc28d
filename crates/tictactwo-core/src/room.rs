//! Room membership state machine.
//!
//! ```text
//!   Idle ──request_create──▶ Creating ──room_created(match)──▶ Joined(Waiting)
//!     │                         │                                   │
//!     └──────── join confirmation (snapshot adoption) ─────────────▶ Joined(..)
//!
//!   Joined(Full) ──player_disconnected(opponent)──▶ Joined(Waiting)   (board reset)
//!   any ──leave──▶ Idle
//! ```
//!
//! "Finished" is not a state: it is derived from the board outcome and
//! is orthogonal to occupancy.
//!
//! Snapshot adoption in [`RoomSession::on_joined`] and the resync path of
//! [`RoomSession::on_game_state`] are the only places that replace a
//! board wholesale. Local moves go through [`BoardState::apply_move`].

use std::collections::BTreeMap;

use crate::board::BoardState;
use crate::error::{SessionRejection, SnapshotError};
use crate::messages::{GameStateSnapshot, InboundEvent, JoinConfirmation, OutboundCommand};
use crate::outcome::GameOutcome;
use crate::symbol::Symbol;

/// Room identifier (server-assigned or caller-chosen).
pub type RoomId = String;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Occupancy {
    WaitingForOpponent,
    Full,
}

/// A room this client sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: RoomId,
    my_symbol: Option<Symbol>,
    players: BTreeMap<String, Symbol>,
    occupancy: Occupancy,
    board: BoardState,
}

impl Room {
    fn pending(id: RoomId) -> Self {
        Room {
            id,
            my_symbol: None,
            players: BTreeMap::new(),
            occupancy: Occupancy::WaitingForOpponent,
            board: BoardState::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Our symbol; `None` until the join confirmation arrives.
    pub fn my_symbol(&self) -> Option<Symbol> {
        self.my_symbol
    }

    pub fn players(&self) -> &BTreeMap<String, Symbol> {
        &self.players
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn outcome(&self) -> GameOutcome {
        self.board.outcome()
    }

    /// A decided game; the room may still be full.
    pub fn is_finished(&self) -> bool {
        self.outcome().is_decided()
    }

    /// Returns `true` when it is our move in a full, undecided game.
    pub fn is_my_turn(&self) -> bool {
        self.occupancy == Occupancy::Full
            && !self.is_finished()
            && self.my_symbol == Some(self.board.turn())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A create request is outstanding for `room_id`.
    Creating { room_id: RoomId },
    Joined(Room),
}

/// How an incoming `game_state_updated` related to the local replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUpdate {
    /// Identical to the local board (usually our own publish echoed back).
    Echo,
    /// Local board plus exactly one reducer-accepted move.
    Applied { cell: usize, by: Symbol },
    /// The other player started a new game.
    Reset,
    /// Could not be derived from the local board; adopted wholesale.
    Resynced,
    /// Failed validation; local board kept.
    Rejected(SnapshotError),
}

/// What an inbound event did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Not for us, or not applicable in the current state.
    Ignored,
    /// Our create request was confirmed. The caller must publish `join`.
    CreateConfirmed { room_id: RoomId, join: OutboundCommand },
    /// A join snapshot was adopted.
    Joined {
        room_id: RoomId,
        symbol: Symbol,
        occupancy: Occupancy,
    },
    /// A join snapshot failed validation and was dropped.
    SnapshotRejected(SnapshotError),
    OccupancyChanged(Occupancy),
    /// The opponent left; board reset, room kept.
    OpponentLeft { identity: String },
    Board(RemoteUpdate),
}

/// Membership and board replica for one client identity.
#[derive(Debug, Clone)]
pub struct RoomSession {
    identity: String,
    state: SessionState,
}

impl RoomSession {
    pub fn new(identity: impl Into<String>) -> Self {
        RoomSession {
            identity: identity.into(),
            state: SessionState::Idle,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn room(&self) -> Option<&Room> {
        match &self.state {
            SessionState::Joined(room) => Some(room),
            _ => None,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room().map(Room::id)
    }

    pub fn is_creating(&self) -> bool {
        matches!(self.state, SessionState::Creating { .. })
    }

    // -------------------------------------------------------------------------
    // Local requests
    // -------------------------------------------------------------------------

    /// `Idle -> Creating`. Returns the command to publish.
    pub fn request_create(
        &mut self,
        room_id: impl Into<RoomId>,
    ) -> Result<OutboundCommand, SessionRejection> {
        let room_id = room_id.into();
        if room_id.trim().is_empty() {
            return Err(SessionRejection::EmptyRoomId);
        }
        match &self.state {
            SessionState::Idle => {}
            SessionState::Creating { .. } => return Err(SessionRejection::CreateInFlight),
            SessionState::Joined(room) => {
                return Err(SessionRejection::AlreadyInRoom(room.id.clone()))
            }
        }

        self.state = SessionState::Creating {
            room_id: room_id.clone(),
        };
        Ok(OutboundCommand::CreateRoom {
            identity: self.identity.clone(),
            desired_room_id: room_id,
        })
    }

    /// Join a named room, or `None` (or a blank id) for matchmaking.
    ///
    /// The state does not change until the confirmation arrives.
    pub fn request_join(
        &self,
        room_id: Option<RoomId>,
    ) -> Result<OutboundCommand, SessionRejection> {
        match &self.state {
            SessionState::Idle => {}
            SessionState::Creating { .. } => return Err(SessionRejection::CreateInFlight),
            SessionState::Joined(room) => {
                return Err(SessionRejection::AlreadyInRoom(room.id.clone()))
            }
        }
        let room_id = room_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Ok(OutboundCommand::JoinRoom { room_id })
    }

    /// Play `cell` with our symbol. Returns the state update to publish.
    pub fn play(&mut self, cell: usize) -> Result<OutboundCommand, SessionRejection> {
        let room = match &mut self.state {
            SessionState::Joined(room) => room,
            _ => return Err(SessionRejection::NotInRoom),
        };
        if room.occupancy != Occupancy::Full {
            return Err(SessionRejection::WaitingForOpponent);
        }
        let symbol = room.my_symbol.ok_or(SessionRejection::NoSymbol)?;

        room.board = room.board.apply_move(cell, symbol)?;
        Ok(OutboundCommand::UpdateGameState {
            room_id: room.id.clone(),
            state: room.board.clone(),
        })
    }

    /// Start a new game in the current room once the last one is decided.
    pub fn new_game(&mut self) -> Result<OutboundCommand, SessionRejection> {
        let room = match &mut self.state {
            SessionState::Joined(room) => room,
            _ => return Err(SessionRejection::NotInRoom),
        };
        if !room.is_finished() {
            return Err(SessionRejection::GameInProgress);
        }

        room.board = BoardState::new();
        Ok(OutboundCommand::UpdateGameState {
            room_id: room.id.clone(),
            state: room.board.clone(),
        })
    }

    /// Any state -> `Idle`. Returns the room we left, if any.
    pub fn leave(&mut self) -> Option<RoomId> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Joined(room) => Some(room.id),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Inbound events
    // -------------------------------------------------------------------------

    /// Dispatch any inbound event. Lobby and status events are ignored.
    pub fn handle(&mut self, event: &InboundEvent) -> Reaction {
        match event {
            InboundEvent::RoomCreated { room_id } => self.on_room_created(room_id),
            InboundEvent::Joined(join) => self.on_joined(join),
            InboundEvent::GameStateUpdated { room_id, state } => {
                self.on_game_state(room_id.as_deref(), state)
            }
            InboundEvent::PlayerJoined { room_id, occupancy } => {
                self.on_player_joined(room_id, *occupancy)
            }
            InboundEvent::PlayerDisconnected { room_id, identity } => {
                self.on_player_disconnected(room_id, identity)
            }
            InboundEvent::Rooms(_)
            | InboundEvent::ActivePlayers { .. }
            | InboundEvent::StatusUpdate(_) => Reaction::Ignored,
        }
    }

    /// `Creating -> Joined(WaitingForOpponent)` if `room_id` is ours.
    ///
    /// `room_created` is broadcast to every client; anything not matching
    /// our pending id belongs to somebody else.
    pub fn on_room_created(&mut self, room_id: &str) -> Reaction {
        match &self.state {
            SessionState::Creating { room_id: pending } if pending == room_id => {}
            _ => return Reaction::Ignored,
        }

        self.state = SessionState::Joined(Room::pending(room_id.to_string()));
        Reaction::CreateConfirmed {
            room_id: room_id.to_string(),
            join: OutboundCommand::JoinRoom {
                room_id: Some(room_id.to_string()),
            },
        }
    }

    /// Adopt a join snapshot.
    pub fn on_joined(&mut self, join: &JoinConfirmation) -> Reaction {
        if let SessionState::Joined(room) = &self.state {
            if room.id != join.room_id {
                return Reaction::Ignored;
            }
        }

        let board = match join.state.to_board() {
            Ok(board) => board,
            Err(err) => return Reaction::SnapshotRejected(err),
        };

        let mut players = join.players.clone();
        players.insert(self.identity.clone(), join.symbol);

        self.state = SessionState::Joined(Room {
            id: join.room_id.clone(),
            my_symbol: Some(join.symbol),
            players,
            occupancy: join.occupancy,
            board,
        });
        Reaction::Joined {
            room_id: join.room_id.clone(),
            symbol: join.symbol,
            occupancy: join.occupancy,
        }
    }

    pub fn on_player_joined(&mut self, room_id: &str, occupancy: Occupancy) -> Reaction {
        match &mut self.state {
            SessionState::Joined(room) if room.id == room_id => {
                room.occupancy = occupancy;
                Reaction::OccupancyChanged(occupancy)
            }
            _ => Reaction::Ignored,
        }
    }

    /// Losing the opponent discards the game in progress.
    pub fn on_player_disconnected(&mut self, room_id: &str, identity: &str) -> Reaction {
        if identity == self.identity {
            return Reaction::Ignored;
        }
        match &mut self.state {
            SessionState::Joined(room) if room.id == room_id => {
                room.players.remove(identity);
                room.occupancy = Occupancy::WaitingForOpponent;
                room.board = BoardState::new();
                Reaction::OpponentLeft {
                    identity: identity.to_string(),
                }
            }
            _ => Reaction::Ignored,
        }
    }

    /// Reconcile a published board with the local replica.
    pub fn on_game_state(
        &mut self,
        room_id: Option<&str>,
        snapshot: &GameStateSnapshot,
    ) -> Reaction {
        let room = match &mut self.state {
            SessionState::Joined(room) => room,
            _ => return Reaction::Ignored,
        };
        if room_id.is_some_and(|id| id != room.id) {
            return Reaction::Ignored;
        }

        let incoming = match snapshot.to_board() {
            Ok(board) => board,
            Err(err) => return Reaction::Board(RemoteUpdate::Rejected(err)),
        };
        let update = classify_remote(&room.board, &incoming);
        room.board = incoming;
        Reaction::Board(update)
    }
}

/// Work out how `incoming` was derived from `current`.
fn classify_remote(current: &BoardState, incoming: &BoardState) -> RemoteUpdate {
    if incoming == current {
        return RemoteUpdate::Echo;
    }
    if incoming.is_initial() {
        return RemoteUpdate::Reset;
    }
    if let Some(&cell) = incoming.move_order().back() {
        let mover = incoming.turn().other();
        if let Ok(next) = current.apply_move(cell, mover) {
            if next == *incoming {
                return RemoteUpdate::Applied { cell, by: mover };
            }
        }
    }
    RemoteUpdate::Resynced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MoveRejection;
    use crate::messages::JoinVia;

    fn join(room_id: &str, symbol: Symbol, occupancy: Occupancy) -> JoinConfirmation {
        JoinConfirmation {
            via: JoinVia::Explicit,
            room_id: room_id.to_string(),
            symbol,
            state: GameStateSnapshot::from(&BoardState::new()),
            occupancy,
            players: BTreeMap::new(),
        }
    }

    fn full_session(symbol: Symbol) -> RoomSession {
        let mut session = RoomSession::new("me");
        session.on_joined(&join("r1", symbol, Occupancy::Full));
        session
    }

    #[test]
    fn create_flow_correlates_by_room_id() {
        let mut session = RoomSession::new("me");
        let cmd = session.request_create("mine").unwrap();
        assert_eq!(
            cmd,
            OutboundCommand::CreateRoom {
                identity: "me".into(),
                desired_room_id: "mine".into()
            }
        );
        assert!(session.is_creating());

        // Another client's room: ignored.
        assert_eq!(session.on_room_created("theirs"), Reaction::Ignored);
        assert!(session.is_creating());

        match session.on_room_created("mine") {
            Reaction::CreateConfirmed { room_id, join } => {
                assert_eq!(room_id, "mine");
                assert_eq!(
                    join,
                    OutboundCommand::JoinRoom {
                        room_id: Some("mine".into())
                    }
                );
            }
            other => panic!("unexpected reaction: {other:?}"),
        }
        let room = session.room().unwrap();
        assert_eq!(room.occupancy(), Occupancy::WaitingForOpponent);
        assert_eq!(room.my_symbol(), None);

        // The join confirmation for the same room seeds our symbol.
        let reaction = session.on_joined(&join("mine", Symbol::First, Occupancy::WaitingForOpponent));
        assert!(matches!(reaction, Reaction::Joined { symbol: Symbol::First, .. }));
        assert_eq!(session.room().unwrap().my_symbol(), Some(Symbol::First));
        assert_eq!(session.room().unwrap().players().get("me"), Some(&Symbol::First));
    }

    #[test]
    fn duplicate_create_is_rejected_locally() {
        let mut session = RoomSession::new("me");
        session.request_create("a").unwrap();
        assert_eq!(session.request_create("b"), Err(SessionRejection::CreateInFlight));
        assert_eq!(
            session.request_join(None),
            Err(SessionRejection::CreateInFlight)
        );
        assert_eq!(session.request_create(" "), Err(SessionRejection::EmptyRoomId));
    }

    #[test]
    fn blank_join_means_matchmaking() {
        let session = RoomSession::new("me");
        assert_eq!(
            session.request_join(Some("  ".into())),
            Ok(OutboundCommand::JoinRoom { room_id: None })
        );
        assert_eq!(
            session.request_join(Some(" r9 ".into())),
            Ok(OutboundCommand::JoinRoom {
                room_id: Some("r9".into())
            })
        );
    }

    #[test]
    fn join_adopts_server_snapshot() {
        let mut session = RoomSession::new("me");
        let board = BoardState::new().apply_move(4, Symbol::First).unwrap();
        let mut confirmation = join("r1", Symbol::Second, Occupancy::Full);
        confirmation.via = JoinVia::Assigned;
        confirmation.state = GameStateSnapshot::from(&board);

        session.on_joined(&confirmation);
        let room = session.room().unwrap();
        assert_eq!(room.board(), &board);
        assert!(room.is_my_turn());
    }

    #[test]
    fn invalid_join_snapshot_is_not_adopted() {
        let mut session = RoomSession::new("me");
        let mut confirmation = join("r1", Symbol::First, Occupancy::Full);
        confirmation.state.move_order = vec![3];
        assert_eq!(
            session.on_joined(&confirmation),
            Reaction::SnapshotRejected(SnapshotError::EmptyCellInOrder(3))
        );
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn unreachable_remote_board_is_rejected() {
        let mut session = full_session(Symbol::Second);
        let mut snapshot = GameStateSnapshot::from(&BoardState::new());
        // X has moved but the snapshot still hands the turn to X.
        snapshot.cells[0] = Some(Symbol::First);
        snapshot.move_order = vec![0];
        assert_eq!(
            session.on_game_state(Some("r1"), &snapshot),
            Reaction::Board(RemoteUpdate::Rejected(SnapshotError::TurnMismatch {
                expected: Symbol::Second,
                found: Symbol::First
            }))
        );
        assert!(session.room().unwrap().board().is_initial());
    }

    #[test]
    fn join_for_other_room_is_ignored_while_joined() {
        let mut session = full_session(Symbol::First);
        assert_eq!(
            session.on_joined(&join("r2", Symbol::Second, Occupancy::Full)),
            Reaction::Ignored
        );
        assert_eq!(session.room_id(), Some("r1"));
    }

    #[test]
    fn play_requires_full_room_and_turn() {
        let mut session = RoomSession::new("me");
        assert_eq!(session.play(0), Err(SessionRejection::NotInRoom));

        session.on_joined(&join("r1", Symbol::Second, Occupancy::WaitingForOpponent));
        assert_eq!(session.play(0), Err(SessionRejection::WaitingForOpponent));

        session.on_player_joined("r1", Occupancy::Full);
        assert_eq!(
            session.play(0),
            Err(SessionRejection::Move(MoveRejection::OutOfTurn))
        );
        assert!(session.room().unwrap().board().is_initial());
    }

    #[test]
    fn accepted_play_publishes_new_board() {
        let mut session = full_session(Symbol::First);
        match session.play(4).unwrap() {
            OutboundCommand::UpdateGameState { room_id, state } => {
                assert_eq!(room_id, "r1");
                assert_eq!(state.turn(), Symbol::Second);
                assert_eq!(state.move_order().iter().copied().collect::<Vec<_>>(), vec![4]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn opponent_disconnect_resets_board_and_keeps_room() {
        let mut session = full_session(Symbol::First);
        session.play(4).unwrap();
        assert_eq!(
            session.on_player_disconnected("r1", "them"),
            Reaction::OpponentLeft {
                identity: "them".into()
            }
        );
        let room = session.room().unwrap();
        assert_eq!(room.id(), "r1");
        assert_eq!(room.occupancy(), Occupancy::WaitingForOpponent);
        assert!(room.board().is_initial());
        assert!(!room.is_finished());
    }

    #[test]
    fn own_or_foreign_disconnect_is_ignored() {
        let mut session = full_session(Symbol::First);
        session.play(4).unwrap();
        assert_eq!(session.on_player_disconnected("r1", "me"), Reaction::Ignored);
        assert_eq!(session.on_player_disconnected("r2", "them"), Reaction::Ignored);
        assert_eq!(session.room().unwrap().board().mark_count(), 1);
        assert_eq!(session.room().unwrap().occupancy(), Occupancy::Full);
    }

    #[test]
    fn remote_updates_are_classified() {
        let mut session = full_session(Symbol::Second);
        let after_x = BoardState::new().apply_move(4, Symbol::First).unwrap();

        let reaction = session.on_game_state(Some("r1"), &GameStateSnapshot::from(&after_x));
        assert_eq!(
            reaction,
            Reaction::Board(RemoteUpdate::Applied {
                cell: 4,
                by: Symbol::First
            })
        );

        // Our own move echoed back by the broker.
        session.play(0).unwrap();
        let ours = session.room().unwrap().board().clone();
        assert_eq!(
            session.on_game_state(None, &GameStateSnapshot::from(&ours)),
            Reaction::Board(RemoteUpdate::Echo)
        );

        // Something we cannot derive: adopt it.
        let elsewhere = BoardState::new()
            .apply_move(8, Symbol::First)
            .and_then(|b| b.apply_move(2, Symbol::Second))
            .and_then(|b| b.apply_move(6, Symbol::First))
            .unwrap();
        assert_eq!(
            session.on_game_state(Some("r1"), &GameStateSnapshot::from(&elsewhere)),
            Reaction::Board(RemoteUpdate::Resynced)
        );
        assert_eq!(session.room().unwrap().board(), &elsewhere);

        // Other room: ignored.
        assert_eq!(
            session.on_game_state(Some("r2"), &GameStateSnapshot::from(&BoardState::new())),
            Reaction::Ignored
        );
    }

    #[test]
    fn new_game_only_after_outcome_and_converges() {
        let mut first = full_session(Symbol::First);
        let mut second = full_session(Symbol::Second);
        assert_eq!(first.new_game(), Err(SessionRejection::GameInProgress));

        // X: 0,1,2  O: 3,4
        let script = [(0, true), (3, false), (1, true), (4, false), (2, true)];
        for (cell, first_moves) in script {
            let (mover, other) = if first_moves {
                (&mut first, &mut second)
            } else {
                (&mut second, &mut first)
            };
            if let OutboundCommand::UpdateGameState { state, .. } = mover.play(cell).unwrap() {
                other.on_game_state(Some("r1"), &GameStateSnapshot::from(&state));
            }
        }
        assert!(second.room().unwrap().is_finished());
        assert_eq!(first.room().unwrap().board(), second.room().unwrap().board());

        let reset = match second.new_game().unwrap() {
            OutboundCommand::UpdateGameState { state, .. } => state,
            other => panic!("unexpected command: {other:?}"),
        };
        assert_eq!(
            first.on_game_state(Some("r1"), &GameStateSnapshot::from(&reset)),
            Reaction::Board(RemoteUpdate::Reset)
        );
        assert!(first.room().unwrap().board().is_initial());
        assert_eq!(first.room().unwrap().board(), second.room().unwrap().board());
    }

    #[test]
    fn leave_returns_to_idle() {
        let mut session = full_session(Symbol::First);
        assert_eq!(session.leave(), Some("r1".to_string()));
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.leave(), None);
    }
}
