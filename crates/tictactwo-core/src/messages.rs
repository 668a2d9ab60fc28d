//! Logical messages exchanged with the broker.
//!
//! These are **transport-agnostic**:
//! - [`OutboundCommand`]: what this client publishes.
//! - [`InboundEvent`]: what the broker delivers, on any topic.
//!
//! JSON shapes, topic names and framing live in the
//! `tictactwo-protocol` crate; this module is purely logical.

use std::collections::BTreeMap;

use crate::board::BoardState;
use crate::room::{Occupancy, RoomId};
use crate::symbol::Symbol;

/// A request published by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Ask the broker to create a room with a caller-chosen id.
    CreateRoom {
        identity: String,
        desired_room_id: RoomId,
    },

    /// Join a specific room, or `None` to be matched with anyone waiting.
    JoinRoom { room_id: Option<RoomId> },

    /// Publish the local board after an accepted move or a reset.
    UpdateGameState { room_id: RoomId, state: BoardState },
}

/// Tag of an inbound envelope.
///
/// One variant per `type` string the broker sends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Rooms,
    RoomCreated,
    ActivePlayers,
    RoomJoined,
    RoomAssigned,
    GameStateUpdated,
    PlayerJoined,
    PlayerDisconnected,
    StatusUpdate,
}

impl EventKind {
    /// Every known kind, in no particular order.
    pub const ALL: [EventKind; 9] = [
        EventKind::Rooms,
        EventKind::RoomCreated,
        EventKind::ActivePlayers,
        EventKind::RoomJoined,
        EventKind::RoomAssigned,
        EventKind::GameStateUpdated,
        EventKind::PlayerJoined,
        EventKind::PlayerDisconnected,
        EventKind::StatusUpdate,
    ];

    /// The `type` tag used on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Rooms => "rooms",
            EventKind::RoomCreated => "room_created",
            EventKind::ActivePlayers => "active_players",
            EventKind::RoomJoined => "room_joined",
            EventKind::RoomAssigned => "room_assigned",
            EventKind::GameStateUpdated => "game_state_updated",
            EventKind::PlayerJoined => "player_joined",
            EventKind::PlayerDisconnected => "player_disconnected",
            EventKind::StatusUpdate => "game_state_update",
        }
    }

    /// Look up a wire tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// An event delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Rooms that still have a free seat.
    Rooms(Vec<RoomId>),

    /// Some client created a room (broadcast to everybody).
    RoomCreated { room_id: RoomId },

    /// Number of connected players across the fleet.
    ActivePlayers { count: u32 },

    /// Private confirmation that this client now sits in a room.
    Joined(JoinConfirmation),

    /// A player in the room published a new board.
    GameStateUpdated {
        room_id: Option<RoomId>,
        state: GameStateSnapshot,
    },

    /// Somebody joined the room.
    PlayerJoined { room_id: RoomId, occupancy: Occupancy },

    /// Somebody's connection dropped.
    PlayerDisconnected { room_id: RoomId, identity: String },

    /// Fleet-wide status snapshot (monitoring topic).
    StatusUpdate(BTreeMap<RoomId, RoomSummary>),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Rooms(_) => EventKind::Rooms,
            InboundEvent::RoomCreated { .. } => EventKind::RoomCreated,
            InboundEvent::ActivePlayers { .. } => EventKind::ActivePlayers,
            InboundEvent::Joined(join) => match join.via {
                JoinVia::Explicit => EventKind::RoomJoined,
                JoinVia::Assigned => EventKind::RoomAssigned,
            },
            InboundEvent::GameStateUpdated { .. } => EventKind::GameStateUpdated,
            InboundEvent::PlayerJoined { .. } => EventKind::PlayerJoined,
            InboundEvent::PlayerDisconnected { .. } => EventKind::PlayerDisconnected,
            InboundEvent::StatusUpdate(_) => EventKind::StatusUpdate,
        }
    }
}

/// Whether a join confirmation answered an explicit join or a
/// server-side match.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinVia {
    Explicit,
    Assigned,
}

/// Snapshot carried by `room_joined` / `room_assigned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfirmation {
    pub via: JoinVia,
    pub room_id: RoomId,
    /// Symbol assigned to this client.
    pub symbol: Symbol,
    pub state: GameStateSnapshot,
    pub occupancy: Occupancy,
    /// Known seats; may be empty if the broker omits them.
    pub players: BTreeMap<String, Symbol>,
}

/// Unvalidated board as received from the wire.
///
/// Turn it into a [`BoardState`] with [`GameStateSnapshot::to_board`]
/// before trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateSnapshot {
    pub cells: Vec<Option<Symbol>>,
    pub move_order: Vec<usize>,
    pub turn: Symbol,
}

impl GameStateSnapshot {
    pub fn to_board(&self) -> Result<BoardState, crate::error::SnapshotError> {
        BoardState::from_parts(&self.cells, &self.move_order, self.turn)
    }
}

impl From<&BoardState> for GameStateSnapshot {
    fn from(board: &BoardState) -> Self {
        GameStateSnapshot {
            cells: board.cells().to_vec(),
            move_order: board.move_order().iter().copied().collect(),
            turn: board.turn(),
        }
    }
}

/// One room as seen by the monitoring topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub occupancy: Occupancy,
    pub player_count: u32,
    pub players: BTreeMap<String, Symbol>,
    pub current_turn: Option<Symbol>,
    pub is_game_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_kind() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("chat_message"), None);
    }

    #[test]
    fn snapshot_from_board_validates_back() {
        let board = BoardState::new()
            .apply_move(4, Symbol::First)
            .and_then(|b| b.apply_move(0, Symbol::Second))
            .unwrap();
        let snapshot = GameStateSnapshot::from(&board);
        assert_eq!(snapshot.move_order, vec![4, 0]);
        assert_eq!(snapshot.to_board().unwrap(), board);
    }
}
