//! JSON wire shapes, topic names and destinations.
//!
//! This module defines:
//! - the topics and destinations the client talks to,
//! - serde mirrors of every outbound command and inbound envelope,
//! - conversions between those mirrors and the logical
//!   `tictactwo_core` types.
//!
//! Symbols travel as `"X"` / `"O"`, empty cells as `null`, occupancy as
//! `"waiting_for_opponent"` / `"full"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tictactwo_core::{
    GameStateSnapshot, InboundEvent, JoinConfirmation, JoinVia, Occupancy, RoomSummary, Symbol,
};

/// Broadcast topic for lobby events (all clients).
pub const TOPIC_PUBLIC: &str = "/topic/public";

/// Global monitoring topic.
pub const TOPIC_STATUS: &str = "/topic/status";

/// Per-identity private queue for join confirmations.
pub const QUEUE_JOIN: &str = "/user/queue/join";

pub const DEST_CREATE_ROOM: &str = "/app/createRoom";
pub const DEST_JOIN_ROOM: &str = "/app/joinRoom";
pub const DEST_UPDATE_GAME_STATE: &str = "/app/updateGameState";

/// Per-room topic.
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/room/{}", room_id)
}

// -----------------------------------------------------------------------------
// Shared pieces
// -----------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireSymbol {
    X,
    O,
}

impl From<Symbol> for WireSymbol {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::First => WireSymbol::X,
            Symbol::Second => WireSymbol::O,
        }
    }
}

impl From<WireSymbol> for Symbol {
    fn from(symbol: WireSymbol) -> Self {
        match symbol {
            WireSymbol::X => Symbol::First,
            WireSymbol::O => Symbol::Second,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOccupancy {
    WaitingForOpponent,
    Full,
}

impl From<Occupancy> for WireOccupancy {
    fn from(occupancy: Occupancy) -> Self {
        match occupancy {
            Occupancy::WaitingForOpponent => WireOccupancy::WaitingForOpponent,
            Occupancy::Full => WireOccupancy::Full,
        }
    }
}

impl From<WireOccupancy> for Occupancy {
    fn from(occupancy: WireOccupancy) -> Self {
        match occupancy {
            WireOccupancy::WaitingForOpponent => Occupancy::WaitingForOpponent,
            WireOccupancy::Full => Occupancy::Full,
        }
    }
}

/// `{cells, moveOrder, turn}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGameState {
    pub cells: Vec<Option<WireSymbol>>,
    pub move_order: Vec<usize>,
    pub turn: WireSymbol,
}

impl From<&GameStateSnapshot> for WireGameState {
    fn from(snapshot: &GameStateSnapshot) -> Self {
        WireGameState {
            cells: snapshot.cells.iter().map(|c| c.map(WireSymbol::from)).collect(),
            move_order: snapshot.move_order.clone(),
            turn: snapshot.turn.into(),
        }
    }
}

impl From<WireGameState> for GameStateSnapshot {
    fn from(state: WireGameState) -> Self {
        GameStateSnapshot {
            cells: state.cells.into_iter().map(|c| c.map(Symbol::from)).collect(),
            move_order: state.move_order,
            turn: state.turn.into(),
        }
    }
}

fn symbols_from_wire(players: BTreeMap<String, WireSymbol>) -> BTreeMap<String, Symbol> {
    players.into_iter().map(|(name, s)| (name, s.into())).collect()
}

// -----------------------------------------------------------------------------
// Outbound (client -> broker)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub identity: String,
    pub desired_room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGameStateRequest {
    pub room_id: String,
    pub game_state: WireGameState,
}

// -----------------------------------------------------------------------------
// Inbound (broker -> client)
// -----------------------------------------------------------------------------

/// Payload of `room_joined` / `room_assigned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireJoin {
    pub room_id: String,
    pub symbol: WireSymbol,
    pub cells: Vec<Option<WireSymbol>>,
    pub move_order: Vec<usize>,
    pub turn: WireSymbol,
    pub occupancy: WireOccupancy,
    #[serde(default)]
    pub players: BTreeMap<String, WireSymbol>,
}

impl WireJoin {
    fn into_confirmation(self, via: JoinVia) -> JoinConfirmation {
        JoinConfirmation {
            via,
            room_id: self.room_id,
            symbol: self.symbol.into(),
            state: GameStateSnapshot {
                cells: self.cells.into_iter().map(|c| c.map(Symbol::from)).collect(),
                move_order: self.move_order,
                turn: self.turn.into(),
            },
            occupancy: self.occupancy.into(),
            players: symbols_from_wire(self.players),
        }
    }
}

/// One entry of the monitoring snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoomSummary {
    pub occupancy: WireOccupancy,
    pub player_count: u32,
    #[serde(default)]
    pub players: BTreeMap<String, WireSymbol>,
    #[serde(default)]
    pub current_turn: Option<WireSymbol>,
    pub is_game_active: bool,
}

impl From<WireRoomSummary> for RoomSummary {
    fn from(room: WireRoomSummary) -> Self {
        RoomSummary {
            occupancy: room.occupancy.into(),
            player_count: room.player_count,
            players: symbols_from_wire(room.players),
            current_turn: room.current_turn.map(Symbol::from),
            is_game_active: room.is_game_active,
        }
    }
}

/// Every inbound envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEnvelope {
    Rooms {
        rooms: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_id: String,
    },
    ActivePlayers {
        count: u32,
    },
    RoomJoined(WireJoin),
    RoomAssigned(WireJoin),
    #[serde(rename_all = "camelCase")]
    GameStateUpdated {
        #[serde(default)]
        room_id: Option<String>,
        game_state: WireGameState,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        room_id: String,
        occupancy: WireOccupancy,
    },
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        room_id: String,
        identity: String,
    },
    GameStateUpdate {
        rooms: BTreeMap<String, WireRoomSummary>,
    },
}

impl From<WireEnvelope> for InboundEvent {
    fn from(envelope: WireEnvelope) -> Self {
        match envelope {
            WireEnvelope::Rooms { rooms } => InboundEvent::Rooms(rooms),
            WireEnvelope::RoomCreated { room_id } => InboundEvent::RoomCreated { room_id },
            WireEnvelope::ActivePlayers { count } => InboundEvent::ActivePlayers { count },
            WireEnvelope::RoomJoined(join) => {
                InboundEvent::Joined(join.into_confirmation(JoinVia::Explicit))
            }
            WireEnvelope::RoomAssigned(join) => {
                InboundEvent::Joined(join.into_confirmation(JoinVia::Assigned))
            }
            WireEnvelope::GameStateUpdated {
                room_id,
                game_state,
            } => InboundEvent::GameStateUpdated {
                room_id,
                state: game_state.into(),
            },
            WireEnvelope::PlayerJoined { room_id, occupancy } => InboundEvent::PlayerJoined {
                room_id,
                occupancy: occupancy.into(),
            },
            WireEnvelope::PlayerDisconnected { room_id, identity } => {
                InboundEvent::PlayerDisconnected { room_id, identity }
            }
            WireEnvelope::GameStateUpdate { rooms } => InboundEvent::StatusUpdate(
                rooms.into_iter().map(|(id, room)| (id, room.into())).collect(),
            ),
        }
    }
}
