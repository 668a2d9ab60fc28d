//! tictactwo-core
//!
//! Pure game logic for the tic-tac-two multiplayer client:
//! - symbols and the sliding-window board (at most six marks),
//! - the move reducer and win detection,
//! - the room membership state machine,
//! - logical inbound / outbound messages.
//!
//! No I/O, no async, no wire formats.

pub mod symbol;
pub mod outcome;
pub mod board;
pub mod messages;
pub mod room;
pub mod error;

pub use symbol::Symbol;
pub use outcome::GameOutcome;
pub use board::{BoardState, CELL_COUNT, MAX_MARKS};

pub use messages::{
    EventKind,
    GameStateSnapshot,
    InboundEvent,
    JoinConfirmation,
    JoinVia,
    OutboundCommand,
    RoomSummary,
};

pub use room::{Occupancy, Reaction, RemoteUpdate, Room, RoomId, RoomSession, SessionState};
pub use error::{MoveRejection, SessionRejection, SnapshotError};
