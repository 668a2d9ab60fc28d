//! Rejection types for the core game logic.
//!
//! None of these are fatal. The reducer and the room state machine
//! return them instead of mutating anything, and callers turn them
//! into a short-lived user notice.

use std::fmt;

use crate::symbol::Symbol;

/// Why the reducer refused a move. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    /// Cell index outside `0..9`.
    InvalidCell(usize),

    /// The acting symbol is not the one to move.
    OutOfTurn,

    /// The target cell already holds a mark.
    CellTaken(usize),

    /// The position already has a winner.
    GameOver,
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveRejection::InvalidCell(idx) => write!(f, "cell {} is not on the board", idx),
            MoveRejection::OutOfTurn => write!(f, "it's not your turn!"),
            MoveRejection::CellTaken(idx) => write!(f, "cell {} is already taken", idx),
            MoveRejection::GameOver => write!(f, "the game is already over"),
        }
    }
}

impl std::error::Error for MoveRejection {}

/// Why the room state machine refused a local request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRejection {
    /// A create request is already outstanding.
    CreateInFlight,

    /// The session already belongs to a room.
    AlreadyInRoom(String),

    /// The operation needs a joined room.
    NotInRoom,

    /// The room has no opponent yet.
    WaitingForOpponent,

    /// The join confirmation carrying our symbol has not arrived.
    NoSymbol,

    /// `new_game` before the current game has an outcome.
    GameInProgress,

    /// The caller passed an empty room id.
    EmptyRoomId,

    /// The reducer refused the move.
    Move(MoveRejection),
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRejection::CreateInFlight => write!(f, "a room is already being created"),
            SessionRejection::AlreadyInRoom(id) => write!(f, "already in room {}", id),
            SessionRejection::NotInRoom => write!(f, "not in a room"),
            SessionRejection::WaitingForOpponent => write!(f, "wait for the other player to join"),
            SessionRejection::NoSymbol => write!(f, "no symbol assigned yet"),
            SessionRejection::GameInProgress => write!(f, "the current game is still running"),
            SessionRejection::EmptyRoomId => write!(f, "room id must not be empty"),
            SessionRejection::Move(rejection) => rejection.fmt(f),
        }
    }
}

impl std::error::Error for SessionRejection {}

impl From<MoveRejection> for SessionRejection {
    fn from(rejection: MoveRejection) -> Self {
        SessionRejection::Move(rejection)
    }
}

/// A board snapshot that violates the board invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// `cells` does not hold exactly nine slots.
    CellCount(usize),

    /// More than six entries in the move order.
    TooManyMoves(usize),

    /// A move-order entry points outside the board.
    IndexOutOfRange(usize),

    /// The same cell appears twice in the move order.
    DuplicateMove(usize),

    /// The move order names a cell that is empty.
    EmptyCellInOrder(usize),

    /// A marked cell is missing from the move order.
    UntrackedMark(usize),

    /// Mark counts differ by more than one.
    Unbalanced { first: usize, second: usize },

    /// Two consecutive move-order entries hold the same symbol. Carries
    /// the position of the second one.
    BrokenAlternation(usize),

    /// `turn` does not follow from the newest mark.
    TurnMismatch { expected: Symbol, found: Symbol },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::CellCount(n) => write!(f, "expected 9 cells, got {}", n),
            SnapshotError::TooManyMoves(n) => write!(f, "move order holds {} entries (max 6)", n),
            SnapshotError::IndexOutOfRange(idx) => write!(f, "move index {} out of range", idx),
            SnapshotError::DuplicateMove(idx) => write!(f, "cell {} listed twice in move order", idx),
            SnapshotError::EmptyCellInOrder(idx) => write!(f, "move order names empty cell {}", idx),
            SnapshotError::UntrackedMark(idx) => write!(f, "cell {} is marked but not in move order", idx),
            SnapshotError::Unbalanced { first, second } => {
                write!(f, "unbalanced marks: {} X vs {} O", first, second)
            }
            SnapshotError::BrokenAlternation(pos) => {
                write!(f, "move order repeats a symbol at position {}", pos)
            }
            SnapshotError::TurnMismatch { expected, found } => {
                write!(f, "turn is {} but {} should move", found, expected)
            }
        }
    }
}

impl std::error::Error for SnapshotError {}
