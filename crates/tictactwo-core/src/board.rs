//! Sliding-window board and the move reducer.
//!
//! A board never holds more than [`MAX_MARKS`] marks. Accepting a move
//! runs three independent steps in a fixed order:
//!
//! 1. `place`        - write the mark and append the index to the move order,
//! 2. `evict_oldest` - drop the oldest mark if the window now exceeds six,
//! 3. flip the turn.
//!
//! The outcome is then derived from scratch by [`outcome::evaluate`], so
//! a winning line is judged on the post-eviction position.

use std::collections::VecDeque;

use crate::error::{MoveRejection, SnapshotError};
use crate::outcome::{self, GameOutcome};
use crate::symbol::Symbol;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// Maximum marks kept on the board at once.
pub const MAX_MARKS: usize = 6;

/// Board position plus whose turn it is.
///
/// Fields are private so every reachable value upholds:
/// - `move_order.len() <= MAX_MARKS`,
/// - `move_order` lists exactly the occupied cells, oldest first,
/// - the two symbols' mark counts differ by at most one,
/// - `move_order` alternates symbols and `turn` is the other symbol
///   from the newest mark (`First` on an empty board).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardState {
    cells: [Option<Symbol>; CELL_COUNT],
    move_order: VecDeque<usize>,
    turn: Symbol,
}

impl Default for BoardState {
    fn default() -> Self {
        BoardState {
            cells: [None; CELL_COUNT],
            move_order: VecDeque::with_capacity(MAX_MARKS + 1),
            turn: Symbol::First,
        }
    }
}

impl BoardState {
    /// Empty board, `First` to move. This is also the reset state.
    pub fn new() -> Self {
        BoardState::default()
    }

    /// Build a board from raw parts, validating every invariant.
    ///
    /// Used when adopting a server-provided snapshot.
    pub fn from_parts(
        cells: &[Option<Symbol>],
        move_order: &[usize],
        turn: Symbol,
    ) -> Result<Self, SnapshotError> {
        if cells.len() != CELL_COUNT {
            return Err(SnapshotError::CellCount(cells.len()));
        }
        if move_order.len() > MAX_MARKS {
            return Err(SnapshotError::TooManyMoves(move_order.len()));
        }

        let mut seen = [false; CELL_COUNT];
        for &idx in move_order {
            if idx >= CELL_COUNT {
                return Err(SnapshotError::IndexOutOfRange(idx));
            }
            if seen[idx] {
                return Err(SnapshotError::DuplicateMove(idx));
            }
            if cells[idx].is_none() {
                return Err(SnapshotError::EmptyCellInOrder(idx));
            }
            seen[idx] = true;
        }

        let mut first: usize = 0;
        let mut second: usize = 0;
        for (idx, cell) in cells.iter().enumerate() {
            match cell {
                Some(_) if !seen[idx] => return Err(SnapshotError::UntrackedMark(idx)),
                Some(Symbol::First) => first += 1,
                Some(Symbol::Second) => second += 1,
                None => {}
            }
        }
        if first.abs_diff(second) > 1 {
            return Err(SnapshotError::Unbalanced { first, second });
        }

        // Moves alternate, so the window does too, and the newest mark
        // decides who moves next. An empty board is only reachable as the
        // reset state.
        for (pos, pair) in move_order.windows(2).enumerate() {
            if cells[pair[0]] == cells[pair[1]] {
                return Err(SnapshotError::BrokenAlternation(pos + 1));
            }
        }
        let expected = match move_order.last() {
            Some(&newest) => cells[newest].map_or(Symbol::First, Symbol::other),
            None => Symbol::First,
        };
        if turn != expected {
            return Err(SnapshotError::TurnMismatch { expected, found: turn });
        }

        let mut board_cells = [None; CELL_COUNT];
        board_cells.copy_from_slice(cells);

        Ok(BoardState {
            cells: board_cells,
            move_order: move_order.iter().copied().collect(),
            turn,
        })
    }

    pub fn cells(&self) -> &[Option<Symbol>; CELL_COUNT] {
        &self.cells
    }

    /// Occupied cell indices, oldest first.
    pub fn move_order(&self) -> &VecDeque<usize> {
        &self.move_order
    }

    /// Symbol to move next.
    pub fn turn(&self) -> Symbol {
        self.turn
    }

    /// Number of marks currently on the board.
    pub fn mark_count(&self) -> usize {
        self.move_order.len()
    }

    /// Returns `true` if no mark has been placed (the reset state,
    /// ignoring whose turn it is).
    pub fn is_empty(&self) -> bool {
        self.move_order.is_empty()
    }

    /// Returns `true` for the exact reset state.
    pub fn is_initial(&self) -> bool {
        self.is_empty() && self.turn == Symbol::First
    }

    /// Derive the outcome from the current cells.
    pub fn outcome(&self) -> GameOutcome {
        outcome::evaluate(&self.cells)
    }

    /// The cell that would be evicted by the next accepted move, if the
    /// window is already full.
    pub fn next_eviction(&self) -> Option<usize> {
        if self.move_order.len() >= MAX_MARKS {
            self.move_order.front().copied()
        } else {
            None
        }
    }

    /// Apply a move, returning the new board or the reason it was refused.
    ///
    /// Rejections are checked in this order: [`MoveRejection::InvalidCell`],
    /// [`MoveRejection::OutOfTurn`], [`MoveRejection::CellTaken`],
    /// [`MoveRejection::GameOver`]. `self` is never modified.
    pub fn apply_move(&self, cell: usize, symbol: Symbol) -> Result<BoardState, MoveRejection> {
        if cell >= CELL_COUNT {
            return Err(MoveRejection::InvalidCell(cell));
        }
        if symbol != self.turn {
            return Err(MoveRejection::OutOfTurn);
        }
        if self.cells[cell].is_some() {
            return Err(MoveRejection::CellTaken(cell));
        }
        if self.outcome().is_decided() {
            return Err(MoveRejection::GameOver);
        }

        let (mut next, _evicted) = self.clone().place(cell, symbol).evict_oldest();
        next.turn = symbol.other();
        Ok(next)
    }

    // -------------------------------------------------------------------------
    // Reducer steps
    // -------------------------------------------------------------------------

    /// Write the mark and record it as the newest move. May leave the
    /// board one mark over the window; `evict_oldest` must follow.
    fn place(mut self, cell: usize, symbol: Symbol) -> Self {
        self.cells[cell] = Some(symbol);
        self.move_order.push_back(cell);
        self
    }

    /// Remove the oldest mark if the window overflowed. Evicts at most one.
    fn evict_oldest(mut self) -> (Self, Option<usize>) {
        if self.move_order.len() <= MAX_MARKS {
            return (self, None);
        }
        let evicted = self.move_order.pop_front();
        if let Some(idx) = evicted {
            self.cells[idx] = None;
        }
        (self, evicted)
    }
}
