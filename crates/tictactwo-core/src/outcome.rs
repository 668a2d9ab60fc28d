//! Win detection over the nine cells.
//!
//! The outcome is never stored. It is recomputed from the cells every
//! time it is asked for, so a line that lost a mark to eviction stops
//! counting as a win immediately.

use crate::symbol::Symbol;

/// The eight canonical three-in-a-row lines (rows, columns, diagonals).
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Derived result of a board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameOutcome {
    /// Symbol owning a complete line, if any.
    pub winner: Option<Symbol>,
    /// The three winning indices (same order as in [`LINES`]).
    pub line: Option<[usize; 3]>,
}

impl GameOutcome {
    /// Returns `true` once somebody has won.
    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }
}

/// Scan all eight lines against `cells`.
///
/// When more than one line is complete (only reachable through an
/// adopted snapshot), the first one in [`LINES`] order wins.
pub fn evaluate(cells: &[Option<Symbol>; 9]) -> GameOutcome {
    for line in LINES {
        let [a, b, c] = line;
        if let Some(symbol) = cells[a] {
            if cells[b] == Some(symbol) && cells[c] == Some(symbol) {
                return GameOutcome {
                    winner: Some(symbol),
                    line: Some(line),
                };
            }
        }
    }
    GameOutcome::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_line_is_detected_for_both_symbols() {
        for symbol in [Symbol::First, Symbol::Second] {
            for line in LINES {
                let mut cells = [None; 9];
                for idx in line {
                    cells[idx] = Some(symbol);
                }
                let outcome = evaluate(&cells);
                assert_eq!(outcome.winner, Some(symbol));
                assert_eq!(outcome.line, Some(line));
            }
        }
    }

    #[test]
    fn mixed_line_is_not_a_win() {
        let mut cells = [None; 9];
        cells[0] = Some(Symbol::First);
        cells[1] = Some(Symbol::Second);
        cells[2] = Some(Symbol::First);
        assert_eq!(evaluate(&cells), GameOutcome::default());
    }

    #[test]
    fn full_board_without_line_has_no_winner() {
        // X O X / X O O / O X X
        let x = Some(Symbol::First);
        let o = Some(Symbol::Second);
        let cells = [x, o, x, x, o, o, o, x, x];
        assert!(!evaluate(&cells).is_decided());
    }
}
