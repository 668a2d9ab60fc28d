//! Player symbol (First / Second).

use std::fmt;

/// The two per-room markers.
///
/// `First` always opens a fresh game. On the wire and in the text
/// rendering they show up as `'X'` and `'O'`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    First,
    Second,
}

impl Symbol {
    /// Convert to the display char (`'X'` / `'O'`).
    pub fn as_char(self) -> char {
        match self {
            Symbol::First => 'X',
            Symbol::Second => 'O',
        }
    }

    /// Try to parse from a char (`'X'` / `'O'`, case-sensitive).
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'X' => Some(Symbol::First),
            'O' => Some(Symbol::Second),
            _ => None,
        }
    }

    /// The opposing symbol.
    pub fn other(self) -> Self {
        match self {
            Symbol::First => Symbol::Second,
            Symbol::Second => Symbol::First,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_map_both_ways() {
        for symbol in [Symbol::First, Symbol::Second] {
            assert_eq!(Symbol::from_char(symbol.as_char()), Some(symbol));
        }
        assert_eq!(Symbol::from_char('x'), None);
    }

    #[test]
    fn other_flips() {
        assert_eq!(Symbol::First.other(), Symbol::Second);
        assert_eq!(Symbol::Second.other().other(), Symbol::Second);
    }
}
