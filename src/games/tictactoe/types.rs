//! Core domain types for tic-tac-toe.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// A player's mark on the board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Mark {
    /// Mark X (always moves first).
    X,
    /// Mark O (second player).
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A cell on the board.
///
/// Stored in session documents as `""`, `"X"` or `"O"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cell {
    /// Nobody has played here yet.
    #[default]
    Empty,
    /// Claimed by a mark.
    Occupied(Mark),
}

impl Cell {
    /// Returns the mark in this cell, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(mark) => Some(mark),
        }
    }

    /// Label shown to the player: empty string or the mark.
    pub fn label(self) -> &'static str {
        match self {
            Cell::Empty => "",
            Cell::Occupied(Mark::X) => "X",
            Cell::Occupied(Mark::O) => "O",
        }
    }
}

/// A cell value that is neither empty nor a mark.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Invalid cell value {:?}", value)]
pub struct InvalidCell {
    /// The offending value.
    pub value: String,
}

impl TryFrom<String> for Cell {
    type Error = InvalidCell;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(Cell::Empty),
            "X" => Ok(Cell::Occupied(Mark::X)),
            "O" => Ok(Cell::Occupied(Mark::O)),
            _ => Err(InvalidCell { value }),
        }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        cell.label().to_string()
    }
}

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// 3x3 tic-tac-toe board, cells in row-major order (0-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from nine cells.
    pub fn from_cells(cells: [Cell; CELL_COUNT]) -> Self {
        Self { cells }
    }

    /// Gets the cell at `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Checks whether the cell at `index` exists and is empty.
    pub fn is_empty(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    /// Returns a copy of this board with `mark` placed at `index`.
    ///
    /// Callers validate the index and emptiness first.
    pub fn with_mark(&self, index: usize, mark: Mark) -> Self {
        let mut next = *self;
        if let Some(cell) = next.cells.get_mut(index) {
            *cell = Cell::Occupied(mark);
        }
        next
    }

    /// Returns all cells.
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// Counts the cells holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.cells
            .iter()
            .filter(|cell| **cell == Cell::Occupied(mark))
            .count()
    }

    /// Formats the board as a human-readable grid, numbering empty cells 1-9.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let index = row * 3 + col;
                let symbol = match self.cells[index] {
                    Cell::Empty => (index + 1).to_string(),
                    Cell::Occupied(mark) => mark.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_wire_format() {
        let board = Board::new().with_mark(4, Mark::X).with_mark(0, Mark::O);
        let json = serde_json::to_value(board).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["O", "", "", "", "X", "", "", "", ""])
        );
    }

    #[test]
    fn test_board_rejects_wrong_length() {
        let short = serde_json::json!(["", "", ""]);
        assert!(serde_json::from_value::<Board>(short).is_err());
    }

    #[test]
    fn test_board_rejects_unknown_symbol() {
        let bad = serde_json::json!(["", "", "", "", "Z", "", "", "", ""]);
        assert!(serde_json::from_value::<Board>(bad).is_err());
    }

    #[test]
    fn test_with_mark_leaves_original_untouched() {
        let board = Board::new();
        let next = board.with_mark(8, Mark::O);
        assert!(board.is_empty(8));
        assert_eq!(next.get(8), Some(Cell::Occupied(Mark::O)));
        assert_eq!(next.count(Mark::O), 1);
    }

    #[test]
    fn test_display_numbers_empty_cells() {
        let board = Board::new().with_mark(0, Mark::X);
        assert_eq!(board.display(), "X|2|3\n-+-+-\n4|5|6\n-+-+-\n7|8|9");
    }
}
