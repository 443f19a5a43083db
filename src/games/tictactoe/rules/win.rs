//! Win detection logic for tic-tac-toe.

use super::super::{Board, Cell, Mark};
use tracing::instrument;

/// The eight winning triples: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Checks if there is a winner on the board.
///
/// Returns the mark owning the first complete line found, `None` otherwise.
/// A corrupted board could hold two complete lines; the first one wins.
#[instrument(level = "trace")]
pub fn check_winner(board: &Board) -> Option<Mark> {
    for [a, b, c] in LINES {
        let cell = board.get(a);
        if cell != Some(Cell::Empty) && cell == board.get(b) && cell == board.get(c) {
            return cell.and_then(Cell::mark);
        }
    }

    None
}
