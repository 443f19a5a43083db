//! Game rules for tic-tac-toe.
//!
//! Pure functions over a board snapshot. The evaluator is what the turn
//! engine consults after every placed mark.

pub mod draw;
pub mod win;

pub use draw::{is_draw, is_full};
pub use win::check_winner;

use super::{Board, Mark};
use tracing::instrument;

/// Verdict for a board snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Evaluation {
    /// A mark owns a complete line.
    #[display("{_0} wins")]
    Won(Mark),
    /// Board full, no line.
    #[display("Draw")]
    Draw,
    /// Game continues.
    #[display("Ongoing")]
    Ongoing,
}

impl Evaluation {
    /// Returns true for `Won` and `Draw`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Evaluation::Ongoing)
    }
}

/// Evaluates a board: a winning mark, a draw, or still ongoing.
#[instrument(level = "trace")]
pub fn evaluate(board: &Board) -> Evaluation {
    if let Some(mark) = check_winner(board) {
        Evaluation::Won(mark)
    } else if is_full(board) {
        Evaluation::Draw
    } else {
        Evaluation::Ongoing
    }
}
