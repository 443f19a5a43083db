mod rules;
mod types;

pub use rules::{Evaluation, check_winner, evaluate, is_draw, is_full};
pub use types::{Board, CELL_COUNT, Cell, InvalidCell, Mark};
