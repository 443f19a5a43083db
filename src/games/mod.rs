//! Game rules shared by every client.

pub mod tictactoe;
