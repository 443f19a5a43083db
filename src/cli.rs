//! Command-line interface for tictactoe_sync.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Real-time two-player tic-tac-toe over a shared document store
#[derive(Parser, Debug)]
#[command(name = "tictactoe_sync")]
#[command(about = "Two-player tic-tac-toe synchronized through a document store", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play both seats side by side in the terminal
    Play {
        /// Path to the client config file
        #[arg(short, long, default_value = "tictactoe.toml")]
        config: PathBuf,

        /// Display name of the left player (blank uses the default)
        #[arg(long, default_value = "")]
        left_name: String,

        /// Display name of the right player (blank uses the default)
        #[arg(long, default_value = "")]
        right_name: String,
    },

    /// Run a scripted match headlessly and log every step
    Demo {
        /// Path to the client config file
        #[arg(short, long, default_value = "tictactoe.toml")]
        config: PathBuf,
    },
}
