//! tictactoe_sync - real-time two-player tic-tac-toe over a shared
//! document store.
//!
//! Two clients never talk to each other. Each one reads and writes a single
//! session document and subscribes to its changes; the store is the only
//! source of truth.
//!
//! # Architecture
//!
//! - **Games**: board, marks and the win/draw evaluator
//! - **Session**: the shared document, its invariants and partial writes
//! - **Store**: the [`DocumentStore`] contract and the in-memory [`MemoryStore`]
//! - **Matchmaking**: join the oldest waiting session or host a new one
//! - **Engine**: validate a move locally and build the patch to write
//! - **Sync**: one live subscription per client
//! - **Projector**: pure mapping of client state to what the screen shows
//! - **Client**: one player's state and actions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tictactoe_sync::{ClientConfig, GameClient, MemoryStore, authenticate};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! let mut client = GameClient::new(authenticate(&config, store).await?, config);
//! client.set_name_input("Rina");
//! client.find_game().await?;
//! client.pump().await;
//! println!("{}", client.view().status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod client;
mod config;
mod demo;
mod engine;
mod games;
mod matchmaking;
mod platform;
mod projector;
mod session;
mod store;
mod sync;
mod tui;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tictactoe_sync=debug";

// Crate-level exports - Game rules
pub use games::tictactoe::{
    Board, CELL_COUNT, Cell, Evaluation, InvalidCell, Mark, check_winner, evaluate, is_draw,
    is_full,
};

// Crate-level exports - Session model
pub use session::{ClientId, PlayerSlot, Session, SessionError, SessionPatch, SessionStatus, Winner};

// Crate-level exports - Document store
pub use store::{
    Document, DocumentRef, DocumentStore, DocumentStream, Filter, MemoryStore, StoreError,
    StoreErrorKind, TransactionFn, with_timeout,
};

// Crate-level exports - Configuration and sign-in
pub use config::{ClientConfig, ConfigError, NAMESPACE_ENV};
pub use platform::{GAMES_COLLECTION, PlatformContext, PlatformError, authenticate};

// Crate-level exports - Game flow
pub use engine::{MoveError, apply_move, apply_move_at};
pub use matchmaking::{Matchmaker, MatchmakingError, SessionHandle};
pub use sync::{SessionEvent, SyncChannel, SyncError};

// Crate-level exports - Presentation
pub use client::{ClientError, GameClient};
pub use projector::{BoardView, ClientView, OPPONENT_PENDING, Phase, StatusLine, project};

// Crate-level exports - Front ends
pub use demo::{DemoReport, run_demo};
pub use tui::{App, TUI_LOG_FILE, run_tui};
