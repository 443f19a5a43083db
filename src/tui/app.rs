//! Two-player application state and key handling.

use crossterm::event::{KeyCode, KeyEvent};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, GameClient};
use crate::store::MemoryStore;

/// Both players' clients sharing one store, one of them focused.
#[derive(Debug)]
pub struct App {
    clients: [GameClient; 2],
    active: usize,
    store: MemoryStore,
    last_action: Option<String>,
    should_quit: bool,
}

impl App {
    /// Creates the app with the left client focused.
    pub fn new(store: MemoryStore, clients: [GameClient; 2]) -> Self {
        Self {
            clients,
            active: 0,
            store,
            last_action: None,
            should_quit: false,
        }
    }

    /// Both clients, left first.
    pub fn clients(&self) -> &[GameClient; 2] {
        &self.clients
    }

    /// Index of the focused pane.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Whether the shared store is reachable.
    pub fn store_online(&self) -> bool {
        self.store.is_online()
    }

    /// Result of the most recent key press, if it failed.
    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    /// Whether the user asked to quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Applies sync events that arrived since the last frame.
    pub fn tick(&mut self) {
        for client in &mut self.clients {
            client.poll_events();
        }
    }

    /// Handles one key press against the focused client.
    #[instrument(skip(self, key), fields(code = ?key.code, pane = self.active))]
    pub async fn handle_key(&mut self, key: KeyEvent) {
        let client = &mut self.clients[self.active];
        let outcome = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                info!("Quit requested");
                self.should_quit = true;
                return;
            }
            KeyCode::Tab => {
                self.active = 1 - self.active;
                debug!(active = self.active, "Switched pane");
                return;
            }
            KeyCode::Char('o') => {
                let online = !self.store.is_online();
                self.store.set_online(online);
                return;
            }
            KeyCode::Char('f') => client.find_game().await,
            KeyCode::Char('r') => {
                // No text entry here, so the player keeps their name.
                let name = client.name_input().to_string();
                client.restart();
                client.set_name_input(name);
                Ok(())
            }
            KeyCode::Char('d') => client.delete_session().await,
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                client.click_cell(index).await
            }
            _ => return,
        };

        self.last_action = match outcome {
            Ok(()) => None,
            Err(ClientError::Move(e)) => {
                debug!(error = %e, "Move ignored");
                None
            }
            Err(e) => {
                warn!(error = %e, "Action had no effect");
                Some(e.to_string())
            }
        };
    }
}
