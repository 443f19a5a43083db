//! Terminal UI: two players side by side on one shared in-memory store.

mod app;
mod ui;

pub use app::App;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::Backend, backend::CrosstermBackend};
use tracing::{error, info, instrument};

use crate::client::GameClient;
use crate::config::ClientConfig;
use crate::platform::authenticate;
use crate::store::{DocumentStore, MemoryStore};

/// Log file written while the terminal is in raw mode.
pub const TUI_LOG_FILE: &str = "tictactoe_sync_tui.log";

/// Runs the two-player terminal UI until the user quits.
///
/// # Errors
///
/// Returns an error if sign-in fails or the terminal cannot be driven.
pub async fn run_tui(config: ClientConfig, names: [String; 2]) -> Result<()> {
    // Log to a file so output does not corrupt the screen.
    let log_file = std::fs::File::create(TUI_LOG_FILE)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(crate::DEFAULT_LOG_FILTER)),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .try_init();

    info!("Starting tic-tac-toe TUI");

    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let [left, right] = names;
    let mut clients = Vec::with_capacity(2);
    for name in [left, right] {
        // Each pane signs in separately and gets its own client id.
        let platform = authenticate(&config, shared.clone()).await?;
        let mut client = GameClient::new(platform, config.clone());
        client.set_name_input(name);
        clients.push(client);
    }
    let clients: [GameClient; 2] = clients
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected exactly two clients"))?;
    let mut app = App::new(store, clients);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!(error = ?err, "TUI loop failed");
    }
    res
}

#[instrument(skip_all)]
async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as Backend>::Error: Send + Sync + 'static,
{
    loop {
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
        {
            if key.kind == KeyEventKind::Release {
                continue;
            }
            app.handle_key(key).await;
            if app.should_quit() {
                info!("Leaving TUI");
                return Ok(());
            }
        }
    }
}
