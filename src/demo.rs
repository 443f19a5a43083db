//! Scripted headless match between two clients on one in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use derive_getters::Getters;
use tracing::{info, instrument};

use crate::client::{ClientError, GameClient};
use crate::config::ClientConfig;
use crate::engine::MoveError;
use crate::platform::authenticate;
use crate::projector::Phase;
use crate::session::Winner;
use crate::store::{DocumentStore, MemoryStore};

const EVENT_WAIT: Duration = Duration::from_secs(2);

/// What the scripted run observed.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct DemoReport {
    /// Result of the first match.
    first_match: Winner,
    /// Result of the rematch.
    second_match: Winner,
    /// Whether an out-of-turn click was kept away from the store.
    out_of_turn_blocked: bool,
    /// Whether both players saw the third session disappear.
    deletion_observed: bool,
}

/// Waits for the next sync event on `client`.
async fn settle(client: &mut GameClient) -> Result<()> {
    let delivered = tokio::time::timeout(EVENT_WAIT, client.pump())
        .await
        .context("timed out waiting for a session update")?;
    if !delivered {
        bail!("{} has no live session", client.client_id());
    }
    Ok(())
}

async fn settle_both(a: &mut GameClient, b: &mut GameClient) -> Result<()> {
    settle(a).await?;
    settle(b).await
}

/// Seats `host` as X and `guest` as O in a fresh session.
async fn pair(host: &mut GameClient, guest: &mut GameClient) -> Result<()> {
    host.find_game().await?;
    settle(host).await?;
    info!(status = %host.view().status, "Host waiting");

    guest.find_game().await?;
    settle_both(host, guest).await?;
    info!(
        host = %host.view().status,
        guest = %guest.view().status,
        "Both players seated"
    );
    Ok(())
}

/// Alternates clicks starting with X and returns the recorded winner.
async fn play_out(x: &mut GameClient, o: &mut GameClient, cells: &[usize]) -> Result<Winner> {
    for (turn, &cell) in cells.iter().enumerate() {
        let mover = if turn % 2 == 0 { &mut *x } else { &mut *o };
        mover.click_cell(cell).await?;
        settle_both(x, o).await?;
        info!(cell, board = %x.state().map(|s| s.board().display()).unwrap_or_default(), "Move synced");
    }
    x.state()
        .and_then(|s| s.winner())
        .context("match did not finish")
}

/// Runs the scripted scenario: host and join, an X win with an
/// out-of-turn click, a drawn rematch, then an external deletion.
///
/// # Errors
///
/// Returns an error if any step does not behave as scripted.
#[instrument(skip(config), fields(namespace = %config.namespace()))]
pub async fn run_demo(config: &ClientConfig) -> Result<DemoReport> {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());

    let mut alice = GameClient::new(authenticate(config, shared.clone()).await?, config.clone());
    let mut bob = GameClient::new(authenticate(config, shared).await?, config.clone());
    alice.set_name_input("Alice");
    bob.set_name_input("Bob");

    info!("Match 1: Alice hosts, Bob joins");
    pair(&mut alice, &mut bob).await?;

    alice.click_cell(4).await?;
    settle_both(&mut alice, &mut bob).await?;

    let writes = store.write_count();
    let out_of_turn = alice.click_cell(0).await;
    let out_of_turn_blocked = matches!(
        out_of_turn,
        Err(ClientError::Move(MoveError::NotYourTurn { .. }))
    ) && store.write_count() == writes;
    info!(out_of_turn_blocked, "Out-of-turn click checked");

    // X: 4 0 8 wins on the diagonal, O: 1 2.
    bob.click_cell(1).await?;
    settle_both(&mut alice, &mut bob).await?;
    let first_match = play_out(&mut alice, &mut bob, &[0, 2, 8]).await?;
    info!(
        alice = %alice.view().status,
        bob = %bob.view().status,
        "Match 1 over"
    );

    info!("Match 2: both restart, rematch ends in a draw");
    alice.restart();
    bob.restart();
    alice.set_name_input("Alice");
    bob.set_name_input("Bob");
    pair(&mut alice, &mut bob).await?;
    let second_match = play_out(&mut alice, &mut bob, &[0, 1, 2, 4, 3, 5, 7, 6, 8]).await?;
    info!(alice = %alice.view().status, "Match 2 over");

    info!("Match 3: session deleted mid-game");
    alice.restart();
    bob.restart();
    pair(&mut alice, &mut bob).await?;
    alice.delete_session().await?;
    settle_both(&mut alice, &mut bob).await?;
    let deletion_observed = alice.phase() == Phase::Gone && bob.phase() == Phase::Gone;
    info!(
        bob = %bob.view().status,
        restart_visible = bob.view().restart_visible,
        "Deletion observed"
    );

    Ok(DemoReport {
        first_match,
        second_match,
        out_of_turn_blocked,
        deletion_observed,
    })
}
