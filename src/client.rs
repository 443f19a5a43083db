//! One player's client: local state, user actions and sync handling.

use derive_more::{Display, Error};
use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::engine::{MoveError, apply_move};
use crate::games::tictactoe::Mark;
use crate::matchmaking::{Matchmaker, MatchmakingError, SessionHandle};
use crate::platform::PlatformContext;
use crate::projector::{BoardView, ClientView, Phase, StatusLine, project};
use crate::session::{Session, SessionError, SessionStatus};
use crate::store::{StoreError, with_timeout};
use crate::sync::{SessionEvent, SyncChannel, SyncError};

/// Why a user action did nothing.
#[derive(Debug, Clone, Display, Error)]
pub enum ClientError {
    /// The move was refused locally; nothing was written.
    #[display("{}", _0)]
    Move(MoveError),
    /// Find-game failed.
    #[display("{}", _0)]
    Matchmaking(MatchmakingError),
    /// Subscribing to the session failed.
    #[display("{}", _0)]
    Sync(SyncError),
    /// A write to the store failed.
    #[display("Could not save the move: {}", _0)]
    Write(StoreError),
    /// Removing the session from the store failed.
    #[display("Could not delete the game: {}", _0)]
    Delete(StoreError),
    /// A patch could not be encoded.
    #[display("{}", _0)]
    Session(SessionError),
    /// The previous move has not been echoed back yet.
    #[display("Previous move is still being saved")]
    MoveInFlight,
    /// The action needs a seated session.
    #[display("Not in a game")]
    NoSession,
    /// Find-game is only available from setup.
    #[display("Already in a game")]
    AlreadyInGame,
}

/// A single player's view of the game and the actions they can take.
#[derive(Debug)]
pub struct GameClient {
    platform: PlatformContext,
    config: ClientConfig,
    matchmaker: Matchmaker,
    sync: SyncChannel,
    phase: Phase,
    handle: Option<SessionHandle>,
    current_state: Option<Session>,
    notice: Option<StatusLine>,
    name_input: String,
    move_in_flight: bool,
}

impl GameClient {
    /// Creates a client in setup for a signed-in player.
    #[instrument(skip_all, fields(client_id = %platform.client_id()))]
    pub fn new(platform: PlatformContext, config: ClientConfig) -> Self {
        let matchmaker = Matchmaker::new(platform.clone(), *config.join_retries());
        info!("Game client ready");
        Self {
            platform,
            config,
            matchmaker,
            sync: SyncChannel::new(),
            phase: Phase::Setup,
            handle: None,
            current_state: None,
            notice: None,
            name_input: String::new(),
            move_in_flight: false,
        }
    }

    /// This client's id.
    #[instrument(level = "trace", skip(self))]
    pub fn client_id(&self) -> &str {
        self.platform.client_id()
    }

    /// Current lifecycle phase.
    #[instrument(level = "trace", skip(self))]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seat assigned by matchmaking.
    #[instrument(level = "trace", skip(self))]
    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Mark played this match.
    #[instrument(level = "trace", skip(self))]
    pub fn my_mark(&self) -> Option<Mark> {
        self.handle.as_ref().map(SessionHandle::mark)
    }

    /// Latest validated snapshot.
    #[instrument(level = "trace", skip(self))]
    pub fn state(&self) -> Option<&Session> {
        self.current_state.as_ref()
    }

    /// Text typed in the name field.
    #[instrument(level = "trace", skip(self))]
    pub fn name_input(&self) -> &str {
        &self.name_input
    }

    /// Replaces the typed name.
    #[instrument(level = "trace", skip_all)]
    pub fn set_name_input(&mut self, name: impl Into<String>) {
        self.name_input = name.into();
    }

    /// Whether a move write awaits its echo.
    #[instrument(level = "trace", skip(self))]
    pub fn move_in_flight(&self) -> bool {
        self.move_in_flight
    }

    /// Searches for a game and subscribes to it.
    ///
    /// On failure the client returns to setup with an error status and
    /// find-game enabled again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyInGame`] outside setup, otherwise the
    /// matchmaking or subscription failure.
    #[instrument(skip(self), fields(client_id = %self.platform.client_id()))]
    pub async fn find_game(&mut self) -> Result<(), ClientError> {
        if self.phase != Phase::Setup {
            debug!(phase = %self.phase, "Find ignored");
            return Err(ClientError::AlreadyInGame);
        }

        let name = self.config.resolve_display_name(&self.name_input);
        self.phase = Phase::Searching;
        self.notice = None;

        let handle = match self.matchmaker.find_or_create_game(&name).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Matchmaking failed");
                self.fail_setup(format!("Could not join a game: {}. Try again.", e));
                return Err(ClientError::Matchmaking(e));
            }
        };

        let subscribed = self
            .sync
            .subscribe(
                self.platform.store().as_ref(),
                handle.reference(),
                *self.platform.store_timeout(),
            )
            .await;
        if let Err(e) = subscribed {
            warn!(error = %e, reference = %handle.reference(), "Could not subscribe");
            self.fail_setup(format!("Could not open the game: {}. Try again.", e));
            return Err(ClientError::Sync(e));
        }

        info!(reference = %handle.reference(), mark = %handle.mark(), "Seated");
        self.handle = Some(handle);
        self.phase = Phase::Playing;
        Ok(())
    }

    fn fail_setup(&mut self, message: String) {
        self.phase = Phase::Setup;
        self.notice = Some(StatusLine::Error(message));
    }

    /// Plays the local mark at `cell_index`.
    ///
    /// Invalid moves are dropped without a write; the screen does not change.
    ///
    /// # Errors
    ///
    /// Returns the local [`MoveError`], [`ClientError::MoveInFlight`] while
    /// the previous move is unconfirmed, or [`ClientError::Write`] if the
    /// store rejected the update.
    #[instrument(skip(self), fields(client_id = %self.platform.client_id()))]
    pub async fn click_cell(&mut self, cell_index: usize) -> Result<(), ClientError> {
        let (Phase::Playing, Some(state), Some(handle)) =
            (self.phase, &self.current_state, &self.handle)
        else {
            return Err(ClientError::NoSession);
        };
        if self.move_in_flight {
            debug!("Move ignored, previous one unconfirmed");
            return Err(ClientError::MoveInFlight);
        }

        let patch = apply_move(state, cell_index, handle.mark()).map_err(ClientError::Move)?;
        let reference = handle.reference().clone();
        let value = patch.to_value().map_err(ClientError::Session)?;

        self.move_in_flight = true;
        let written = with_timeout(
            *self.platform.store_timeout(),
            self.platform.store().update_document(&reference, value),
        )
        .await;

        match written {
            Ok(()) => {
                debug!(cell_index, "Move written");
                Ok(())
            }
            Err(e) => {
                self.move_in_flight = false;
                warn!(error = %e, "Move write failed");
                self.notice = Some(StatusLine::Error(
                    "Could not save the move. Try again.".to_string(),
                ));
                Err(ClientError::Write(e))
            }
        }
    }

    /// Drops the session locally and returns to setup.
    ///
    /// The session document is left untouched.
    #[instrument(skip(self), fields(client_id = %self.platform.client_id()))]
    pub fn restart(&mut self) {
        self.sync.unsubscribe();
        self.handle = None;
        self.current_state = None;
        self.move_in_flight = false;
        self.name_input.clear();
        self.phase = Phase::Setup;
        self.notice = Some(StatusLine::Ready);
        info!("Restarted");
    }

    /// Deletes the seated session from the store, as an external cleanup
    /// would. Both players then see it disappear.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoSession`] when not seated, or
    /// [`ClientError::Delete`] with the store failure.
    #[instrument(skip(self), fields(client_id = %self.platform.client_id()))]
    pub async fn delete_session(&self) -> Result<(), ClientError> {
        let handle = self.handle.as_ref().ok_or(ClientError::NoSession)?;
        with_timeout(
            *self.platform.store_timeout(),
            self.platform.store().delete_document(handle.reference()),
        )
        .await
        .map_err(ClientError::Delete)?;
        info!(reference = %handle.reference(), "Session deleted");
        Ok(())
    }

    /// Waits for one sync event and applies it. Returns `false` when there
    /// is no subscription.
    #[instrument(level = "trace", skip(self), fields(client_id = %self.platform.client_id()))]
    pub async fn pump(&mut self) -> bool {
        match self.sync.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Applies every event that is already available without waiting.
    /// Returns how many were applied.
    #[instrument(level = "trace", skip(self), fields(client_id = %self.platform.client_id()))]
    pub fn poll_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(Some(event)) = self.sync.next_event().now_or_never() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Folds one sync event into local state.
    #[instrument(skip(self, event), fields(client_id = %self.platform.client_id()))]
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.phase != Phase::Playing {
            debug!(phase = %self.phase, "Event after leaving the game, ignored");
            return;
        }

        match event {
            SessionEvent::Updated(session) => {
                if let Some(previous) = &self.current_state {
                    if !session.is_successor_of(previous) {
                        warn!(
                            from = %previous.status(),
                            to = %session.status(),
                            "Session changed non-monotonically"
                        );
                    }
                }
                debug!(
                    status = %session.status(),
                    last_move = %session.last_move_time(),
                    "Session updated"
                );
                if session.status() == SessionStatus::Finished {
                    info!(winner = ?session.winner(), "Game finished");
                }
                self.move_in_flight = false;
                self.notice = None;
                self.current_state = Some(session);
            }
            SessionEvent::Deleted => {
                info!("Session gone");
                self.current_state = None;
                self.move_in_flight = false;
                self.phase = Phase::Gone;
                self.notice = Some(StatusLine::SessionGone);
            }
            SessionEvent::Failed(SyncError::Malformed(e)) => {
                debug!(error = %e, "Keeping previous state");
            }
            SessionEvent::Failed(SyncError::Connection(e)) => {
                warn!(error = %e, "Lost the session subscription");
                self.move_in_flight = false;
                self.phase = Phase::Gone;
                self.notice = Some(StatusLine::ConnectionLost);
            }
        }
    }

    /// Current screen.
    #[instrument(level = "trace", skip(self))]
    pub fn view(&self) -> BoardView {
        project(&ClientView {
            phase: self.phase,
            session: self.current_state.as_ref(),
            my_mark: self.my_mark(),
            my_id: self.platform.client_id(),
            namespace: self.platform.namespace(),
            notice: self.notice.as_ref(),
            busy: self.matchmaker.is_busy(),
        })
    }
}
