//! Matchmaking: attach a client to a shared session, as X or O.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use derive_more::{Display, Error};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::games::tictactoe::Mark;
use crate::platform::PlatformContext;
use crate::session::{PlayerSlot, Session, SessionError, SessionPatch, SessionStatus};
use crate::store::{
    Document, DocumentRef, Filter, StoreError, StoreErrorKind, TransactionFn, with_timeout,
};

/// Why matchmaking failed.
#[derive(Debug, Clone, Display, Error)]
pub enum MatchmakingError {
    /// The store could not be reached; the player may retry.
    #[display("Could not reach the game store: {}", _0)]
    Connection(StoreError),
    /// Another client claimed the session first.
    #[display("The game was taken by another player")]
    SessionAlreadyFull,
    /// A search is already running for this client.
    #[display("Already looking for a game")]
    Busy,
    /// The store returned a session we refuse to trust.
    #[display("{}", _0)]
    Malformed(SessionError),
}

impl MatchmakingError {
    /// True when calling again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MatchmakingError::Connection(_) | MatchmakingError::SessionAlreadyFull
        )
    }
}

impl From<SessionError> for MatchmakingError {
    fn from(err: SessionError) -> Self {
        Self::Malformed(err)
    }
}

/// Reference to the session a client is seated in, plus its mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    reference: DocumentRef,
    mark: Mark,
}

impl SessionHandle {
    /// Creates a handle.
    pub fn new(reference: DocumentRef, mark: Mark) -> Self {
        Self { reference, mark }
    }

    /// The session document.
    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    /// The mark this client plays, fixed for the whole match.
    pub fn mark(&self) -> Mark {
        self.mark
    }
}

/// Holds the busy flag for the lifetime of one search.
#[derive(Debug)]
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn store_failure(err: StoreError) -> MatchmakingError {
    match err.kind {
        StoreErrorKind::Aborted(_) | StoreErrorKind::NotFound(_) => {
            MatchmakingError::SessionAlreadyFull
        }
        _ => MatchmakingError::Connection(err),
    }
}

/// Finds an open session or creates one.
///
/// Clones share the busy flag, so at most one search per client runs at a
/// time.
#[derive(Debug, Clone)]
pub struct Matchmaker {
    platform: PlatformContext,
    join_retries: u32,
    busy: Arc<AtomicBool>,
}

impl Matchmaker {
    /// Creates a matchmaker for the signed-in client.
    #[instrument(skip(platform), fields(client_id = %platform.client_id()))]
    pub fn new(platform: PlatformContext, join_retries: u32) -> Self {
        Self {
            platform,
            join_retries,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a search is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Joins the oldest WAITING session as O, or creates a new one as X.
    ///
    /// A lost join race is retried up to the configured number of times
    /// before [`MatchmakingError::SessionAlreadyFull`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MatchmakingError::Busy`] if a search is already running,
    /// [`MatchmakingError::Connection`] if the store is unreachable, and
    /// [`MatchmakingError::SessionAlreadyFull`] when retries run out.
    #[instrument(skip(self), fields(client_id = %self.platform.client_id()))]
    pub async fn find_or_create_game(
        &self,
        display_name: &str,
    ) -> Result<SessionHandle, MatchmakingError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            debug!("Search already outstanding");
            MatchmakingError::Busy
        })?;

        let mut retries = 0;
        loop {
            match self.attempt(display_name).await {
                Err(MatchmakingError::SessionAlreadyFull) if retries < self.join_retries => {
                    retries += 1;
                    warn!(retries, "Lost the join race, searching again");
                }
                outcome => return outcome,
            }
        }
    }

    async fn attempt(&self, display_name: &str) -> Result<SessionHandle, MatchmakingError> {
        let waiting = self.waiting_sessions().await?;
        let my_id = self.platform.client_id();

        if let Some((own, session)) = waiting.iter().find(|(_, s)| s.player_x().id == *my_id) {
            info!(
                reference = %own,
                created_at = %session.created_at(),
                "Resuming own waiting session"
            );
            return Ok(SessionHandle::new(own.clone(), Mark::X));
        }

        match waiting.into_iter().next() {
            Some((reference, _)) => self.join_session(&reference, display_name).await,
            None => self.create_session(display_name).await,
        }
    }

    /// WAITING sessions in creation order, skipping documents that fail
    /// validation.
    async fn waiting_sessions(&self) -> Result<Vec<(DocumentRef, Session)>, MatchmakingError> {
        let collection = self.platform.games_collection();
        let filter = Filter::eq("status", SessionStatus::Waiting.to_string());
        let documents = with_timeout(
            *self.platform.store_timeout(),
            self.platform.store().query(&collection, &filter),
        )
        .await
        .map_err(MatchmakingError::Connection)?;

        let sessions: Vec<_> = documents
            .into_iter()
            .filter_map(|Document { reference, data }| match Session::from_value(data) {
                Ok(session) => Some((reference, session)),
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Skipping malformed waiting session");
                    None
                }
            })
            .collect();
        debug!(count = sessions.len(), "Waiting sessions found");
        Ok(sessions)
    }

    /// Claims seat O of `reference` in one transaction.
    ///
    /// The transaction re-reads the document and aborts unless it is still
    /// WAITING, so of two clients racing for the same session exactly one
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MatchmakingError::SessionAlreadyFull`] if the session was
    /// claimed or removed first, [`MatchmakingError::Connection`] if the
    /// store is unreachable.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn join_session(
        &self,
        reference: &DocumentRef,
        display_name: &str,
    ) -> Result<SessionHandle, MatchmakingError> {
        let guest = PlayerSlot::new(self.platform.client_id().clone(), display_name.to_string());
        let patch = SessionPatch::join(guest, Utc::now()).to_value()?;

        let apply: TransactionFn = Box::new(move |current: Option<&Value>| {
            let current = current.ok_or_else(|| StoreError::aborted("session no longer exists"))?;
            let session = Session::from_value(current.clone())
                .map_err(|e| StoreError::aborted(e.to_string()))?;
            if session.status() != SessionStatus::Waiting {
                return Err(StoreError::aborted(format!("session is {}", session.status())));
            }
            Ok(patch)
        });

        let committed = with_timeout(
            *self.platform.store_timeout(),
            self.platform.store().run_transaction(reference, apply),
        )
        .await
        .map_err(store_failure)?;

        let session = Session::from_value(committed)?;
        info!(
            host = %session.player_x().name,
            "Joined session as O"
        );
        Ok(SessionHandle::new(reference.clone(), Mark::O))
    }

    /// Creates a fresh WAITING session hosted by this client as X.
    ///
    /// # Errors
    ///
    /// Returns [`MatchmakingError::Connection`] if the store is unreachable.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        display_name: &str,
    ) -> Result<SessionHandle, MatchmakingError> {
        let host = PlayerSlot::new(self.platform.client_id().clone(), display_name.to_string());
        let data = Session::new_waiting(host, Utc::now()).to_value()?;
        let collection = self.platform.games_collection();

        let reference = with_timeout(
            *self.platform.store_timeout(),
            self.platform.store().create_document(&collection, data),
        )
        .await
        .map_err(MatchmakingError::Connection)?;

        info!(id = reference.id(), collection = reference.collection(), "Created session as X");
        Ok(SessionHandle::new(reference, Mark::X))
    }
}
