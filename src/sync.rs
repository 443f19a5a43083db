//! Live subscription to the session a client is seated in.

use std::time::Duration;

use derive_more::{Display, Error};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::session::{Session, SessionError};
use crate::store::{DocumentRef, DocumentStore, DocumentStream, StoreError, with_timeout};

/// Failure delivered through the subscription.
#[derive(Debug, Clone, Display, Error)]
pub enum SyncError {
    /// The subscription could not be opened or was lost.
    #[display("Connection lost: {}", _0)]
    Connection(StoreError),
    /// A snapshot failed validation. The subscription stays open.
    #[display("Ignoring invalid session update: {}", _0)]
    Malformed(SessionError),
}

/// What the subscription observed.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The current validated state of the session.
    Updated(Session),
    /// The session document is gone. No further events follow.
    Deleted,
    /// See [`SyncError`]. A connection failure ends the subscription.
    Failed(SyncError),
}

struct Subscription {
    reference: DocumentRef,
    stream: DocumentStream,
}

/// Holds at most one live subscription.
///
/// Dropping the channel, calling [`SyncChannel::unsubscribe`] or subscribing
/// to another session cancels the current one.
#[derive(Default)]
pub struct SyncChannel {
    active: Option<Subscription>,
}

impl std::fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannel")
            .field("reference", &self.reference())
            .finish()
    }
}

impl SyncChannel {
    /// Creates a channel with no subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any current subscription with one to `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connection`] if the store refuses or does not
    /// answer within `timeout`; the channel is then left unsubscribed.
    #[instrument(skip(self, store, timeout), fields(reference = %reference))]
    pub async fn subscribe(
        &mut self,
        store: &dyn DocumentStore,
        reference: &DocumentRef,
        timeout: Duration,
    ) -> Result<(), SyncError> {
        self.unsubscribe();

        let stream = with_timeout(timeout, store.subscribe(reference))
            .await
            .map_err(SyncError::Connection)?;

        self.active = Some(Subscription {
            reference: reference.clone(),
            stream,
        });
        info!("Subscribed to session");
        Ok(())
    }

    /// Cancels the current subscription, if any.
    pub fn unsubscribe(&mut self) {
        if let Some(subscription) = self.active.take() {
            debug!(reference = %subscription.reference, "Unsubscribed");
        }
    }

    /// Whether a subscription is open.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The subscribed session, if any.
    pub fn reference(&self) -> Option<&DocumentRef> {
        self.active.as_ref().map(|s| &s.reference)
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once there is no subscription. Deletion and
    /// connection failures close the subscription after being reported.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let subscription = self.active.as_mut()?;
        let reference = subscription.reference.clone();

        let event = match subscription.stream.next().await {
            Some(Ok(Some(value))) => match Session::from_value(value) {
                Ok(session) => {
                    debug!(reference = %reference, status = %session.status(), "Session update");
                    SessionEvent::Updated(session)
                }
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Rejected session update");
                    SessionEvent::Failed(SyncError::Malformed(e))
                }
            },
            Some(Ok(None)) => {
                info!(reference = %reference, "Session deleted");
                self.active = None;
                SessionEvent::Deleted
            }
            Some(Err(e)) => {
                warn!(reference = %reference, error = %e, "Subscription failed");
                self.active = None;
                SessionEvent::Failed(SyncError::Connection(e))
            }
            None => {
                debug!(reference = %reference, "Subscription closed by store");
                self.active = None;
                return None;
            }
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    const GAMES: &str = "artifacts/test/public/data/games";
    const LIMIT: Duration = Duration::from_secs(1);

    fn waiting() -> serde_json::Value {
        json!({
            "board": ["", "", "", "", "", "", "", "", ""],
            "status": "WAITING",
            "currentPlayer": "X",
            "playerXId": "x",
            "playerXName": "Xena",
            "lastMoveTime": "2024-05-01T10:00:00Z",
            "createdAt": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_malformed_update_keeps_subscription() {
        let store = MemoryStore::new();
        let reference = store.create_document(GAMES, waiting()).await.unwrap();
        let mut channel = SyncChannel::new();
        channel.subscribe(&store, &reference, LIMIT).await.unwrap();
        assert!(matches!(channel.next_event().await, Some(SessionEvent::Updated(_))));

        store
            .update_document(&reference, json!({"winner": "X"}))
            .await
            .unwrap();
        assert!(matches!(
            channel.next_event().await,
            Some(SessionEvent::Failed(SyncError::Malformed(_)))
        ));
        assert!(channel.is_active());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_events() {
        let store = MemoryStore::new();
        let reference = store.create_document(GAMES, waiting()).await.unwrap();
        let mut channel = SyncChannel::new();
        channel.subscribe(&store, &reference, LIMIT).await.unwrap();
        channel.unsubscribe();
        assert!(channel.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous() {
        let store = MemoryStore::new();
        let first = store.create_document(GAMES, waiting()).await.unwrap();
        let second = store.create_document(GAMES, waiting()).await.unwrap();
        let mut channel = SyncChannel::new();
        channel.subscribe(&store, &first, LIMIT).await.unwrap();
        channel.subscribe(&store, &second, LIMIT).await.unwrap();
        assert_eq!(channel.reference(), Some(&second));
    }
}
