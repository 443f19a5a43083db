//! Tests for finding, joining and hosting sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tictactoe_sync::{
    ClientConfig, Document, DocumentRef, DocumentStore, DocumentStream, Filter, Mark, Matchmaker,
    MatchmakingError, MemoryStore, Session, SessionHandle, SessionStatus, StoreError,
    StoreErrorKind, TransactionFn, authenticate,
};

async fn matchmaker(store: &Arc<dyn DocumentStore>, retries: u32) -> Matchmaker {
    let config = ClientConfig::default().with_namespace("mm-test");
    let platform = authenticate(&config, store.clone())
        .await
        .expect("Sign-in failed");
    Matchmaker::new(platform, retries)
}

async fn waiting_count(store: &MemoryStore) -> usize {
    store
        .query(
            "artifacts/mm-test/public/data/games",
            &Filter::eq("status", "WAITING"),
        )
        .await
        .expect("Query failed")
        .len()
}

#[tokio::test]
async fn test_first_hosts_second_joins() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let alice = matchmaker(&shared, 3).await;
    let bob = matchmaker(&shared, 3).await;

    let host = alice.find_or_create_game("Alice").await.expect("Host failed");
    assert_eq!(host.mark(), Mark::X);
    assert_eq!(waiting_count(&store).await, 1);

    let guest = bob.find_or_create_game("Bob").await.expect("Join failed");
    assert_eq!(guest.mark(), Mark::O);
    assert_eq!(guest.reference(), host.reference());

    let data = store.snapshot(host.reference()).await.expect("Session missing");
    let session = Session::from_value(data).expect("Session invalid");
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(session.current_player(), Mark::X);
    assert_eq!(session.player_o().map(|p| p.name), Some("Bob".to_string()));
    assert_eq!(waiting_count(&store).await, 0);
}

#[tokio::test]
async fn test_second_join_of_same_session_is_refused() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let host = matchmaker(&shared, 3)
        .await
        .find_or_create_game("Alice")
        .await
        .expect("Host failed");

    let carol = matchmaker(&shared, 3).await;
    let dave = matchmaker(&shared, 3).await;
    carol
        .join_session(host.reference(), "Carol")
        .await
        .expect("First join failed");
    let writes = store.write_count();

    let late = dave.join_session(host.reference(), "Dave").await;
    assert!(matches!(late, Err(MatchmakingError::SessionAlreadyFull)));
    assert_eq!(store.write_count(), writes, "Refused join must not write");

    let data = store.snapshot(host.reference()).await.expect("Session missing");
    assert_eq!(data["playerOName"], "Carol");
}

/// Hands control back to the runtime before every query and transaction, so
/// two searches driven by `tokio::join!` interleave their reads and commits.
#[derive(Debug)]
struct YieldingStore {
    inner: MemoryStore,
    aborts: AtomicUsize,
}

impl YieldingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            aborts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.query(collection, filter).await
    }

    async fn run_transaction(
        &self,
        reference: &DocumentRef,
        apply: TransactionFn,
    ) -> Result<Value, StoreError> {
        tokio::task::yield_now().await;
        let result = self.inner.run_transaction(reference, apply).await;
        if let Err(StoreError {
            kind: StoreErrorKind::Aborted(_),
            ..
        }) = &result
        {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> Result<DocumentRef, StoreError> {
        self.inner.create_document(collection, data).await
    }

    async fn update_document(&self, reference: &DocumentRef, patch: Value) -> Result<(), StoreError> {
        self.inner.update_document(reference, patch).await
    }

    async fn delete_document(&self, reference: &DocumentRef) -> Result<(), StoreError> {
        self.inner.delete_document(reference).await
    }

    async fn subscribe(&self, reference: &DocumentRef) -> Result<DocumentStream, StoreError> {
        self.inner.subscribe(reference).await
    }
}

/// Alice hosts, then Carol and Dave search at the same time.
async fn race(
    retries: u32,
) -> (
    Arc<YieldingStore>,
    SessionHandle,
    Result<SessionHandle, MatchmakingError>,
    Result<SessionHandle, MatchmakingError>,
) {
    let yielding = Arc::new(YieldingStore::new(MemoryStore::new()));
    let shared: Arc<dyn DocumentStore> = yielding.clone();
    let host = matchmaker(&shared, retries)
        .await
        .find_or_create_game("Alice")
        .await
        .expect("Host failed");

    let carol = matchmaker(&shared, retries).await;
    let dave = matchmaker(&shared, retries).await;
    let (c, d) = tokio::join!(
        carol.find_or_create_game("Carol"),
        dave.find_or_create_game("Dave")
    );
    (yielding, host, c, d)
}

#[tokio::test]
async fn test_racing_joiners_without_retries_one_is_refused() {
    let (store, host, c, d) = race(0).await;

    assert_eq!(store.aborts.load(Ordering::SeqCst), 1, "Exactly one join aborts");
    let (won, lost) = match (c, d) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (c, d) => panic!("Expected one seat and one refusal, got {:?} and {:?}", c, d),
    };
    assert_eq!(won.reference(), host.reference());
    assert_eq!(won.mark(), Mark::O);
    assert!(matches!(lost, MatchmakingError::SessionAlreadyFull));

    let data = store
        .inner
        .snapshot(host.reference())
        .await
        .expect("Session missing");
    let session = Session::from_value(data).expect("Session invalid");
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(waiting_count(&store.inner).await, 0, "Loser created nothing");
}

#[tokio::test]
async fn test_racing_joiners_with_retries_loser_hosts() {
    let (store, host, c, d) = race(3).await;
    let (c, d) = (c.expect("Carol failed"), d.expect("Dave failed"));

    assert_eq!(store.aborts.load(Ordering::SeqCst), 1, "The loser retried once");
    let joined: Vec<_> = [&c, &d]
        .into_iter()
        .filter(|h| h.reference() == host.reference())
        .collect();
    assert_eq!(joined.len(), 1, "Exactly one racer joins Alice");
    assert_eq!(joined[0].mark(), Mark::O);

    let other = if c.reference() == host.reference() { &d } else { &c };
    assert_eq!(other.mark(), Mark::X, "The loser hosts a new session");
    assert_eq!(waiting_count(&store.inner).await, 1);
}

#[tokio::test]
async fn test_own_waiting_session_is_not_joined() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let alice = matchmaker(&shared, 3).await;

    let first = alice.find_or_create_game("Alice").await.expect("Host failed");
    let second = alice.find_or_create_game("Alice").await.expect("Search failed");

    assert_eq!(first, second);
    assert_eq!(second.mark(), Mark::X);
    assert_eq!(waiting_count(&store).await, 1);
}

#[tokio::test]
async fn test_outage_is_a_connection_error_and_frees_the_search() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let alice = matchmaker(&shared, 3).await;

    store.set_online(false);
    let result = alice.find_or_create_game("Alice").await;
    assert!(matches!(result, Err(MatchmakingError::Connection(_))));
    assert!(!alice.is_busy());

    store.set_online(true);
    assert!(alice.find_or_create_game("Alice").await.is_ok());
}

#[tokio::test]
async fn test_malformed_waiting_document_is_skipped() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let bad = store
        .create_document(
            "artifacts/mm-test/public/data/games",
            json!({"status": "WAITING", "board": "garbage"}),
        )
        .await
        .expect("Create failed");

    let bob = matchmaker(&shared, 3).await;
    let handle = bob.find_or_create_game("Bob").await.expect("Search failed");
    assert_ne!(handle.reference(), &bad);
    assert_eq!(handle.mark(), Mark::X);
}
