//! In-process document store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    Document, DocumentRef, DocumentStore, DocumentStream, Filter, StoreError, StoreErrorKind,
    TransactionFn,
};

#[derive(Debug)]
struct StoredDocument {
    data: Value,
    sequence: u64,
    watchers: watch::Sender<Option<Value>>,
}

impl StoredDocument {
    fn publish(&self) {
        self.watchers.send_replace(Some(self.data.clone()));
    }
}

/// Document store held in memory and shared by every clone.
///
/// Transactions run under a single lock, so two concurrent
/// read-verify-write attempts on one document are serialized and the
/// second one sees the first one's commit. [`MemoryStore::set_online`]
/// simulates an unreachable store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<DocumentRef, StoredDocument>>>,
    online: Arc<watch::Sender<bool>>,
    sequence: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Creates an empty, reachable store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory document store");
        let (online, _) = watch::channel(true);
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            online: Arc::new(online),
            sequence: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes the store reachable or unreachable. Going offline fails every
    /// call and ends open subscriptions with an error.
    #[instrument(skip(self))]
    pub fn set_online(&self, online: bool) {
        info!(online, "Store reachability changed");
        self.online.send_replace(online);
    }

    /// Whether calls currently succeed.
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Number of committed writes (creates, updates, transactions, deletes).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents of a document, bypassing reachability.
    pub async fn snapshot(&self, reference: &DocumentRef) -> Option<Value> {
        self.documents
            .lock()
            .await
            .get(reference)
            .map(|doc| doc.data.clone())
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_online() {
            Ok(())
        } else {
            warn!("Store call while offline");
            Err(StoreError::new(StoreErrorKind::Unavailable(
                "memory store is offline".to_string(),
            )))
        }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow merge: top-level keys of `patch` replace those of `target`.
fn merge(target: &mut Value, patch: Value) -> Result<(), StoreError> {
    match (target.as_object_mut(), patch) {
        (Some(fields), Value::Object(updates)) => {
            fields.extend(updates);
            Ok(())
        }
        (_, other) => Err(StoreError::new(StoreErrorKind::Encoding(format!(
            "partial update must be an object, got {}",
            other
        )))),
    }
}

fn not_found(reference: &DocumentRef) -> StoreError {
    StoreError::new(StoreErrorKind::NotFound(reference.to_string()))
}

fn document_stream(
    mut docs: watch::Receiver<Option<Value>>,
    online: watch::Receiver<bool>,
) -> DocumentStream {
    let initial = docs.borrow_and_update().clone();
    if initial.is_none() {
        return stream::once(async { Ok::<_, StoreError>(None) }).boxed();
    }

    let changes = stream::unfold(Some((docs, online)), |state| async move {
        let (mut docs, mut online) = state?;
        loop {
            tokio::select! {
                changed = docs.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let snapshot = docs.borrow_and_update().clone();
                    let next = snapshot.is_some().then_some((docs, online));
                    return Some((Ok(snapshot), next));
                }
                changed = online.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let up = *online.borrow_and_update();
                    if !up {
                        let err = StoreError::new(StoreErrorKind::Unavailable(
                            "subscription lost: store went offline".to_string(),
                        ));
                        return Some((Err(err), None));
                    }
                }
            }
        }
    });

    stream::once(async move { Ok(initial) }).chain(changes).boxed()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[instrument(skip(self, filter))]
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.ensure_online()?;
        let documents = self.documents.lock().await;

        let mut matches: Vec<_> = documents
            .iter()
            .filter(|(reference, doc)| {
                reference.collection() == collection && filter.matches(&doc.data)
            })
            .collect();
        matches.sort_by_key(|(_, doc)| doc.sequence);

        let found: Vec<_> = matches
            .into_iter()
            .map(|(reference, doc)| Document {
                reference: reference.clone(),
                data: doc.data.clone(),
            })
            .collect();
        debug!(count = found.len(), "Query answered");
        Ok(found)
    }

    #[instrument(skip(self, apply), fields(reference = %reference))]
    async fn run_transaction(
        &self,
        reference: &DocumentRef,
        apply: TransactionFn,
    ) -> Result<Value, StoreError> {
        self.ensure_online()?;
        let mut documents = self.documents.lock().await;

        let patch = apply(documents.get(reference).map(|doc| &doc.data)).inspect_err(|e| {
            debug!(error = %e, "Transaction aborted by body");
        })?;

        let doc = documents
            .get_mut(reference)
            .ok_or_else(|| not_found(reference))?;
        merge(&mut doc.data, patch)?;
        doc.publish();
        self.record_write();

        debug!("Transaction committed");
        Ok(doc.data.clone())
    }

    #[instrument(skip(self, data))]
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> Result<DocumentRef, StoreError> {
        self.ensure_online()?;
        let reference = DocumentRef::new(collection, Uuid::new_v4().simple().to_string());
        let (watchers, _) = watch::channel(Some(data.clone()));
        let stored = StoredDocument {
            data,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            watchers,
        };

        self.documents.lock().await.insert(reference.clone(), stored);
        self.record_write();

        info!(reference = %reference, "Document created");
        Ok(reference)
    }

    #[instrument(skip(self, patch), fields(reference = %reference))]
    async fn update_document(&self, reference: &DocumentRef, patch: Value) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut documents = self.documents.lock().await;

        let doc = documents
            .get_mut(reference)
            .ok_or_else(|| not_found(reference))?;
        merge(&mut doc.data, patch)?;
        doc.publish();
        self.record_write();

        debug!("Document updated");
        Ok(())
    }

    #[instrument(skip(self), fields(reference = %reference))]
    async fn delete_document(&self, reference: &DocumentRef) -> Result<(), StoreError> {
        self.ensure_online()?;
        let removed = self
            .documents
            .lock()
            .await
            .remove(reference)
            .ok_or_else(|| not_found(reference))?;
        removed.watchers.send_replace(None);
        self.record_write();

        info!("Document deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(reference = %reference))]
    async fn subscribe(&self, reference: &DocumentRef) -> Result<DocumentStream, StoreError> {
        self.ensure_online()?;
        let documents = self.documents.lock().await;

        let receiver = match documents.get(reference) {
            Some(doc) => doc.watchers.subscribe(),
            None => {
                debug!("Subscribing to a missing document");
                watch::channel(None).1
            }
        };

        Ok(document_stream(receiver, self.online.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GAMES: &str = "artifacts/test/public/data/games";

    #[tokio::test]
    async fn test_query_filters_and_orders_by_creation() {
        let store = MemoryStore::new();
        let first = store
            .create_document(GAMES, json!({"status": "WAITING", "n": 1}))
            .await
            .unwrap();
        store
            .create_document(GAMES, json!({"status": "READY", "n": 2}))
            .await
            .unwrap();
        store
            .create_document(GAMES, json!({"status": "WAITING", "n": 3}))
            .await
            .unwrap();
        store
            .create_document("other", json!({"status": "WAITING"}))
            .await
            .unwrap();

        let found = store
            .query(GAMES, &Filter::eq("status", "WAITING"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].reference, first);
        assert_eq!(found[1].data["n"], 3);
    }

    #[tokio::test]
    async fn test_update_merges_shallowly() {
        let store = MemoryStore::new();
        let reference = store
            .create_document(GAMES, json!({"a": 1, "b": 2}))
            .await
            .unwrap();
        store.update_document(&reference, json!({"b": 3})).await.unwrap();
        assert_eq!(store.snapshot(&reference).await, Some(json!({"a": 1, "b": 3})));
    }

    #[tokio::test]
    async fn test_aborted_transaction_writes_nothing() {
        let store = MemoryStore::new();
        let reference = store.create_document(GAMES, json!({"a": 1})).await.unwrap();
        let before = store.write_count();

        let result = store
            .run_transaction(
                &reference,
                Box::new(|_: Option<&Value>| Err(StoreError::aborted("no"))),
            )
            .await;

        assert!(matches!(
            result.map_err(|e| e.kind),
            Err(StoreErrorKind::Aborted(_))
        ));
        assert_eq!(store.write_count(), before);
        assert_eq!(store.snapshot(&reference).await, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_offline_store_rejects_calls() {
        let store = MemoryStore::new();
        store.set_online(false);
        let err = store.create_document(GAMES, json!({})).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_subscription_sees_current_then_changes_then_deletion() {
        let store = MemoryStore::new();
        let reference = store.create_document(GAMES, json!({"v": 1})).await.unwrap();
        let mut stream = store.subscribe(&reference).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), Some(json!({"v": 1})));

        store.update_document(&reference, json!({"v": 2})).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Some(json!({"v": 2})));

        store.delete_document(&reference).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_fails_when_store_goes_offline() {
        let store = MemoryStore::new();
        let reference = store.create_document(GAMES, json!({"v": 1})).await.unwrap();
        let mut stream = store.subscribe(&reference).await.unwrap();
        stream.next().await.unwrap().unwrap();

        store.set_online(false);
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribing_to_missing_document_reports_deletion() {
        let store = MemoryStore::new();
        let reference = DocumentRef::new(GAMES, "nope");
        let mut stream = store.subscribe(&reference).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert!(stream.next().await.is_none());
    }
}
