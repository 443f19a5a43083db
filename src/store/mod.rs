//! The document store contract the game relies on.
//!
//! Sessions live in a multi-tenant document database reached through
//! [`DocumentStore`]: equality queries, atomic read-verify-write
//! transactions, partial updates and live document subscriptions.
//! [`MemoryStore`] is the in-process implementation.

mod error;
mod memory;

pub use error::{StoreError, StoreErrorKind};
pub use memory::MemoryStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Location of one document: `{collection}/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{}/{}", collection, id)]
pub struct DocumentRef {
    collection: String,
    id: String,
}

impl DocumentRef {
    /// Creates a reference.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Collection path.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document id within the collection.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A document returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where it lives.
    pub reference: DocumentRef,
    /// Its current contents.
    pub data: Value,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: String,
    value: Value,
}

impl Filter {
    /// Matches documents whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Checks a document against the filter.
    pub fn matches(&self, data: &Value) -> bool {
        data.get(&self.field) == Some(&self.value)
    }
}

/// Live view of one document. Yields its current contents first, then every
/// committed change in commit order (intermediate states may be skipped).
/// `Ok(None)` means the document was deleted and ends the stream.
pub type DocumentStream = BoxStream<'static, Result<Option<Value>, StoreError>>;

/// Body of a transaction: sees the current document (or `None`) and returns
/// the partial update to commit, or an error to abort with no effect.
pub type TransactionFn = Box<dyn FnOnce(Option<&Value>) -> Result<Value, StoreError> + Send>;

/// Operations the game needs from the shared document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Lists documents in `collection` matching `filter`, oldest first.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Atomically reads `reference`, runs `apply` and merges its result.
    /// Returns the committed document.
    async fn run_transaction(
        &self,
        reference: &DocumentRef,
        apply: TransactionFn,
    ) -> Result<Value, StoreError>;

    /// Creates a document with a fresh id.
    async fn create_document(&self, collection: &str, data: Value)
    -> Result<DocumentRef, StoreError>;

    /// Shallow-merges `patch` into an existing document.
    async fn update_document(&self, reference: &DocumentRef, patch: Value)
    -> Result<(), StoreError>;

    /// Removes a document; subscribers observe the deletion.
    async fn delete_document(&self, reference: &DocumentRef) -> Result<(), StoreError>;

    /// Opens a live subscription to one document.
    async fn subscribe(&self, reference: &DocumentRef) -> Result<DocumentStream, StoreError>;
}

/// Runs a store call, failing with [`StoreErrorKind::Timeout`] if it does
/// not settle within `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::new(StoreErrorKind::Timeout(
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_top_level_field() {
        let filter = Filter::eq("status", "WAITING");
        assert!(filter.matches(&json!({"status": "WAITING"})));
        assert!(!filter.matches(&json!({"status": "READY"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_reference_display() {
        let reference = DocumentRef::new("artifacts/app/public/data/games", "abc");
        assert_eq!(reference.to_string(), "artifacts/app/public/data/games/abc");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(())
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Timeout(10));
        assert!(err.is_connection());
    }
}
