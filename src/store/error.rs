//! Document store error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// What went wrong talking to the store.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StoreErrorKind {
    /// The store could not be reached.
    #[display("store unavailable: {}", _0)]
    Unavailable(String),
    /// A call did not settle in time.
    #[display("timed out after {} ms", _0)]
    Timeout(u64),
    /// The referenced document does not exist.
    #[display("document not found: {}", _0)]
    NotFound(String),
    /// A transaction gave up without writing anything.
    #[display("transaction aborted: {}", _0)]
    Aborted(String),
    /// A document could not be encoded or decoded.
    #[display("encoding error: {}", _0)]
    Encoding(String),
}

/// Store error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error: {} at {}:{}", kind, file, line)]
pub struct StoreError {
    /// Error kind.
    pub kind: StoreErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new store error with caller location tracking.
    #[track_caller]
    #[instrument(skip(kind))]
    pub fn new(kind: StoreErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for an aborted transaction.
    #[track_caller]
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Aborted(reason.into()))
    }

    /// True when the store itself is unreachable or too slow.
    pub fn is_connection(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Unavailable(_) | StoreErrorKind::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(StoreErrorKind::Encoding(err.to_string()))
    }
}
