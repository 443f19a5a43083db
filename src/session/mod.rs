//! Session document model shared through the store.

mod document;
mod error;
mod patch;

pub use document::{ClientId, PlayerSlot, Session, SessionStatus, Winner};
pub use error::SessionError;
pub use patch::SessionPatch;
