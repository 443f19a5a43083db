//! Partial session writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PlayerSlot, SessionError, SessionStatus, Winner};
use crate::games::tictactoe::{Board, Mark};

/// A partial update to a session document.
///
/// Only the fields a writer owns are set; everything else is left out of
/// the serialized form so the store merges it without touching other fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    /// Replacement board.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<Board>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    /// Next mark to move.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<Mark>,
    /// Joining client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_o_id: Option<String>,
    /// Joining client display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_o_name: Option<String>,
    /// Final result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    /// Move-time marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_move_time: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// The write that seats `guest` as O and starts the game with X to move.
    pub fn join(guest: PlayerSlot, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(SessionStatus::Ready),
            current_player: Some(Mark::X),
            player_o_id: Some(guest.id),
            player_o_name: Some(guest.name),
            last_move_time: Some(now),
            ..Self::default()
        }
    }

    /// Encodes the patch as a partial document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encoding`] if serialization fails.
    pub fn to_value(&self) -> Result<Value, SessionError> {
        Ok(serde_json::to_value(self)?)
    }
}
