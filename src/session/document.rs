//! The shared session document: one per match.

use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, trace};

use super::{SessionError, SessionPatch};
use crate::games::tictactoe::{Board, Evaluation, Mark, evaluate};

/// Opaque identifier of a client, assigned at sign-in.
pub type ClientId = String;

/// Lifecycle of a session. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created by player X, waiting for an opponent.
    Waiting,
    /// Both players present, moves in progress.
    Ready,
    /// A winner or a draw has been recorded.
    Finished,
}

impl SessionStatus {
    /// Checks whether `self -> next` is an allowed transition (or no change).
    #[instrument(level = "trace")]
    pub fn may_become(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Waiting, SessionStatus::Waiting | SessionStatus::Ready)
                | (SessionStatus::Ready, SessionStatus::Ready | SessionStatus::Finished)
                | (SessionStatus::Finished, SessionStatus::Finished)
        )
    }
}

/// Recorded result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Winner {
    /// X completed a line.
    X,
    /// O completed a line.
    O,
    /// Board filled without a line.
    #[serde(rename = "DRAW")]
    #[strum(serialize = "DRAW")]
    Draw,
}

impl Winner {
    /// Maps a terminal evaluation to the stored winner; `None` while ongoing.
    #[instrument(level = "trace")]
    pub fn from_evaluation(evaluation: Evaluation) -> Option<Self> {
        match evaluation {
            Evaluation::Won(Mark::X) => Some(Winner::X),
            Evaluation::Won(Mark::O) => Some(Winner::O),
            Evaluation::Draw => Some(Winner::Draw),
            Evaluation::Ongoing => None,
        }
    }

    /// The winning mark, or `None` for a draw.
    #[instrument(level = "trace")]
    pub fn mark(self) -> Option<Mark> {
        match self {
            Winner::X => Some(Mark::X),
            Winner::O => Some(Mark::O),
            Winner::Draw => None,
        }
    }
}

/// Identity of one seat in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct PlayerSlot {
    /// Client identifier.
    pub id: ClientId,
    /// Display name.
    pub name: String,
}

/// Full state of one match as stored in the shared document store.
///
/// Field names on the wire are camelCase (`currentPlayer`, `playerXId`, ...).
/// Decode with [`Session::from_value`], which rejects documents that break
/// the session invariants instead of trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    board: Board,
    status: SessionStatus,
    current_player: Mark,
    player_x_id: ClientId,
    player_x_name: String,
    player_o_id: Option<ClientId>,
    player_o_name: Option<String>,
    winner: Option<Winner>,
    last_move_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh WAITING session hosted by `host` as X.
    #[instrument(skip(host), fields(host_id = %host.id))]
    pub fn new_waiting(host: PlayerSlot, now: DateTime<Utc>) -> Self {
        Self {
            board: Board::new(),
            status: SessionStatus::Waiting,
            current_player: Mark::X,
            player_x_id: host.id,
            player_x_name: host.name,
            player_o_id: None,
            player_o_name: None,
            winner: None,
            last_move_time: now,
            created_at: now,
        }
    }

    /// Decodes and validates a raw document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encoding`] when the shape is wrong and
    /// [`SessionError::Malformed`] when an invariant does not hold.
    #[instrument(level = "debug", skip(value))]
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        let session: Session = serde_json::from_value(value)?;
        session.validate()?;
        Ok(session)
    }

    /// Encodes this session as a document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encoding`] if serialization fails.
    #[instrument(level = "trace", skip(self))]
    pub fn to_value(&self) -> Result<Value, SessionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Checks the invariants every stored session must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Malformed`] naming the first broken invariant.
    #[instrument(level = "trace", skip(self))]
    pub fn validate(&self) -> Result<(), SessionError> {
        let finished = self.status == SessionStatus::Finished;
        if self.winner.is_some() != finished {
            return Err(SessionError::malformed(format!(
                "winner {:?} does not match status {}",
                self.winner, self.status
            )));
        }

        let joined = self.player_o_id.is_some();
        if joined == (self.status == SessionStatus::Waiting) {
            return Err(SessionError::malformed(format!(
                "player O presence ({}) does not match status {}",
                joined, self.status
            )));
        }

        let xs = self.board.count(Mark::X);
        let os = self.board.count(Mark::O);
        if xs < os || xs - os > 1 {
            return Err(SessionError::malformed(format!(
                "mark counts out of alternation: {} X, {} O",
                xs, os
            )));
        }

        if self.status == SessionStatus::Waiting && xs + os > 0 {
            return Err(SessionError::malformed("moves recorded before opponent joined"));
        }

        if self.status == SessionStatus::Ready {
            if evaluate(&self.board).is_terminal() {
                return Err(SessionError::malformed("terminal board left in READY"));
            }
            let expected = if xs == os { Mark::X } else { Mark::O };
            if self.current_player != expected {
                return Err(SessionError::malformed(format!(
                    "current player {} but {} is due",
                    self.current_player, expected
                )));
            }
        }

        trace!(status = %self.status, xs, os, "Session validated");
        Ok(())
    }

    /// Checks that `self` can follow `previous`: status never regresses and
    /// no claimed cell changes.
    #[instrument(level = "trace", skip_all, fields(from = %previous.status, to = %self.status))]
    pub fn is_successor_of(&self, previous: &Session) -> bool {
        if !previous.status.may_become(self.status) {
            return false;
        }
        previous
            .board
            .cells()
            .iter()
            .zip(self.board.cells())
            .all(|(before, after)| before.mark().is_none() || before == after)
    }

    /// Merges a patch into this session.
    #[instrument(level = "debug", skip_all)]
    pub fn apply_patch(&mut self, patch: &SessionPatch) {
        if let Some(board) = patch.board {
            self.board = board;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(mark) = patch.current_player {
            self.current_player = mark;
        }
        if let Some(id) = &patch.player_o_id {
            self.player_o_id = Some(id.clone());
        }
        if let Some(name) = &patch.player_o_name {
            self.player_o_name = Some(name.clone());
        }
        if let Some(winner) = patch.winner {
            self.winner = Some(winner);
        }
        if let Some(time) = patch.last_move_time {
            self.last_move_time = time;
        }
    }

    /// Returns the board.
    #[instrument(level = "trace", skip(self))]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the lifecycle status.
    #[instrument(level = "trace", skip(self))]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns whose move is next.
    #[instrument(level = "trace", skip(self))]
    pub fn current_player(&self) -> Mark {
        self.current_player
    }

    /// Returns the recorded result, if finished.
    #[instrument(level = "trace", skip(self))]
    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    /// Returns the host seat.
    #[instrument(level = "trace", skip(self))]
    pub fn player_x(&self) -> PlayerSlot {
        PlayerSlot::new(self.player_x_id.clone(), self.player_x_name.clone())
    }

    /// Returns the joined seat, absent while waiting.
    #[instrument(level = "trace", skip(self))]
    pub fn player_o(&self) -> Option<PlayerSlot> {
        let id = self.player_o_id.clone()?;
        Some(PlayerSlot::new(id, self.player_o_name.clone().unwrap_or_default()))
    }

    /// Returns which mark `client_id` plays in this session.
    #[instrument(level = "trace", skip(self))]
    pub fn mark_of(&self, client_id: &str) -> Option<Mark> {
        if self.player_x_id == client_id {
            Some(Mark::X)
        } else if self.player_o_id.as_deref() == Some(client_id) {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// True while moves may be played.
    #[instrument(level = "trace", skip(self))]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Ready && self.winner.is_none()
    }

    /// Time of the last write that touched the game.
    #[instrument(level = "trace", skip(self))]
    pub fn last_move_time(&self) -> DateTime<Utc> {
        self.last_move_time
    }

    /// Creation time.
    #[instrument(level = "trace", skip(self))]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn waiting() -> Value {
        json!({
            "board": ["", "", "", "", "", "", "", "", ""],
            "status": "WAITING",
            "currentPlayer": "X",
            "playerXId": "alice-id",
            "playerXName": "Alice",
            "playerOId": null,
            "playerOName": null,
            "winner": null,
            "lastMoveTime": "2024-05-01T10:00:00Z",
            "createdAt": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_decodes_document_written_by_web_client() {
        let session = Session::from_value(waiting()).unwrap();
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.player_x().name, "Alice");
        assert!(session.player_o().is_none());
        assert_eq!(session.mark_of("alice-id"), Some(Mark::X));
    }

    #[test]
    fn test_missing_optional_fields_decode_as_absent() {
        let mut doc = waiting();
        let map = doc.as_object_mut().unwrap();
        map.remove("playerOId");
        map.remove("playerOName");
        map.remove("winner");
        assert!(Session::from_value(doc).is_ok());
    }

    #[test]
    fn test_encoding_round_trips_field_names() {
        let host = PlayerSlot::new("h".to_string(), "Host".to_string());
        let session = Session::new_waiting(host, Utc::now());
        let value = session.to_value().unwrap();
        assert_eq!(value["status"], "WAITING");
        assert_eq!(value["currentPlayer"], "X");
        assert_eq!(value["playerXId"], "h");
        assert!(value["playerOId"].is_null());
        assert!(value["winner"].is_null());
    }

    #[test]
    fn test_rejects_winner_without_finished() {
        let mut doc = waiting();
        doc["winner"] = json!("X");
        assert!(matches!(
            Session::from_value(doc),
            Err(SessionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_ready_without_player_o() {
        let mut doc = waiting();
        doc["status"] = json!("READY");
        assert!(matches!(
            Session::from_value(doc),
            Err(SessionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_status() {
        let mut doc = waiting();
        doc["status"] = json!("PAUSED");
        assert!(matches!(
            Session::from_value(doc),
            Err(SessionError::Encoding { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_turn_board() {
        let mut doc = waiting();
        doc["status"] = json!("READY");
        doc["playerOId"] = json!("bob-id");
        doc["playerOName"] = json!("Bob");
        doc["board"] = json!(["X", "X", "", "", "", "", "", "", ""]);
        assert!(matches!(
            Session::from_value(doc),
            Err(SessionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_status_only_moves_forward() {
        use SessionStatus::*;
        assert!(Waiting.may_become(Ready));
        assert!(Ready.may_become(Finished));
        assert!(!Waiting.may_become(Finished));
        assert!(!Finished.may_become(Ready));
        assert!(!Ready.may_become(Waiting));
    }

    #[test]
    fn test_successor_rejects_overwritten_cell() {
        let mut doc = waiting();
        doc["status"] = json!("READY");
        doc["playerOId"] = json!("bob-id");
        doc["playerOName"] = json!("Bob");
        doc["board"] = json!(["X", "", "", "", "", "", "", "", ""]);
        doc["currentPlayer"] = json!("O");
        let before = Session::from_value(doc.clone()).unwrap();

        doc["board"] = json!(["O", "X", "", "", "", "", "", "", ""]);
        doc["currentPlayer"] = json!("X");
        let after: Session = serde_json::from_value(doc).unwrap();
        assert!(!after.is_successor_of(&before));
    }
}
