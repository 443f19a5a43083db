//! Turn engine: validates a move against the latest snapshot and produces
//! the patch to write.
//!
//! Rejections are local. A move that fails here never reaches the store.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::games::tictactoe::{CELL_COUNT, Mark, evaluate};
use crate::session::{Session, SessionPatch, SessionStatus, Winner};

/// Why a move was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum MoveError {
    /// The session is waiting for an opponent or already finished.
    #[display("Game is not active")]
    GameNotActive,
    /// Cell index outside 0-8.
    #[display("Cell {} does not exist", index)]
    CellOutOfRange {
        /// The offending index.
        index: usize,
    },
    /// The other mark is due to move.
    #[display("It's not {}'s turn", mark)]
    NotYourTurn {
        /// The mark that tried to move.
        mark: Mark,
    },
    /// The cell is already claimed.
    #[display("Cell {} is already occupied", index)]
    CellOccupied {
        /// The occupied index.
        index: usize,
    },
}

/// Validates `acting` playing `cell_index` on `state` and builds the patch.
///
/// # Errors
///
/// Returns a [`MoveError`] when the session is not active, the index is out
/// of range, it is not `acting`'s turn, or the cell is taken, checked in that
/// order.
pub fn apply_move(
    state: &Session,
    cell_index: usize,
    acting: Mark,
) -> Result<SessionPatch, MoveError> {
    apply_move_at(state, cell_index, acting, Utc::now())
}

/// [`apply_move`] with an explicit move-time marker.
///
/// # Errors
///
/// See [`apply_move`].
#[instrument(skip(state, now), fields(status = %state.status(), current = %state.current_player()))]
pub fn apply_move_at(
    state: &Session,
    cell_index: usize,
    acting: Mark,
    now: DateTime<Utc>,
) -> Result<SessionPatch, MoveError> {
    if !state.is_active() {
        debug!("Move rejected: game not active");
        return Err(MoveError::GameNotActive);
    }
    if cell_index >= CELL_COUNT {
        warn!(cell_index, "Move rejected: out of range");
        return Err(MoveError::CellOutOfRange { index: cell_index });
    }
    if state.current_player() != acting {
        debug!("Move rejected: not this mark's turn");
        return Err(MoveError::NotYourTurn { mark: acting });
    }
    if !state.board().is_empty(cell_index) {
        debug!("Move rejected: cell occupied");
        return Err(MoveError::CellOccupied { index: cell_index });
    }

    let board = state.board().with_mark(cell_index, acting);
    let evaluation = evaluate(&board);

    let patch = match Winner::from_evaluation(evaluation) {
        Some(winner) => SessionPatch {
            board: Some(board),
            status: Some(SessionStatus::Finished),
            winner: Some(winner),
            last_move_time: Some(now),
            ..SessionPatch::default()
        },
        None => SessionPatch {
            board: Some(board),
            current_player: Some(acting.opponent()),
            last_move_time: Some(now),
            ..SessionPatch::default()
        },
    };

    debug!(%evaluation, "Move accepted");
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::Evaluation;
    use crate::session::PlayerSlot;

    fn ready_session() -> Session {
        let now = Utc::now();
        let mut session = Session::new_waiting(PlayerSlot::new("x".into(), "Xena".into()), now);
        session.apply_patch(&SessionPatch::join(PlayerSlot::new("o".into(), "Otto".into()), now));
        session
    }

    fn play(session: &mut Session, index: usize) -> SessionPatch {
        let mark = session.current_player();
        let patch = apply_move(session, index, mark).unwrap();
        session.apply_patch(&patch);
        patch
    }

    #[test]
    fn test_move_flips_turn() {
        let mut session = ready_session();
        let patch = play(&mut session, 4);
        assert_eq!(patch.current_player, Some(Mark::O));
        assert!(patch.status.is_none());
        assert!(patch.winner.is_none());
        assert_eq!(session.board().get(4).and_then(|c| c.mark()), Some(Mark::X));
    }

    #[test]
    fn test_waiting_session_rejects_moves() {
        let session = Session::new_waiting(PlayerSlot::new("x".into(), "X".into()), Utc::now());
        assert_eq!(apply_move(&session, 0, Mark::X), Err(MoveError::GameNotActive));
    }

    #[test]
    fn test_rejections_in_order() {
        let mut session = ready_session();
        assert_eq!(
            apply_move(&session, 9, Mark::O),
            Err(MoveError::CellOutOfRange { index: 9 })
        );
        assert_eq!(
            apply_move(&session, 0, Mark::O),
            Err(MoveError::NotYourTurn { mark: Mark::O })
        );
        play(&mut session, 0);
        assert_eq!(
            apply_move(&session, 0, Mark::O),
            Err(MoveError::CellOccupied { index: 0 })
        );
    }

    #[test]
    fn test_draw_finishes_game() {
        let mut session = ready_session();
        // X O X / X O O / O X X
        for index in [0, 1, 2, 4, 3, 5, 7, 6] {
            play(&mut session, index);
        }
        let patch = play(&mut session, 8);
        assert_eq!(patch.board.map(|b| evaluate(&b)), Some(Evaluation::Draw));
        assert_eq!(patch.winner, Some(Winner::Draw));
        assert_eq!(patch.status, Some(SessionStatus::Finished));
        assert!(patch.current_player.is_none());
        assert!(session.validate().is_ok());
    }
}
