//! Pure projection of client state into what the screen shows.

use derive_more::Display;

use crate::games::tictactoe::{CELL_COUNT, Cell, Mark};
use crate::session::{Session, SessionStatus, Winner};

/// Where a client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Phase {
    /// Entering a name, no session.
    #[default]
    Setup,
    /// A find-game request is outstanding.
    Searching,
    /// Seated in a session and subscribed to it.
    Playing,
    /// The session was deleted or the connection lost; only restart remains.
    Gone,
}

/// The status line under the board.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StatusLine {
    /// Signed in, waiting for the player to search.
    #[display("Connected. Enter your name!")]
    Connected,
    /// Matchmaking in progress.
    #[display("Looking for an open game...")]
    Searching,
    /// Hosting a session nobody has joined yet.
    #[display("Waiting for an opponent... Share app ID: {}", namespace)]
    WaitingForOpponent {
        /// Namespace other players must use.
        namespace: String,
    },
    /// The local mark is due.
    #[display("Your turn!")]
    YourTurn,
    /// The given opponent mark is due.
    #[display("Opponent's turn ({})", _0)]
    OpponentTurn(Mark),
    /// The local mark won.
    #[display("Game over! {} (you) win!", _0)]
    YouWin(Mark),
    /// The opponent's mark won.
    #[display("Game over! {} (opponent) wins!", _0)]
    YouLose(Mark),
    /// Board filled without a line.
    #[display("Draw! Try again!")]
    Draw,
    /// The session document disappeared.
    #[display("Game finished or cancelled. Start a new game.")]
    SessionGone,
    /// The subscription failed.
    #[display("Connection lost. Restart the game.")]
    ConnectionLost,
    /// Local state was reset by restart.
    #[display("Ready for a new game.")]
    Ready,
    /// A recoverable failure to show the player.
    #[display("{}", _0)]
    Error(String),
}

/// Everything [`project`] reads.
#[derive(Debug, Clone, Copy)]
pub struct ClientView<'a> {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Latest validated snapshot.
    pub session: Option<&'a Session>,
    /// Local mark, once seated.
    pub my_mark: Option<Mark>,
    /// Local client id.
    pub my_id: &'a str,
    /// Application namespace.
    pub namespace: &'a str,
    /// Message that overrides the derived status line.
    pub notice: Option<&'a StatusLine>,
    /// Whether a find-game request is outstanding.
    pub busy: bool,
}

/// Rendered screen state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    /// Cell texts: `""`, `"X"` or `"O"`.
    pub cells: [String; CELL_COUNT],
    /// Status line.
    pub status: StatusLine,
    /// Local mark, if seated.
    pub my_mark: Option<Mark>,
    /// Local player name, empty before seating.
    pub my_name: String,
    /// Opponent name, `"Waiting..."` while the seat is empty.
    pub opponent_name: String,
    /// Name entry and find button shown.
    pub setup_visible: bool,
    /// Find button clickable.
    pub find_enabled: bool,
    /// Restart button shown.
    pub restart_visible: bool,
}

/// Opponent label while nobody has joined.
pub const OPPONENT_PENDING: &str = "Waiting...";

fn derived_status(view: &ClientView<'_>) -> StatusLine {
    match (view.phase, view.session) {
        (Phase::Setup, _) => StatusLine::Connected,
        (Phase::Searching, _) => StatusLine::Searching,
        (Phase::Gone, _) => StatusLine::SessionGone,
        (Phase::Playing, None) => StatusLine::Searching,
        (Phase::Playing, Some(session)) => session_status(session, view),
    }
}

fn session_status(session: &Session, view: &ClientView<'_>) -> StatusLine {
    match session.status() {
        SessionStatus::Waiting => StatusLine::WaitingForOpponent {
            namespace: view.namespace.to_string(),
        },
        SessionStatus::Ready if Some(session.current_player()) == view.my_mark => {
            StatusLine::YourTurn
        }
        SessionStatus::Ready => StatusLine::OpponentTurn(session.current_player()),
        SessionStatus::Finished => match session.winner().and_then(Winner::mark) {
            Some(mark) if Some(mark) == view.my_mark => StatusLine::YouWin(mark),
            Some(mark) => StatusLine::YouLose(mark),
            None => StatusLine::Draw,
        },
    }
}

/// Computes the screen for `view`. Pure; equal inputs give equal output.
pub fn project(view: &ClientView<'_>) -> BoardView {
    let cells = std::array::from_fn(|index| {
        view.session
            .and_then(|s| s.board().get(index))
            .map(Cell::label)
            .unwrap_or_default()
            .to_string()
    });

    let (my_name, opponent_name) = match view.session {
        Some(session) => {
            let host = session.player_x();
            let guest = session.player_o();
            if host.id == view.my_id {
                let opponent = guest.map(|g| g.name).unwrap_or_else(|| OPPONENT_PENDING.to_string());
                (host.name, opponent)
            } else {
                (guest.map(|g| g.name).unwrap_or_default(), host.name)
            }
        }
        None => (String::new(), String::new()),
    };

    let status = view
        .notice
        .cloned()
        .unwrap_or_else(|| derived_status(view));

    let finished = view
        .session
        .is_some_and(|s| s.status() == SessionStatus::Finished);

    BoardView {
        cells,
        status,
        my_mark: view.my_mark,
        my_name,
        opponent_name,
        setup_visible: view.phase == Phase::Setup,
        find_enabled: view.phase == Phase::Setup && !view.busy,
        restart_visible: view.phase == Phase::Gone || finished,
    }
}
