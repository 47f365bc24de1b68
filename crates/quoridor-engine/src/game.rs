//! Turn sequencer
//!
//! [`Game`] owns the only [`BoardWriter`] for its board. Every action goes through
//! [`Game::process_player_action`], which is serialized by one mutex; waiters are
//! woken through a condition variable whenever the turn cursor moves or the game
//! ends.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use quoridor_core::{
    ActionResult, BoardSnapshot, BoardState, BoardWriter, Deadline, GameConfig, PlayerAction,
    PlayerId, Rejection, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rules;

/// Where the game is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    AwaitingMove(PlayerId),
    Finished,
}

/// Hears about every accepted action while the game lock is still held.
///
/// Implementations must not block and must not call back into the game.
pub trait ActionObserver: Send + Sync {
    /// `action` was applied and `next` now holds the turn
    fn action_applied(&self, action: &PlayerAction, next: PlayerId);

    /// The game reached its terminal state; `turn` is where the cursor stopped
    fn game_ended(&self, snapshot: &BoardSnapshot, turn: PlayerId);
}

/// What a [`Player`](crate::Player) needs from a game, local or remote
pub trait GameHandle: Send + Sync {
    /// Read-only view of the board
    fn board(&self) -> Arc<BoardState>;

    /// Submit an action (canonical frame)
    fn process_player_action(&self, action: &PlayerAction) -> ActionResult;

    /// Player currently holding the turn
    fn current_player(&self) -> PlayerId;

    /// Block until `player` no longer holds the turn
    fn wait_player_move(&self, player: PlayerId);

    /// Like [`wait_player_move`](Self::wait_player_move) but gives up at
    /// `deadline`. Returns true if the turn moved on.
    fn wait_player_move_until(&self, player: PlayerId, deadline: Deadline) -> bool;

    /// Dry-run the rules against the current board, ignoring turn order
    fn check_action(&self, action: &PlayerAction) -> ActionResult {
        rules::check_action(&self.board().snapshot(), action)
    }
}

struct GameInner {
    writer: BoardWriter,
    phase: GamePhase,
    turn: PlayerId,
    accepted: u64,
    /// Set when the session hands the turn to an agent, cleared on acceptance
    move_started: Option<Instant>,
    observer: Option<Arc<dyn ActionObserver>>,
}

/// Rule engine and turn sequencer for one game
pub struct Game {
    config: GameConfig,
    board: Arc<BoardState>,
    inner: Mutex<GameInner>,
    changed: Condvar,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Self> {
        config.validate()?;
        let (board, writer) = BoardState::create(&config);
        info!(
            players = config.player_count,
            size = config.board_size,
            "New game"
        );
        Ok(Self {
            config,
            board,
            inner: Mutex::new(GameInner {
                writer,
                phase: GamePhase::AwaitingMove(PlayerId::new(0)),
                turn: PlayerId::new(0),
                accepted: 0,
                move_started: None,
                observer: None,
            }),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GameInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.lock().phase
    }

    pub fn is_finished(&self) -> bool {
        self.lock().phase == GamePhase::Finished
    }

    /// Number of actions accepted since the start (or last reset)
    pub fn accepted_actions(&self) -> u64 {
        self.lock().accepted
    }

    /// Attach the transport. Replaces any previous observer.
    pub fn set_observer(&self, observer: Arc<dyn ActionObserver>) {
        self.lock().observer = Some(observer);
    }

    pub fn clear_observer(&self) {
        self.lock().observer = None;
    }

    /// Run `f` on the current board and turn holder with the game locked, so
    /// no action lands while it runs. Lets an observer take a consistent
    /// snapshot before it starts receiving actions.
    pub fn with_current_state<R>(&self, f: impl FnOnce(&BoardSnapshot, PlayerId) -> R) -> R {
        let inner = self.lock();
        f(&self.board.snapshot(), inner.turn)
    }

    /// Validate and apply `action`. Rejections leave everything untouched.
    pub fn process_player_action(&self, action: &PlayerAction) -> ActionResult {
        let changed = {
            let mut inner = self.lock();
            let turn = match inner.phase {
                GamePhase::Finished => return Err(Rejection::GameFinished),
                GamePhase::AwaitingMove(turn) => turn,
            };
            if action.player_id.index() >= self.config.player_count {
                return Err(Rejection::UnknownPlayer(action.player_id));
            }
            if action.player_id != turn {
                return Err(Rejection::WrongTurn {
                    expected: turn,
                    got: action.player_id,
                });
            }
            if let Err(reason) = rules::check_action(&self.board.snapshot(), action) {
                debug!(%action, %reason, "Rejected");
                return Err(reason);
            }

            let changed = inner.writer.apply_action(action);
            inner.accepted += 1;
            inner.move_started = None;
            let next = turn.next(self.config.player_count);
            inner.turn = next;
            let finished = self.board.is_finished();
            if finished {
                inner.phase = GamePhase::Finished;
                info!(winner = %action.player_id, "Game finished");
            } else {
                inner.phase = GamePhase::AwaitingMove(next);
            }
            debug!(%action, "Accepted");

            if let Some(observer) = &inner.observer {
                observer.action_applied(action, next);
                if finished {
                    observer.game_ended(&self.board.snapshot(), next);
                }
            }
            self.changed.notify_all();
            changed
        };
        changed.notify();
        Ok(())
    }

    /// Mark the current player's move as in flight. Keeps the original start
    /// time if the player is already on the clock.
    pub fn begin_move(&self, player: PlayerId) {
        let mut inner = self.lock();
        if inner.phase == GamePhase::AwaitingMove(player) && inner.move_started.is_none() {
            inner.move_started = Some(Instant::now());
            self.changed.notify_all();
        }
    }

    /// Player on the clock and for how long
    pub fn move_in_flight(&self) -> Option<(PlayerId, Duration)> {
        let inner = self.lock();
        match (inner.phase, inner.move_started) {
            (GamePhase::AwaitingMove(player), Some(started)) => Some((player, started.elapsed())),
            _ => None,
        }
    }

    /// Player on the clock and the point their move must be in by
    pub fn move_deadline(&self, timeout: Duration) -> Option<(PlayerId, Deadline)> {
        let inner = self.lock();
        match (inner.phase, inner.move_started) {
            (GamePhase::AwaitingMove(player), Some(started)) => {
                Some((player, Deadline::at(started + timeout)))
            }
            _ => None,
        }
    }

    /// Bounded wait for any change of turn, phase or clock
    pub fn wait_for_change(&self, timeout: Duration) {
        let inner = self.lock();
        if inner.phase == GamePhase::Finished {
            return;
        }
        let _ = self
            .changed
            .wait_timeout(inner, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Force the terminal state with no winner. Returns false if the game had
    /// already finished.
    pub fn end(&self) -> bool {
        let changed = {
            let mut inner = self.lock();
            if inner.phase == GamePhase::Finished {
                return false;
            }
            inner.phase = GamePhase::Finished;
            inner.move_started = None;
            let changed = inner.writer.finish(None);
            warn!("Game ended before anyone reached their goal");
            if let Some(observer) = &inner.observer {
                observer.game_ended(&self.board.snapshot(), inner.turn);
            }
            self.changed.notify_all();
            changed
        };
        changed.notify();
        true
    }

    /// Back to the starting layout: walls cleared, budgets refilled, player 0
    /// to move
    pub fn reset(&self) {
        let changed = {
            let mut inner = self.lock();
            let changed = inner.writer.reset();
            inner.turn = PlayerId::new(0);
            inner.phase = GamePhase::AwaitingMove(inner.turn);
            inner.accepted = 0;
            inner.move_started = None;
            info!("Game reset");
            self.changed.notify_all();
            changed
        };
        changed.notify();
    }

    pub fn state_hash(&self) -> Result<String> {
        self.board.state_hash()
    }
}

impl GameHandle for Game {
    fn board(&self) -> Arc<BoardState> {
        self.board.clone()
    }

    fn process_player_action(&self, action: &PlayerAction) -> ActionResult {
        Game::process_player_action(self, action)
    }

    fn current_player(&self) -> PlayerId {
        self.lock().turn
    }

    fn wait_player_move(&self, player: PlayerId) {
        let mut inner = self.lock();
        while inner.phase == GamePhase::AwaitingMove(player) {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_player_move_until(&self, player: PlayerId, deadline: Deadline) -> bool {
        let mut inner = self.lock();
        while inner.phase == GamePhase::AwaitingMove(player) {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return false;
            }
            inner = self
                .changed
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish()
    }
}
