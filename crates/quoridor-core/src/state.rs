//! Canonical board state
//!
//! [`BoardState`] is the single source of truth for pawn positions, walls and the
//! terminal flag. Reads go through per-viewer accessors that rotate copies into
//! the viewer's own frame; the stored data never leaves the canonical frame.
//!
//! Mutation is only possible through the [`BoardWriter`] handed out once by
//! [`BoardState::create`]. Agents and other collaborators only ever see an
//! `Arc<BoardState>`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::action::{ActionKind, PlayerAction};
use crate::board_map::BoardMap;
use crate::config::GameConfig;
use crate::error::Result;
use crate::geometry::{Direction, PlayerId, Position, WallState};

/// One participant's record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerState {
    /// Direction this player advances in (canonical frame)
    pub initial_facing: Direction,
    pub position: Position,
    pub walls_remaining: u8,
}

impl PlayerState {
    /// Quarter turns from the canonical frame into this player's frame
    pub fn view_turns(&self) -> u8 {
        self.initial_facing.view_turns()
    }

    /// Whether `pos` is on this player's goal row
    pub fn is_goal(&self, pos: Position, size: usize) -> bool {
        let last = size as i32 - 1;
        match self.initial_facing {
            Direction::Up => pos.x == 0,
            Direction::Down => pos.x == last,
            Direction::Left => pos.y == 0,
            Direction::Right => pos.y == last,
        }
    }

    pub fn has_reached_goal(&self, size: usize) -> bool {
        self.is_goal(self.position, size)
    }

    pub fn rotate(self, quarter_turns: u8, size: usize) -> Self {
        Self {
            initial_facing: self.initial_facing.rotate(quarter_turns),
            position: self.position.rotate(quarter_turns, size),
            walls_remaining: self.walls_remaining,
        }
    }
}

/// Plain copy of everything a `BoardState` holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub size: usize,
    pub players: Vec<PlayerState>,
    /// Append-only; walls are never removed except by a full reset
    pub walls: Vec<WallState>,
    pub last_action: Option<PlayerAction>,
    pub finished: bool,
    pub winner: Option<PlayerId>,
}

impl BoardSnapshot {
    /// Starting layout for `config`
    pub fn initial(config: &GameConfig) -> Self {
        let players = PlayerId::all(config.player_count)
            .map(|id| PlayerState {
                initial_facing: config.facing(id),
                position: config.start_position(id),
                walls_remaining: config.walls_per_player as u8,
            })
            .collect();
        Self {
            size: config.board_size,
            players,
            walls: Vec::new(),
            last_action: None,
            finished: false,
            winner: None,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(id.index())
    }

    /// Quarter turns into `viewer`'s frame (0 for unknown viewers)
    pub fn view_turns(&self, viewer: PlayerId) -> u8 {
        self.player(viewer).map_or(0, PlayerState::view_turns)
    }

    /// The whole board rotated by `quarter_turns`
    pub fn rotated(&self, quarter_turns: u8) -> Self {
        if quarter_turns % 4 == 0 {
            return self.clone();
        }
        let size = self.size;
        Self {
            size,
            players: self
                .players
                .iter()
                .map(|p| p.rotate(quarter_turns, size))
                .collect(),
            walls: self
                .walls
                .iter()
                .map(|w| w.rotate(quarter_turns, size))
                .collect(),
            last_action: self.last_action.map(|a| a.rotate(quarter_turns, size)),
            finished: self.finished,
            winner: self.winner,
        }
    }

    /// The board as `viewer` sees it
    pub fn for_viewer(&self, viewer: PlayerId) -> Self {
        self.rotated(self.view_turns(viewer))
    }

    /// Which pawn, if any, stands on `pos`
    pub fn pawn_at(&self, pos: Position) -> Option<PlayerId> {
        self.players
            .iter()
            .position(|p| p.position == pos)
            .map(|i| PlayerId::new(i as u8))
    }

    /// Apply without any legality checks. Returns true when this action ended
    /// the game.
    pub fn apply_unchecked(&mut self, action: &PlayerAction) -> bool {
        let size = self.size;
        let mut won = false;
        let Some(player) = self.players.get_mut(action.player_id.index()) else {
            return false;
        };
        match action.kind {
            ActionKind::Move { target } => {
                player.position = target;
                if !self.finished && player.has_reached_goal(size) {
                    won = true;
                }
            }
            ActionKind::Wall { wall } => {
                player.walls_remaining = player.walls_remaining.saturating_sub(1);
                self.walls.push(wall);
            }
            ActionKind::Invalid => {}
        }
        self.last_action = Some(*action);
        if won {
            self.finished = true;
            self.winner = Some(action.player_id);
        }
        won
    }
}

/// Callback run after every successful mutation
pub type StateCallback = Arc<dyn Fn(&BoardState) + Send + Sync>;

/// Thread-safe canonical board
pub struct BoardState {
    inner: Mutex<BoardSnapshot>,
    subscribers: Mutex<Vec<StateCallback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BoardState {
    /// Create a board in its starting layout together with the only handle
    /// allowed to mutate it
    pub fn create(config: &GameConfig) -> (Arc<BoardState>, BoardWriter) {
        let initial = BoardSnapshot::initial(config);
        let state = Arc::new(BoardState {
            inner: Mutex::new(initial.clone()),
            subscribers: Mutex::new(Vec::new()),
        });
        let writer = BoardWriter {
            state: state.clone(),
            initial,
        };
        (state, writer)
    }

    pub fn size(&self) -> usize {
        lock(&self.inner).size
    }

    pub fn player_count(&self) -> usize {
        lock(&self.inner).players.len()
    }

    /// Canonical copy
    pub fn snapshot(&self) -> BoardSnapshot {
        lock(&self.inner).clone()
    }

    /// Copy rotated into `viewer`'s frame
    pub fn snapshot_for(&self, viewer: PlayerId) -> BoardSnapshot {
        lock(&self.inner).for_viewer(viewer)
    }

    pub fn players(&self, viewer: PlayerId) -> Vec<PlayerState> {
        let inner = lock(&self.inner);
        let turns = inner.view_turns(viewer);
        inner
            .players
            .iter()
            .map(|p| p.rotate(turns, inner.size))
            .collect()
    }

    pub fn player(&self, viewer: PlayerId, id: PlayerId) -> Option<PlayerState> {
        let inner = lock(&self.inner);
        let turns = inner.view_turns(viewer);
        inner.player(id).map(|p| p.rotate(turns, inner.size))
    }

    pub fn walls(&self, viewer: PlayerId) -> Vec<WallState> {
        let inner = lock(&self.inner);
        let turns = inner.view_turns(viewer);
        inner
            .walls
            .iter()
            .map(|w| w.rotate(turns, inner.size))
            .collect()
    }

    pub fn last_action(&self, viewer: PlayerId) -> Option<PlayerAction> {
        let inner = lock(&self.inner);
        let turns = inner.view_turns(viewer);
        inner.last_action.map(|a| a.rotate(turns, inner.size))
    }

    /// True if no pawn stands on `pos` (given in `viewer`'s frame)
    pub fn is_space_empty(&self, pos: Position, viewer: PlayerId) -> bool {
        let inner = lock(&self.inner);
        let turns = inner.view_turns(viewer);
        let canonical = pos.rotate((4 - turns) % 4, inner.size);
        inner.pawn_at(canonical).is_none()
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.inner).finished
    }

    pub fn winner(&self) -> Option<PlayerId> {
        lock(&self.inner).winner
    }

    /// Lattice projection in `viewer`'s frame
    pub fn create_board_map(&self, viewer: PlayerId) -> BoardMap {
        let snapshot = self.snapshot();
        BoardMap::build(&snapshot, viewer)
    }

    /// Subscribe to mutations. Callbacks run with no board lock held.
    pub fn register_state_change<F>(&self, callback: F)
    where
        F: Fn(&BoardState) + Send + Sync + 'static,
    {
        lock(&self.subscribers).push(Arc::new(callback));
    }

    /// SHA-256 over the canonical state, hex encoded
    pub fn state_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&*lock(&self.inner))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    fn notify_subscribers(&self) {
        let callbacks: Vec<StateCallback> = lock(&self.subscribers).clone();
        for callback in callbacks {
            callback(self);
        }
    }
}

impl std::fmt::Debug for BoardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardState")
            .field("state", &*lock(&self.inner))
            .finish()
    }
}

/// Pending subscriber notification for a mutation that has completed.
///
/// Lets the caller finish releasing its own locks before callbacks run.
#[must_use = "subscribers only run when notify() is called"]
pub struct StateChanged {
    state: Arc<BoardState>,
}

impl StateChanged {
    pub fn notify(self) {
        self.state.notify_subscribers();
    }
}

/// Exclusive mutating handle for one `BoardState`
pub struct BoardWriter {
    state: Arc<BoardState>,
    initial: BoardSnapshot,
}

impl BoardWriter {
    pub fn board(&self) -> &Arc<BoardState> {
        &self.state
    }

    /// Apply an already-validated action
    pub fn apply_action(&self, action: &PlayerAction) -> StateChanged {
        {
            let mut inner = lock(&self.state.inner);
            if inner.apply_unchecked(action) {
                debug!("{} reached the goal row", action.player_id);
            }
        }
        self.changed()
    }

    /// Force the terminal state
    pub fn finish(&self, winner: Option<PlayerId>) -> StateChanged {
        {
            let mut inner = lock(&self.state.inner);
            inner.finished = true;
            if inner.winner.is_none() {
                inner.winner = winner;
            }
        }
        self.changed()
    }

    /// Back to the starting layout
    pub fn reset(&self) -> StateChanged {
        *lock(&self.state.inner) = self.initial.clone();
        self.changed()
    }

    /// Replace everything, used by mirrors that follow a remote host
    pub fn restore(&self, snapshot: BoardSnapshot) -> StateChanged {
        *lock(&self.state.inner) = snapshot;
        self.changed()
    }

    fn changed(&self) -> StateChanged {
        StateChanged {
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Orientation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn two_player() -> (Arc<BoardState>, BoardWriter) {
        BoardState::create(&GameConfig::default())
    }

    #[test]
    fn test_initial_layout() {
        let (board, _writer) = two_player();
        let players = board.snapshot().players;
        assert_eq!(players[0].position, Position::new(8, 4));
        assert_eq!(players[1].position, Position::new(0, 4));
        assert!(players.iter().all(|p| p.walls_remaining == 10));
        assert!(!board.is_finished());
        assert_eq!(board.winner(), None);
    }

    #[test]
    fn test_every_player_sees_itself_at_the_bottom() {
        let config = GameConfig::new(4).unwrap();
        let (board, _writer) = BoardState::create(&config);
        for id in PlayerId::all(4) {
            let me = board.player(id, id).unwrap();
            assert_eq!(me.position, Position::new(8, 4));
            assert_eq!(me.initial_facing, Direction::Up);
        }
    }

    #[test]
    fn test_views_rotate_walls() {
        let (board, writer) = two_player();
        let wall = WallState::new(Position::new(0, 0), Orientation::Horizontal);
        writer
            .apply_action(&PlayerAction::wall(PlayerId::new(0), wall))
            .notify();
        assert_eq!(board.walls(PlayerId::new(0)), vec![wall]);
        assert_eq!(
            board.walls(PlayerId::new(1)),
            vec![WallState::new(Position::new(7, 7), Orientation::Horizontal)]
        );
        assert_eq!(board.snapshot().players[0].walls_remaining, 9);
    }

    #[test]
    fn test_is_space_empty_uses_viewer_frame() {
        let (board, _writer) = two_player();
        // Player 1 stands at canonical (0, 4), which is (8, 4) in its own frame
        assert!(!board.is_space_empty(Position::new(8, 4), PlayerId::new(1)));
        assert!(!board.is_space_empty(Position::new(0, 4), PlayerId::new(1)));
        assert!(board.is_space_empty(Position::new(4, 4), PlayerId::new(1)));
    }

    #[test]
    fn test_move_onto_goal_finishes() {
        let (board, writer) = two_player();
        writer
            .apply_action(&PlayerAction::movement(PlayerId::new(0), Position::new(0, 3)))
            .notify();
        assert!(board.is_finished());
        assert_eq!(board.winner(), Some(PlayerId::new(0)));
        assert_eq!(
            board.last_action(PlayerId::new(0)),
            Some(PlayerAction::movement(PlayerId::new(0), Position::new(0, 3)))
        );
    }

    #[test]
    fn test_subscribers_run_after_mutation() {
        let (board, writer) = two_player();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        board.register_state_change(move |state| {
            // The lock must be free again by the time we run
            assert_eq!(state.snapshot().players[0].position, Position::new(7, 4));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let changed =
            writer.apply_action(&PlayerAction::movement(PlayerId::new(0), Position::new(7, 4)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        changed.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_restores_initial_layout() {
        let (board, writer) = two_player();
        let fresh = board.state_hash().unwrap();
        writer
            .apply_action(&PlayerAction::movement(PlayerId::new(0), Position::new(7, 4)))
            .notify();
        assert_ne!(board.state_hash().unwrap(), fresh);
        writer.reset().notify();
        assert_eq!(board.state_hash().unwrap(), fresh);
    }

    #[test]
    fn test_finish_keeps_existing_winner() {
        let (board, writer) = two_player();
        writer.finish(None).notify();
        assert!(board.is_finished());
        assert_eq!(board.winner(), None);
    }
}
