//! Participant wrapper and the agent hook
//!
//! A [`Player`] speaks in its own frame: its goal is always row 0 and "up" is
//! always towards it. Conversion to the canonical frame happens here, right
//! before an action reaches the [`GameHandle`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use quoridor_core::{
    ActionResult, BoardState, Direction, Orientation, PlayerAction, PlayerId, Position,
    WallState,
};
use tracing::debug;

use crate::game::GameHandle;
use crate::rules;

/// Decision logic for one seat. Called once per turn by the session loop.
pub trait Agent: Send {
    fn player(&self) -> &Player;

    /// Make (or request) a move for the player. Errors count as a missed turn.
    fn do_next_move(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
struct PlayerStats {
    last_move_duration: Option<Duration>,
    illegal_moves: u32,
}

/// Identity, stats and action primitives for one participant
#[derive(Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    game: Arc<dyn GameHandle>,
    stats: Arc<Mutex<PlayerStats>>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, game: Arc<dyn GameHandle>) -> Self {
        Self {
            id,
            name: name.into(),
            game,
            stats: Arc::new(Mutex::new(PlayerStats::default())),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn board(&self) -> Arc<BoardState> {
        self.game.board()
    }

    pub fn game(&self) -> &Arc<dyn GameHandle> {
        &self.game
    }

    pub fn is_my_turn(&self) -> bool {
        self.game.current_player() == self.id
    }

    /// Own-frame position
    pub fn position(&self) -> Position {
        self.board()
            .player(self.id, self.id)
            .map(|p| p.position)
            .unwrap_or_default()
    }

    pub fn walls_left(&self) -> u8 {
        self.board()
            .player(self.id, self.id)
            .map_or(0, |p| p.walls_remaining)
    }

    fn turns_to_canonical(&self, board: &BoardState) -> (u8, usize) {
        let turns = board.snapshot().view_turns(self.id);
        ((4 - turns) % 4, board.size())
    }

    fn move_action(&self, target: Position) -> PlayerAction {
        let board = self.board();
        let (turns, size) = self.turns_to_canonical(&board);
        PlayerAction::movement(self.id, target.rotate(turns, size))
    }

    fn wall_action(&self, position: Position, orientation: Orientation) -> PlayerAction {
        let board = self.board();
        let (turns, size) = self.turns_to_canonical(&board);
        PlayerAction::wall(
            self.id,
            WallState::new(position, orientation).rotate(turns, size),
        )
    }

    fn submit(&self, action: PlayerAction) -> ActionResult {
        let result = self.game.process_player_action(&action);
        if let Err(reason) = &result {
            debug!(player = %self.id, %action, %reason, "Move refused");
            self.stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .illegal_moves += 1;
        }
        result
    }

    /// Move the pawn to an own-frame cell
    pub fn move_to(&self, target: Position) -> ActionResult {
        self.submit(self.move_action(target))
    }

    /// Move one step in `direction`, jumping when the neighbour is occupied.
    ///
    /// If the straight jump is illegal the first legal diagonal sidestep in
    /// (row, column) order is taken instead.
    pub fn move_direction(&self, direction: Direction) -> ActionResult {
        self.move_to(self.resolve_direction(direction))
    }

    fn resolve_direction(&self, direction: Direction) -> Position {
        let one = self.position().step(direction);
        if self.board().is_space_empty(one, self.id) {
            return one;
        }
        let two = one.step(direction);
        if self.is_valid_move(two).is_ok() {
            return two;
        }
        let mut sides = [
            one.step(direction.rotate(1)),
            one.step(direction.rotate(3)),
        ];
        sides.sort();
        sides
            .into_iter()
            .find(|&side| self.is_valid_move(side).is_ok())
            .unwrap_or(two)
    }

    /// Place a wall anchored at an own-frame position
    pub fn place_wall(&self, position: Position, orientation: Orientation) -> ActionResult {
        self.submit(self.wall_action(position, orientation))
    }

    /// Would moving to own-frame `target` be legal right now (turn aside)
    pub fn is_valid_move(&self, target: Position) -> ActionResult {
        self.game.check_action(&self.move_action(target))
    }

    pub fn is_valid_wall(&self, position: Position, orientation: Orientation) -> ActionResult {
        self.game.check_action(&self.wall_action(position, orientation))
    }

    /// Every legal pawn target, own frame, sorted
    pub fn legal_moves(&self) -> Vec<Position> {
        let snapshot = self.board().snapshot();
        let turns = snapshot.view_turns(self.id);
        let mut moves: Vec<_> = rules::legal_targets(&snapshot, self.id)
            .into_iter()
            .map(|p| p.rotate(turns, snapshot.size))
            .collect();
        moves.sort();
        moves
    }

    /// Wall-respecting shortest route to the goal row, own frame
    pub fn shortest_path(&self) -> Option<Vec<Position>> {
        rules::shortest_path(&self.board().snapshot(), self.id)
    }

    pub fn last_move_duration(&self) -> Option<Duration> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_move_duration
    }

    pub fn illegal_moves(&self) -> u32 {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .illegal_moves
    }

    pub fn record_move_duration(&self, duration: Duration) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_move_duration = Some(duration);
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;
    use quoridor_core::{GameConfig, Rejection};

    fn seats(config: GameConfig) -> (Arc<Game>, Vec<Player>) {
        let game = Arc::new(Game::new(config).unwrap());
        let handle: Arc<dyn GameHandle> = game.clone();
        let players = PlayerId::all(game.config().player_count)
            .map(|id| Player::new(id, format!("p{}", id.0), handle.clone()))
            .collect();
        (game, players)
    }

    #[test]
    fn test_players_speak_in_their_own_frame() {
        let (game, players) = seats(GameConfig::default());
        assert_eq!(players[1].position(), Position::new(8, 4));
        assert_eq!(players[0].move_direction(Direction::Up), Ok(()));
        assert_eq!(players[1].move_direction(Direction::Up), Ok(()));
        // Canonically player 1 moved down
        assert_eq!(
            game.board().snapshot().players[1].position,
            Position::new(1, 4)
        );
        assert_eq!(players[1].position(), Position::new(7, 4));
    }

    #[test]
    fn test_walls_are_converted_from_own_frame() {
        let (game, players) = seats(GameConfig::default());
        players[0].move_direction(Direction::Left).unwrap();
        players[1]
            .place_wall(Position::new(0, 0), Orientation::Vertical)
            .unwrap();
        assert_eq!(
            game.board().walls(PlayerId::new(0)),
            vec![WallState::new(Position::new(7, 7), Orientation::Vertical)]
        );
        assert_eq!(players[1].walls_left(), 9);
    }

    #[test]
    fn test_illegal_moves_are_counted() {
        let (_game, players) = seats(GameConfig::default());
        assert_eq!(
            players[1].move_direction(Direction::Up),
            Err(Rejection::WrongTurn {
                expected: PlayerId::new(0),
                got: PlayerId::new(1)
            })
        );
        assert_eq!(players[1].illegal_moves(), 1);
        assert_eq!(players[0].illegal_moves(), 0);
        assert_eq!(players[0].move_direction(Direction::Down), Err(Rejection::OutOfBounds));
        assert_eq!(players[0].illegal_moves(), 1);
    }

    #[test]
    fn test_direction_jumps_over_adjacent_pawn() {
        let (game, players) = seats(GameConfig::default().with_board_size(5));
        players[0].move_direction(Direction::Up).unwrap();
        players[1].move_direction(Direction::Up).unwrap();
        players[0].move_direction(Direction::Up).unwrap();
        // Player 0 now at (2, 2), player 1 at canonical (1, 2)
        players[1].move_direction(Direction::Up).unwrap();
        assert_eq!(
            game.board().snapshot().players[1].position,
            Position::new(3, 2)
        );
    }

    #[test]
    fn test_direction_falls_back_to_diagonal() {
        let (game, players) = seats(GameConfig::default().with_board_size(3));
        // Player 0 to (1, 1), right under player 1 at the top edge
        players[0].move_direction(Direction::Up).unwrap();
        // Canonical (0, 0) vertical, seen from the other side of the board
        players[1]
            .place_wall(Position::new(1, 1), Orientation::Vertical)
            .unwrap();
        // Straight jump leaves the board; left sidestep is walled off
        assert_eq!(players[0].move_direction(Direction::Up), Ok(()));
        assert_eq!(
            game.board().snapshot().players[0].position,
            Position::new(0, 2)
        );
    }

    #[test]
    fn test_diagonal_tie_goes_to_the_smaller_cell() {
        let (game, players) = seats(GameConfig::default().with_board_size(3));
        players[0].move_direction(Direction::Up).unwrap();
        // Canonical (1, 0) horizontal, under both pawns' side cells
        players[1]
            .place_wall(Position::new(0, 1), Orientation::Horizontal)
            .unwrap();
        let mut open = players[0].legal_moves();
        open.retain(|p| p.x == 0);
        assert_eq!(open, vec![Position::new(0, 0), Position::new(0, 2)]);

        assert_eq!(players[0].move_direction(Direction::Up), Ok(()));
        assert_eq!(
            game.board().snapshot().players[0].position,
            Position::new(0, 0)
        );
    }

    #[test]
    fn test_legal_moves_and_path() {
        let (_game, players) = seats(GameConfig::default());
        assert_eq!(
            players[1].legal_moves(),
            vec![Position::new(7, 4), Position::new(8, 3), Position::new(8, 5)]
        );
        assert_eq!(players[1].shortest_path().map(|p| p.len()), Some(8));
        assert!(players[0].is_valid_wall(Position::new(3, 3), Orientation::Horizontal).is_ok());
        assert_eq!(
            players[0].is_valid_move(Position::new(6, 4)),
            Err(Rejection::IllegalJump)
        );
    }
}
