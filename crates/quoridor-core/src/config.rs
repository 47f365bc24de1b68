//! Game configuration

use serde::{Deserialize, Serialize};

use crate::error::{QuoridorError, Result};
use crate::geometry::{Direction, PlayerId, Position};

pub const DEFAULT_BOARD_SIZE: usize = 9;
pub const MIN_BOARD_SIZE: usize = 3;
/// Keeps every coordinate in a single wire byte
pub const MAX_BOARD_SIZE: usize = 25;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;
/// Walls shared out evenly between the players
pub const DEFAULT_WALL_POOL: usize = 20;
/// A full board update has to fit one frame payload
pub const MAX_BOARD_BYTES: usize = u8::MAX as usize;

/// Shape of a game: board side, seats and wall budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub board_size: usize,
    pub player_count: usize,
    pub walls_per_player: usize,
}

impl GameConfig {
    /// Standard 9x9 board with the wall pool split between `player_count` players
    pub fn new(player_count: usize) -> Result<Self> {
        let config = Self {
            board_size: DEFAULT_BOARD_SIZE,
            player_count,
            walls_per_player: DEFAULT_WALL_POOL / player_count.max(1),
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_board_size(mut self, board_size: usize) -> Self {
        self.board_size = board_size;
        self
    }

    #[must_use]
    pub fn with_walls_per_player(mut self, walls: usize) -> Self {
        self.walls_per_player = walls;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.player_count) {
            return Err(QuoridorError::InvalidPlayerCount(self.player_count));
        }
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&self.board_size) {
            return Err(QuoridorError::InvalidBoardSize(self.board_size));
        }
        if self.walls_per_player > u8::MAX as usize {
            return Err(QuoridorError::Config(format!(
                "walls_per_player {} does not fit the wire format",
                self.walls_per_player
            )));
        }
        if self.max_board_bytes() > MAX_BOARD_BYTES {
            return Err(QuoridorError::Config(format!(
                "{} players with {} walls each cannot be sent in one board update",
                self.player_count, self.walls_per_player
            )));
        }
        Ok(())
    }

    /// Encoded size of a board update once every wall has been placed: a
    /// 5-byte header, 4 bytes per player, a wall count and 3 bytes per wall
    pub fn max_board_bytes(&self) -> usize {
        6 + 4 * self.player_count + 3 * self.walls_per_player * self.player_count
    }

    /// Direction a seat advances in, canonical frame
    pub fn facing(&self, player: PlayerId) -> Direction {
        match (self.player_count, player.index()) {
            (2, 1) => Direction::Down,
            (_, i) => Direction::from_index(i as u8),
        }
    }

    /// Canonical starting cell: bottom centre of the player's own frame
    pub fn start_position(&self, player: PlayerId) -> Position {
        let n = self.board_size as i32;
        let own = Position::new(n - 1, n / 2);
        // own frame -> canonical undoes the view rotation
        let facing = self.facing(player);
        own.rotate((4 - facing.view_turns()) % 4, self.board_size)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            player_count: 2,
            walls_per_player: DEFAULT_WALL_POOL / 2,
        }
    }
}
