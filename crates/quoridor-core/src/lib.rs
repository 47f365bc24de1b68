//! # quoridor-core
//!
//! Core types shared by every quoridor crate:
//! - Coordinates, directions, walls and their quarter-turn rotations
//! - Player actions
//! - The canonical board state and its per-viewer projections
//! - The doubled-resolution lattice used for legality checks
//! - Errors and rejection reasons

pub mod action;
pub mod board_map;
pub mod config;
pub mod deadline;
pub mod error;
pub mod geometry;
pub mod state;

pub use action::{ActionKind, ActionType, PlayerAction};
pub use board_map::{BoardMap, Cell};
pub use config::GameConfig;
pub use deadline::Deadline;
pub use error::{ActionResult, QuoridorError, Rejection, Result};
pub use geometry::{Direction, Orientation, PlayerId, Position, WallState};
pub use state::{BoardSnapshot, BoardState, BoardWriter, PlayerState, StateChanged};
