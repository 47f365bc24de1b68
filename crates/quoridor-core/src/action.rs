//! Player actions, the only unit of mutation the engine accepts

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{PlayerId, Position, WallState};

/// Discriminant of an action, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionType {
    Move = 0,
    Wall = 1,
    Invalid = 2,
}

impl ActionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ActionType::Move),
            1 => Some(ActionType::Wall),
            2 => Some(ActionType::Invalid),
            _ => None,
        }
    }
}

/// What the action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum ActionKind {
    /// Move the pawn to the target cell
    Move { target: Position },
    /// Place a wall
    Wall { wall: WallState },
    /// Placeholder, always rejected
    Invalid,
}

/// An action submitted by (or on behalf of) a player.
///
/// Coordinates are canonical unless a method says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerAction {
    pub player_id: PlayerId,
    pub kind: ActionKind,
}

impl PlayerAction {
    pub fn movement(player_id: PlayerId, target: Position) -> Self {
        Self {
            player_id,
            kind: ActionKind::Move { target },
        }
    }

    pub fn wall(player_id: PlayerId, wall: WallState) -> Self {
        Self {
            player_id,
            kind: ActionKind::Wall { wall },
        }
    }

    pub fn invalid(player_id: PlayerId) -> Self {
        Self {
            player_id,
            kind: ActionKind::Invalid,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self.kind {
            ActionKind::Move { .. } => ActionType::Move,
            ActionKind::Wall { .. } => ActionType::Wall,
            ActionKind::Invalid => ActionType::Invalid,
        }
    }

    /// Same action seen after `quarter_turns` rotations of a `size` board
    pub fn rotate(self, quarter_turns: u8, size: usize) -> Self {
        let kind = match self.kind {
            ActionKind::Move { target } => ActionKind::Move {
                target: target.rotate(quarter_turns, size),
            },
            ActionKind::Wall { wall } => ActionKind::Wall {
                wall: wall.rotate(quarter_turns, size),
            },
            ActionKind::Invalid => ActionKind::Invalid,
        };
        Self {
            player_id: self.player_id,
            kind,
        }
    }
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Move { target } => write!(f, "{} moves to {}", self.player_id, target),
            ActionKind::Wall { wall } => write!(f, "{} places wall {}", self.player_id, wall),
            ActionKind::Invalid => write!(f, "{} invalid action", self.player_id),
        }
    }
}
