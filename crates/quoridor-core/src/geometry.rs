//! Coordinates, directions and walls
//!
//! Everything here is expressed relative to an `N`x`N` board. `Position::x` is the
//! row (0 is the top edge of whatever frame the caller is looking from) and
//! `Position::y` is the column.
//!
//! One quarter turn maps `(x, y)` to `(N-1-y, x)`. Every player perceives the
//! board through enough quarter turns that its own goal row becomes row 0, which
//! is why all the types here are rotatable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Index of a participant, 0-based
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The player after this one in turn order
    #[must_use]
    pub fn next(self, player_count: usize) -> Self {
        Self(((self.index() + 1) % player_count) as u8)
    }

    /// All ids for a game with `player_count` players
    pub fn all(player_count: usize) -> impl Iterator<Item = PlayerId> {
        (0..player_count as u8).map(PlayerId)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.0)
    }
}

/// A cell on the board (or on the doubled lattice, see `BoardMap`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn in_bounds(self, size: usize) -> bool {
        let n = size as i32;
        (0..n).contains(&self.x) && (0..n).contains(&self.y)
    }

    /// One cell over in `direction`
    #[must_use]
    pub fn step(self, direction: Direction) -> Self {
        self + direction.delta()
    }

    #[must_use]
    pub fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Coordinates of this pawn cell on the doubled lattice
    #[must_use]
    pub fn doubled(self) -> Self {
        Self::new(self.x * 2, self.y * 2)
    }

    /// Rotate by `quarter_turns` on a `size`x`size` grid
    #[must_use]
    pub fn rotate(self, quarter_turns: u8, size: usize) -> Self {
        let last = size as i32 - 1;
        let mut p = self;
        for _ in 0..quarter_turns % 4 {
            p = Self::new(last - p.y, p.x);
        }
        p
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Movement direction. Discriminants follow the quarter-turn cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Left = 1,
    Down = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    #[must_use]
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 4) as usize]
    }

    /// Unit step in this direction
    #[must_use]
    pub fn delta(self) -> Position {
        match self {
            Direction::Up => Position::new(-1, 0),
            Direction::Left => Position::new(0, -1),
            Direction::Down => Position::new(1, 0),
            Direction::Right => Position::new(0, 1),
        }
    }

    #[must_use]
    pub fn rotate(self, quarter_turns: u8) -> Self {
        Self::from_index(self as u8 + quarter_turns % 4)
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        self.rotate(2)
    }

    /// Quarter turns that bring a player advancing in this direction into a
    /// frame where it advances `Up`
    #[must_use]
    pub fn view_turns(self) -> u8 {
        (4 - self as u8) % 4
    }

    /// The direction a unit delta points in, if it is one
    #[must_use]
    pub fn from_delta(delta: Position) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.delta() == delta)
    }
}

/// Wall orientation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    Horizontal = 0,
    Vertical = 1,
}

impl Orientation {
    #[must_use]
    pub fn rotate(self, quarter_turns: u8) -> Self {
        if quarter_turns % 2 == 0 {
            self
        } else {
            self.flip()
        }
    }

    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }
}

/// A wall two cells long, crossing the centre of the 2x2 block whose top-left
/// cell is `position`.
///
/// Anchors live in `[0, N-2]` on both axes; the last row and column would put
/// part of the wall off the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallState {
    pub position: Position,
    pub orientation: Orientation,
}

impl WallState {
    #[must_use]
    pub const fn new(position: Position, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }

    #[must_use]
    pub fn in_bounds(self, size: usize) -> bool {
        self.position.in_bounds(size.saturating_sub(1))
    }

    /// Rotate by `quarter_turns`. Anchors rotate on the `(N-1)`-sized grid of
    /// block corners.
    #[must_use]
    pub fn rotate(self, quarter_turns: u8, size: usize) -> Self {
        Self {
            position: self.position.rotate(quarter_turns, size.saturating_sub(1)),
            orientation: self.orientation.rotate(quarter_turns),
        }
    }

    /// Lattice cell at the centre of the wall
    #[must_use]
    pub fn center(self) -> Position {
        Position::new(self.position.x * 2 + 1, self.position.y * 2 + 1)
    }

    /// The three lattice cells the wall occupies
    #[must_use]
    pub fn span(self) -> [Position; 3] {
        let c = self.center();
        match self.orientation {
            Orientation::Horizontal => [
                Position::new(c.x, c.y - 1),
                c,
                Position::new(c.x, c.y + 1),
            ],
            Orientation::Vertical => [
                Position::new(c.x - 1, c.y),
                c,
                Position::new(c.x + 1, c.y),
            ],
        }
    }
}

impl fmt::Display for WallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = match self.orientation {
            Orientation::Horizontal => 'h',
            Orientation::Vertical => 'v',
        };
        write!(f, "{}{}", self.position, o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rotation_is_order_four() {
        for size in [5usize, 9] {
            for x in 0..size as i32 {
                for y in 0..size as i32 {
                    let p = Position::new(x, y);
                    assert_eq!(p.rotate(0, size), p);
                    let mut q = p;
                    for _ in 0..4 {
                        q = q.rotate(1, size);
                        assert!(q.in_bounds(size));
                    }
                    assert_eq!(q, p);
                    assert_eq!(p.rotate(3, size).rotate(1, size), p);
                }
            }
        }
    }

    #[test]
    fn test_wall_rotation_is_order_four() {
        let wall = WallState::new(Position::new(2, 6), Orientation::Horizontal);
        let mut w = wall;
        for _ in 0..4 {
            w = w.rotate(1, 9);
            assert!(w.in_bounds(9));
        }
        assert_eq!(w, wall);
        assert_eq!(wall.rotate(0, 9), wall);
        assert_eq!(wall.rotate(1, 9).orientation, Orientation::Vertical);
    }

    #[test]
    fn test_wall_span_follows_rotation() {
        // Rotating a wall and rotating its lattice cells must agree
        let size = 9;
        let lattice = 2 * size - 1;
        let wall = WallState::new(Position::new(1, 3), Orientation::Vertical);
        let mut rotated_span: Vec<_> = wall.span().iter().map(|c| c.rotate(1, lattice)).collect();
        let mut span_of_rotated: Vec<_> = wall.rotate(1, size).span().to_vec();
        rotated_span.sort();
        span_of_rotated.sort();
        assert_eq!(rotated_span, span_of_rotated);
    }

    #[test]
    fn test_direction_rotation_matches_position_rotation() {
        let size = 9;
        let origin = Position::new(4, 4);
        for dir in Direction::ALL {
            for k in 0..4 {
                let moved = origin.step(dir).rotate(k, size);
                assert_eq!(origin.rotate(k, size).step(dir.rotate(k)), moved);
            }
        }
    }

    #[test]
    fn test_view_turns_bring_facing_up() {
        for dir in Direction::ALL {
            assert_eq!(dir.rotate(dir.view_turns()), Direction::Up);
        }
    }

    #[test]
    fn test_wall_bounds_exclude_last_row_and_column() {
        assert!(WallState::new(Position::new(7, 7), Orientation::Vertical).in_bounds(9));
        assert!(!WallState::new(Position::new(8, 0), Orientation::Horizontal).in_bounds(9));
        assert!(!WallState::new(Position::new(0, 8), Orientation::Vertical).in_bounds(9));
        assert!(!WallState::new(Position::new(-1, 0), Orientation::Vertical).in_bounds(9));
    }

    #[test]
    fn test_player_id_next_wraps() {
        assert_eq!(PlayerId::new(0).next(2), PlayerId::new(1));
        assert_eq!(PlayerId::new(1).next(2), PlayerId::new(0));
        assert_eq!(PlayerId::new(3).next(4), PlayerId::new(0));
        assert_eq!(format!("{}", PlayerId::new(2)), "Player 2");
    }
}
