//! Doubled-resolution lattice used for legality checks
//!
//! A board of side `N` projects onto a `(2N-1)`x`(2N-1)` lattice. Pawn cells sit
//! at even coordinates; the odd rows/columns between them are wall slots. A pawn
//! can step from `a` to an adjacent `b` only if the lattice cell halfway between
//! them is free of walls.
//!
//! Maps are cheap, derived and throwaway: build one per check.

use crate::geometry::{Direction, PlayerId, Position, WallState};
use crate::state::BoardSnapshot;

/// Content of one lattice cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Wall,
    Pawn(PlayerId),
    /// Outside the lattice
    Invalid,
}

#[derive(Debug, Clone)]
pub struct BoardMap {
    board_size: usize,
    side: usize,
    cells: Vec<Cell>,
}

impl BoardMap {
    /// Project `snapshot` (canonical) into `viewer`'s frame
    pub fn build(snapshot: &BoardSnapshot, viewer: PlayerId) -> Self {
        Self::from_view(&snapshot.for_viewer(viewer))
    }

    /// Project a snapshot that is already in the desired frame
    pub fn from_view(view: &BoardSnapshot) -> Self {
        let side = 2 * view.size - 1;
        let mut map = Self {
            board_size: view.size,
            side,
            cells: vec![Cell::Empty; side * side],
        };
        for wall in &view.walls {
            map.place_wall(*wall);
        }
        for (i, player) in view.players.iter().enumerate() {
            map.set(player.position.doubled(), Cell::Pawn(PlayerId::new(i as u8)));
        }
        map
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    /// Side length of the lattice
    pub fn side(&self) -> usize {
        self.side
    }

    fn index(&self, lattice: Position) -> Option<usize> {
        let side = self.side as i32;
        if (0..side).contains(&lattice.x) && (0..side).contains(&lattice.y) {
            Some((lattice.x * side + lattice.y) as usize)
        } else {
            None
        }
    }

    fn set(&mut self, lattice: Position, cell: Cell) {
        if let Some(i) = self.index(lattice) {
            self.cells[i] = cell;
        }
    }

    /// Lattice lookup; anything off the lattice reads as `Invalid`
    pub fn cell(&self, lattice: Position) -> Cell {
        self.index(lattice).map_or(Cell::Invalid, |i| self.cells[i])
    }

    pub fn is_wall(&self, lattice: Position) -> bool {
        self.cell(lattice) == Cell::Wall
    }

    /// Pawn standing on board cell `pos`
    pub fn pawn_at(&self, pos: Position) -> Option<PlayerId> {
        match self.cell(pos.doubled()) {
            Cell::Pawn(id) => Some(id),
            _ => None,
        }
    }

    /// True if moving between adjacent board cells `a` and `b` is impossible:
    /// either cell is off the board or a wall sits between them
    pub fn is_blocked_between(&self, a: Position, b: Position) -> bool {
        if !a.in_bounds(self.board_size) || !b.in_bounds(self.board_size) {
            return true;
        }
        let midpoint = a.doubled() + (b - a);
        self.is_wall(midpoint)
    }

    /// Whether `wall` would share a lattice cell with an existing wall. Covers
    /// exact overlap, collinear overlap and perpendicular crossing.
    pub fn intersects(&self, wall: WallState) -> bool {
        wall.span().iter().any(|&c| self.is_wall(c))
    }

    /// Mark a wall's span. Used for the tentative wall during path checks.
    pub fn place_wall(&mut self, wall: WallState) {
        for c in wall.span() {
            self.set(c, Cell::Wall);
        }
    }

    /// Board cells reachable from `pos` in one unobstructed step, ignoring pawns
    pub fn open_neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        Direction::ALL
            .into_iter()
            .map(move |d| pos.step(d))
            .filter(move |&next| !self.is_blocked_between(pos, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::PlayerAction;
    use crate::config::GameConfig;
    use crate::geometry::Orientation;

    fn snapshot_with_walls(walls: &[WallState]) -> BoardSnapshot {
        let mut snapshot = BoardSnapshot::initial(&GameConfig::default());
        for wall in walls {
            snapshot.apply_unchecked(&PlayerAction::wall(PlayerId::new(0), *wall));
        }
        snapshot
    }

    #[test]
    fn test_projection_places_pawns_and_walls() {
        let wall = WallState::new(Position::new(3, 3), Orientation::Horizontal);
        let map = BoardMap::build(&snapshot_with_walls(&[wall]), PlayerId::new(0));

        assert_eq!(map.side(), 17);
        assert_eq!(map.cell(Position::new(16, 8)), Cell::Pawn(PlayerId::new(0)));
        assert_eq!(map.cell(Position::new(0, 8)), Cell::Pawn(PlayerId::new(1)));
        for c in [Position::new(7, 6), Position::new(7, 7), Position::new(7, 8)] {
            assert_eq!(map.cell(c), Cell::Wall);
        }
        assert_eq!(map.cell(Position::new(7, 9)), Cell::Empty);
        assert_eq!(map.cell(Position::new(-1, 0)), Cell::Invalid);
        assert_eq!(map.cell(Position::new(0, 17)), Cell::Invalid);
    }

    #[test]
    fn test_wall_blocks_crossing_only() {
        // Horizontal wall under cells (3,3) and (3,4)
        let wall = WallState::new(Position::new(3, 3), Orientation::Horizontal);
        let map = BoardMap::build(&snapshot_with_walls(&[wall]), PlayerId::new(0));

        assert!(map.is_blocked_between(Position::new(3, 3), Position::new(4, 3)));
        assert!(map.is_blocked_between(Position::new(4, 4), Position::new(3, 4)));
        assert!(!map.is_blocked_between(Position::new(3, 5), Position::new(4, 5)));
        assert!(!map.is_blocked_between(Position::new(3, 3), Position::new(3, 4)));
        // Off-board counts as blocked
        assert!(map.is_blocked_between(Position::new(0, 0), Position::new(-1, 0)));
    }

    #[test]
    fn test_intersections() {
        let wall = WallState::new(Position::new(3, 3), Orientation::Horizontal);
        let map = BoardMap::build(&snapshot_with_walls(&[wall]), PlayerId::new(0));

        assert!(map.intersects(wall));
        // Perpendicular through the same centre
        assert!(map.intersects(WallState::new(Position::new(3, 3), Orientation::Vertical)));
        // Collinear, sharing one cell
        assert!(map.intersects(WallState::new(Position::new(3, 4), Orientation::Horizontal)));
        assert!(map.intersects(WallState::new(Position::new(3, 2), Orientation::Horizontal)));
        // End to end is fine
        assert!(!map.intersects(WallState::new(Position::new(3, 5), Orientation::Horizontal)));
        // Parallel one row down is fine
        assert!(!map.intersects(WallState::new(Position::new(4, 3), Orientation::Horizontal)));
        // Vertical next to it doesn't touch
        assert!(!map.intersects(WallState::new(Position::new(3, 4), Orientation::Vertical)));
    }

    #[test]
    fn test_viewer_projection_is_rotated() {
        let wall = WallState::new(Position::new(0, 0), Orientation::Vertical);
        let snapshot = snapshot_with_walls(&[wall]);
        let theirs = BoardMap::build(&snapshot, PlayerId::new(1));
        // Player 1 sees itself at the bottom
        assert_eq!(theirs.pawn_at(Position::new(8, 4)), Some(PlayerId::new(1)));
        assert!(theirs.intersects(wall.rotate(2, 9)));
    }

    #[test]
    fn test_open_neighbors_respect_walls_and_edges() {
        let wall = WallState::new(Position::new(7, 3), Orientation::Horizontal);
        let map = BoardMap::build(&snapshot_with_walls(&[wall]), PlayerId::new(0));
        let mut around: Vec<_> = map.open_neighbors(Position::new(8, 4)).collect();
        around.sort();
        assert_eq!(around, vec![Position::new(8, 3), Position::new(8, 5)]);
    }
}
