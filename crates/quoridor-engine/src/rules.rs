//! Legality checks and path search
//!
//! Everything here is a pure function of a [`BoardSnapshot`]. Checks run in the
//! acting player's own frame on a freshly built [`BoardMap`] and return the first
//! reason for rejection.
//!
//! Turn order is not checked here; that belongs to the turn sequencer.

use std::collections::VecDeque;

use quoridor_core::{
    ActionKind, ActionResult, BoardMap, BoardSnapshot, PlayerAction, PlayerId, Position,
    Rejection, WallState,
};

/// Validate `action` (canonical frame) against `snapshot`
pub fn check_action(snapshot: &BoardSnapshot, action: &PlayerAction) -> ActionResult {
    if snapshot.finished {
        return Err(Rejection::GameFinished);
    }
    let player = action.player_id;
    if snapshot.player(player).is_none() {
        return Err(Rejection::UnknownPlayer(player));
    }
    match action.kind {
        ActionKind::Move { target } => check_move(snapshot, player, target),
        ActionKind::Wall { wall } => check_wall(snapshot, player, wall),
        ActionKind::Invalid => Err(Rejection::InvalidAction),
    }
}

/// Validate a pawn move to canonical `target`
pub fn check_move(snapshot: &BoardSnapshot, player: PlayerId, target: Position) -> ActionResult {
    let size = snapshot.size;
    if !target.in_bounds(size) {
        return Err(Rejection::OutOfBounds);
    }
    let turns = snapshot.view_turns(player);
    let view = snapshot.rotated(turns);
    let from = view
        .player(player)
        .ok_or(Rejection::UnknownPlayer(player))?
        .position;
    let target = target.rotate(turns, size);
    let map = BoardMap::from_view(&view);

    let delta = target - from;
    match (delta.x.abs(), delta.y.abs()) {
        (0, 1) | (1, 0) => {
            if map.is_blocked_between(from, target) {
                return Err(Rejection::BlockedByWall);
            }
        }
        (0, 2) | (2, 0) => check_straight_jump(&map, from, target)?,
        (1, 1) => check_diagonal_jump(&map, from, target)?,
        _ => return Err(Rejection::IllegalDistance),
    }

    if map.pawn_at(target).is_some() {
        return Err(Rejection::Occupied);
    }
    Ok(())
}

fn check_straight_jump(map: &BoardMap, from: Position, target: Position) -> ActionResult {
    let step = Position::new((target.x - from.x) / 2, (target.y - from.y) / 2);
    let over = from + step;
    if map.pawn_at(over).is_none() {
        return Err(Rejection::IllegalJump);
    }
    if map.is_blocked_between(from, over) || map.is_blocked_between(over, target) {
        return Err(Rejection::BlockedByWall);
    }
    Ok(())
}

/// A diagonal step is a sidestep around an adjacent pawn that cannot be
/// jumped straight over
fn check_diagonal_jump(map: &BoardMap, from: Position, target: Position) -> ActionResult {
    let candidates = [
        Position::new(target.x, from.y),
        Position::new(from.x, target.y),
    ];
    let legal = candidates.into_iter().any(|over| {
        if map.pawn_at(over).is_none() || map.is_blocked_between(from, over) {
            return false;
        }
        let behind = over + (over - from);
        let straight_blocked = map.is_blocked_between(over, behind) || map.pawn_at(behind).is_some();
        straight_blocked && !map.is_blocked_between(over, target)
    });
    if legal { Ok(()) } else { Err(Rejection::IllegalJump) }
}

/// Validate a wall placement (canonical frame), including the path check
pub fn check_wall(snapshot: &BoardSnapshot, player: PlayerId, wall: WallState) -> ActionResult {
    let size = snapshot.size;
    if !wall.in_bounds(size) {
        return Err(Rejection::OutOfBounds);
    }
    let state = snapshot.player(player).ok_or(Rejection::UnknownPlayer(player))?;
    if state.walls_remaining == 0 {
        return Err(Rejection::NoWallsLeft);
    }

    let turns = snapshot.view_turns(player);
    let view = snapshot.rotated(turns);
    let wall = wall.rotate(turns, size);
    let mut map = BoardMap::from_view(&view);
    if map.intersects(wall) {
        return Err(Rejection::IntersectingWall);
    }

    map.place_wall(wall);
    for (i, other) in view.players.iter().enumerate() {
        if bfs(&map, other.position, |p| other.is_goal(p, size)).is_none() {
            return Err(Rejection::BlocksPath(PlayerId::new(i as u8)));
        }
    }
    Ok(())
}

/// Breadth-first search over pawn cells, crossing only unwalled edges and
/// ignoring pawns. Returns the path (excluding `start`) to the nearest cell
/// satisfying `goal`.
fn bfs(map: &BoardMap, start: Position, goal: impl Fn(Position) -> bool) -> Option<Vec<Position>> {
    let size = map.board_size();
    let index = |p: Position| p.x as usize * size + p.y as usize;
    if !start.in_bounds(size) {
        return None;
    }
    if goal(start) {
        return Some(Vec::new());
    }

    let mut parent: Vec<Option<Position>> = vec![None; size * size];
    let mut seen = vec![false; size * size];
    let mut queue = VecDeque::from([start]);
    seen[index(start)] = true;

    while let Some(current) = queue.pop_front() {
        for next in map.open_neighbors(current) {
            let i = index(next);
            if seen[i] {
                continue;
            }
            seen[i] = true;
            parent[i] = Some(current);
            if goal(next) {
                let mut path = vec![next];
                let mut cursor = current;
                while cursor != start {
                    path.push(cursor);
                    cursor = parent[index(cursor)]?;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// Shortest wall-respecting route for `player` to its goal row, in the
/// player's own frame. Pawns are ignored.
pub fn shortest_path(snapshot: &BoardSnapshot, player: PlayerId) -> Option<Vec<Position>> {
    let view = snapshot.for_viewer(player);
    let me = view.player(player)?;
    let map = BoardMap::from_view(&view);
    bfs(&map, me.position, |p| me.is_goal(p, view.size))
}

/// Number of steps `player` is away from its goal, `None` if sealed in
pub fn distance_to_goal(snapshot: &BoardSnapshot, player: PlayerId) -> Option<usize> {
    shortest_path(snapshot, player).map(|path| path.len())
}

/// Every legal pawn target for `player`, canonical frame, sorted
pub fn legal_targets(snapshot: &BoardSnapshot, player: PlayerId) -> Vec<Position> {
    let Some(me) = snapshot.player(player) else {
        return Vec::new();
    };
    let origin = me.position;
    let mut targets = Vec::new();
    for dx in -2..=2 {
        for dy in -2..=2 {
            let candidate = origin + Position::new(dx, dy);
            if candidate != origin
                && candidate.manhattan(origin) <= 2
                && check_move(snapshot, player, candidate).is_ok()
            {
                targets.push(candidate);
            }
        }
    }
    targets
}
