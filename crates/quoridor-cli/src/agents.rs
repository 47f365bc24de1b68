//! Built-in agents
//!
//! `runner` walks its shortest path. `blocker` does the same until an
//! opponent is closer to their goal, then spends walls to slow them down.

use anyhow::{Context, anyhow};
use quoridor_core::{Orientation, PlayerAction, PlayerId, Position, WallState};
use quoridor_engine::rules::{check_action, distance_to_goal};
use quoridor_engine::{Agent, AgentRegistry, Player, RegistryError};
use tracing::debug;

pub fn registry() -> Result<AgentRegistry, RegistryError> {
    let mut registry = AgentRegistry::from_env();
    registry.register("runner", |player| Box::new(Runner(player)) as Box<dyn Agent>)?;
    registry.register("blocker", |player| Box::new(Blocker(player)) as Box<dyn Agent>)?;
    Ok(registry)
}

/// Step along the shortest path, sidestepping a pawn that is in the way
fn advance(player: &Player) -> anyhow::Result<()> {
    let next = player
        .shortest_path()
        .and_then(|path| path.first().copied())
        .ok_or_else(|| anyhow!("{} has no path to its goal", player.id()))?;
    if player.move_to(next).is_ok() {
        return Ok(());
    }
    let fallback = player
        .legal_moves()
        .into_iter()
        .next()
        .context("no legal move")?;
    player.move_to(fallback)?;
    Ok(())
}

pub struct Runner(Player);

impl Agent for Runner {
    fn player(&self) -> &Player {
        &self.0
    }

    fn do_next_move(&mut self) -> anyhow::Result<()> {
        advance(&self.0)
    }
}

pub struct Blocker(Player);

impl Blocker {
    /// Wall that hurts the leading opponent most relative to us, if any
    /// strictly helps
    fn best_wall(&self) -> Option<PlayerAction> {
        let me = self.0.id();
        let snapshot = self.0.board().snapshot();
        let mine = distance_to_goal(&snapshot, me)?;
        let (rival, theirs) = PlayerId::all(snapshot.player_count())
            .filter(|&id| id != me)
            .filter_map(|id| distance_to_goal(&snapshot, id).map(|d| (id, d)))
            .min_by_key(|&(_, d)| d)?;
        if theirs >= mine {
            return None;
        }

        let anchors = snapshot.size as i32 - 1;
        let mut best: Option<(i64, PlayerAction)> = None;
        for x in 0..anchors {
            for y in 0..anchors {
                for orientation in [Orientation::Horizontal, Orientation::Vertical] {
                    let action = PlayerAction::wall(
                        me,
                        WallState::new(Position::new(x, y), orientation),
                    );
                    if check_action(&snapshot, &action).is_err() {
                        continue;
                    }
                    let mut after = snapshot.clone();
                    after.apply_unchecked(&action);
                    let (Some(rival_after), Some(mine_after)) = (
                        distance_to_goal(&after, rival),
                        distance_to_goal(&after, me),
                    ) else {
                        continue;
                    };
                    let gain = (rival_after as i64 - theirs as i64) - (mine_after as i64 - mine as i64);
                    if gain > 0 && best.is_none_or(|(score, _)| gain > score) {
                        best = Some((gain, action));
                    }
                }
            }
        }
        best.map(|(_, action)| action)
    }
}

impl Agent for Blocker {
    fn player(&self) -> &Player {
        &self.0
    }

    fn do_next_move(&mut self) -> anyhow::Result<()> {
        if self.0.walls_left() > 0 {
            if let Some(action) = self.best_wall() {
                debug!(player = %self.0.id(), %action, "Blocking");
                if self.0.game().process_player_action(&action).is_ok() {
                    return Ok(());
                }
            }
        }
        advance(&self.0)
    }
}
