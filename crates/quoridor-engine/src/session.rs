//! Live game coordination
//!
//! A running session is two OS threads: the turn loop, which hands the turn to
//! each agent in order, and an optional watchdog that ends the game when a move
//! has been in flight for too long. Ending the game is the only way either
//! thread is stopped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use quoridor_core::{PlayerId, QuoridorError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::game::{Game, GameHandle};
use crate::player::{Agent, Player};
use crate::registry::AgentRegistry;

/// How a session went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub winner: Option<PlayerId>,
    /// Turns that ended with an accepted action
    pub moves: u64,
    /// Agent calls that failed or panicked
    pub missed_ticks: u64,
    /// The watchdog ended the game
    pub timed_out: bool,
}

/// A game plus one agent per seat, ready to run
pub struct Session {
    game: Arc<Game>,
    agents: Vec<Box<dyn Agent>>,
    config: SessionConfig,
}

impl Session {
    /// `agents[i]` must play seat `i`
    pub fn new(game: Arc<Game>, agents: Vec<Box<dyn Agent>>, config: SessionConfig) -> Result<Self> {
        let expected = game.config().player_count;
        if agents.len() != expected {
            return Err(QuoridorError::InvalidPlayerCount(agents.len()));
        }
        if let Some((seat, agent)) = agents
            .iter()
            .enumerate()
            .find(|(seat, agent)| agent.player().id().index() != *seat)
        {
            return Err(QuoridorError::Config(format!(
                "seat {} is held by {}",
                seat,
                agent.player().id()
            )));
        }
        Ok(Self {
            game,
            agents,
            config,
        })
    }

    /// Seat one registered agent per name, in order
    pub fn from_registry(
        game: Arc<Game>,
        registry: &AgentRegistry,
        names: &[&str],
        config: SessionConfig,
    ) -> Result<Self> {
        let handle: Arc<dyn GameHandle> = game.clone();
        let agents = names
            .iter()
            .enumerate()
            .map(|(seat, name)| {
                let player = Player::new(PlayerId::new(seat as u8), *name, handle.clone());
                registry.create(name, player).map_err(QuoridorError::from)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(game, agents, config)
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    /// Spawn the turn loop and, if enabled, the watchdog
    pub fn start(self) -> Result<SessionHandle> {
        let Session {
            game,
            agents,
            config,
        } = self;

        let watchdog = if config.watchdog_enabled {
            let game = game.clone();
            let config = config.clone();
            Some(
                thread::Builder::new()
                    .name("quoridor-watchdog".into())
                    .spawn(move || run_watchdog(&game, &config))?,
            )
        } else {
            debug!("Watchdog disabled");
            None
        };

        let turn_loop = {
            let game = game.clone();
            thread::Builder::new()
                .name("quoridor-turns".into())
                .spawn(move || run_turn_loop(&game, agents, &config))
        };
        let turn_loop = match turn_loop {
            Ok(handle) => handle,
            Err(err) => {
                game.end();
                return Err(err.into());
            }
        };

        info!("Session started");
        Ok(SessionHandle {
            game,
            turn_loop: Some(turn_loop),
            watchdog,
        })
    }
}

/// Control over a running session
pub struct SessionHandle {
    game: Arc<Game>,
    turn_loop: Option<JoinHandle<SessionReport>>,
    watchdog: Option<JoinHandle<bool>>,
}

impl SessionHandle {
    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    pub fn is_finished(&self) -> bool {
        self.game.is_finished()
    }

    /// End the game; both threads exit shortly after
    pub fn stop(&self) {
        if self.game.end() {
            info!("Session stopped");
        }
    }

    /// Wait for both threads
    pub fn join(mut self) -> Result<SessionReport> {
        let mut report = match self.turn_loop.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| QuoridorError::Config("turn loop panicked".into()))?,
            None => SessionReport::default(),
        };
        if let Some(handle) = self.watchdog.take() {
            report.timed_out = handle
                .join()
                .map_err(|_| QuoridorError::Config("watchdog panicked".into()))?;
        }
        report.winner = self.game.board().winner();
        Ok(report)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.turn_loop.is_some() || self.watchdog.is_some() {
            self.game.end();
        }
    }
}

fn run_turn_loop(game: &Game, mut agents: Vec<Box<dyn Agent>>, config: &SessionConfig) -> SessionReport {
    let mut report = SessionReport::default();

    while !game.is_finished() {
        let current = game.current_player();
        let Some(agent) = agents.get_mut(current.index()) else {
            error!(player = %current, "No agent for seat");
            game.end();
            break;
        };

        game.begin_move(current);
        let started = Instant::now();
        let accepted_before = game.accepted_actions();

        let outcome = catch_unwind(AssertUnwindSafe(|| agent.do_next_move()));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        if let Some(reason) = failure {
            warn!(player = %current, %reason, "Agent failed, turn missed");
            report.missed_ticks += 1;
            thread::sleep(config.missed_tick_backoff);
            continue;
        }

        game.wait_player_move(current);
        let elapsed = started.elapsed();
        if game.accepted_actions() > accepted_before {
            report.moves += 1;
            agent.player().record_move_duration(elapsed);
            debug!(player = %current, ?elapsed, "Move done");
        }

        if !game.is_finished() && elapsed < config.min_move_duration {
            thread::sleep(config.min_move_duration - elapsed);
        }
    }

    info!(moves = report.moves, missed = report.missed_ticks, "Turn loop finished");
    report
}

/// Returns true if it had to end the game
fn run_watchdog(game: &Game, config: &SessionConfig) -> bool {
    loop {
        if game.is_finished() {
            return false;
        }
        let wait = match game.move_deadline(config.move_timeout) {
            Some((player, deadline)) if deadline.expired() => {
                warn!(player = %player, timeout = ?config.move_timeout, "Move timed out");
                return game.end();
            }
            Some((_, deadline)) => config.watchdog_poll.min(deadline.remaining()),
            None => config.watchdog_poll,
        };
        game.wait_for_change(wait.max(Duration::from_millis(1)));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
