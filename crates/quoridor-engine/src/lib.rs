//! # quoridor-engine
//!
//! Rule engine and live-game coordination for Quoridor.
//!
//! This crate provides:
//! - Legality checks and path search over a board snapshot
//! - `Game`, the turn sequencer every action goes through
//! - `Player` and the `Agent` hook decision logic implements
//! - `AgentRegistry`, mapping agent names to constructors
//! - `Session`, running the turn loop and the move-timeout watchdog

pub mod config;
pub mod game;
pub mod player;
pub mod registry;
pub mod rules;
pub mod session;

pub use config::SessionConfig;
pub use game::{ActionObserver, Game, GameHandle, GamePhase};
pub use player::{Agent, Player};
pub use registry::{AgentFactory, AgentRegistry, RegistryError};
pub use session::{Session, SessionHandle, SessionReport};
