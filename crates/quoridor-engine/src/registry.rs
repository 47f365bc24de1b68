//! Agent registry
//!
//! Maps agent names to constructors. Built once at startup, then only read by
//! whoever seats players.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::player::{Agent, Player};

/// Environment variable overriding where agent implementations are looked up
pub const AGENT_PATH_ENV: &str = "QUORIDOR_AGENT_PATH";

/// Builds an agent around its seat
pub type AgentFactory = Arc<dyn Fn(Player) -> Box<dyn Agent> + Send + Sync>;

/// Registry of agent constructors
#[derive(Default)]
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
    search_path: Option<PathBuf>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with the search path taken from `QUORIDOR_AGENT_PATH`
    pub fn from_env() -> Self {
        let search_path = std::env::var_os(AGENT_PATH_ENV).map(PathBuf::from);
        if let Some(path) = &search_path {
            debug!(path = %path.display(), "Agent search path");
        }
        Self {
            factories: HashMap::new(),
            search_path,
        }
    }

    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Where out-of-process agent implementations would be found
    pub fn search_path(&self) -> Option<&Path> {
        self.search_path.as_deref()
    }

    /// Register a constructor under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(Player) -> Box<dyn Agent> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        debug!(agent = %name, "Registered agent");
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Build the agent registered as `name` for `player`
    pub fn create(&self, name: &str, player: Player) -> Result<Box<dyn Agent>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(factory(player))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered agents
    pub fn count(&self) -> usize {
        self.factories.len()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .field("search_path", &self.search_path)
            .finish()
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Agent not found: {0}")]
    NotFound(String),
}

impl From<RegistryError> for quoridor_core::QuoridorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => quoridor_core::QuoridorError::AgentNotRegistered(name),
            other => quoridor_core::QuoridorError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Game, GameHandle};
    use quoridor_core::{GameConfig, PlayerId, QuoridorError};

    struct Idle(Player);

    impl Agent for Idle {
        fn player(&self) -> &Player {
            &self.0
        }

        fn do_next_move(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn seat() -> Player {
        let game: Arc<dyn GameHandle> = Arc::new(Game::new(GameConfig::default()).unwrap());
        Player::new(PlayerId::new(0), "idle", game)
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = AgentRegistry::new();
        registry
            .register("idle", |p| Box::new(Idle(p)) as Box<dyn Agent>)
            .unwrap();
        assert!(registry.contains("idle"));
        assert_eq!(registry.count(), 1);

        let agent = registry.create("idle", seat()).unwrap();
        assert_eq!(agent.player().name(), "idle");
    }

    #[test]
    fn test_duplicate_names_are_refused() {
        let mut registry = AgentRegistry::new();
        registry
            .register("idle", |p| Box::new(Idle(p)) as Box<dyn Agent>)
            .unwrap();
        let err = registry
            .register("idle", |p| Box::new(Idle(p)) as Box<dyn Agent>)
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_unknown_agent() {
        let registry = AgentRegistry::new().with_search_path("/opt/agents");
        assert_eq!(registry.search_path(), Some(Path::new("/opt/agents")));
        let err = registry.create("minimax", seat()).err().unwrap();
        assert!(matches!(
            QuoridorError::from(err),
            QuoridorError::AgentNotRegistered(name) if name == "minimax"
        ));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = AgentRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(name, |p| Box::new(Idle(p)) as Box<dyn Agent>)
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }
}
