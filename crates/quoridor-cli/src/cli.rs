//! Command-line interface

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use quoridor_net::{DEFAULT_DISCOVERY_PORT, DEFAULT_TCP_PORT};

/// Quoridor for 2 to 4 players, locally or over the network
#[derive(Parser, Debug)]
#[command(name = "quoridor")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a game between built-in agents in this process
    Local {
        #[command(flatten)]
        game: GameArgs,

        /// Agent for each seat, in seat order
        #[arg(short, long = "agent", default_values = ["runner", "runner"])]
        agents: Vec<String>,

        /// Print the final board as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Host a game that remote players can join
    Host {
        #[command(flatten)]
        game: GameArgs,

        /// Agent for each local seat, in seat order. Remaining seats are
        /// opened to remote players.
        #[arg(short, long = "agent")]
        agents: Vec<String>,

        /// Name announced to discovery queries
        #[arg(long, default_value = "quoridor")]
        name: String,

        #[arg(short, long, default_value_t = DEFAULT_TCP_PORT)]
        port: u16,

        #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
        discovery_port: u16,

        /// Do not answer discovery queries
        #[arg(long)]
        no_discovery: bool,

        /// Seconds to wait for remote players
        #[arg(long, default_value_t = 300)]
        wait: u64,

        #[arg(long)]
        json: bool,
    },

    /// Join a hosted game
    Join {
        /// Host address. Without it the first host found by discovery is used.
        addr: Option<SocketAddr>,

        /// Agent to play with; pass several to take several seats
        #[arg(short, long = "agent", default_values = ["runner"])]
        agents: Vec<String>,

        /// Game port of a discovered host
        #[arg(short, long, default_value_t = DEFAULT_TCP_PORT)]
        port: u16,

        #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
        discovery_port: u16,

        /// Seconds each request may take; 0 waits forever
        #[arg(long, default_value_t = 30)]
        request_timeout: u64,
    },

    /// List hosts answering on the local network
    Discover {
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
        port: u16,

        /// Milliseconds to collect answers for
        #[arg(long, default_value_t = 1000)]
        wait: u64,
    },

    /// List the built-in agents
    Agents,
}

#[derive(Args, Debug, Clone)]
pub struct GameArgs {
    /// Seats at the table (2 to 4)
    #[arg(long, default_value_t = 2)]
    pub players: usize,

    /// Board side
    #[arg(long, default_value_t = quoridor_core::config::DEFAULT_BOARD_SIZE)]
    pub size: usize,

    /// Walls per player; defaults to 20 split between the players
    #[arg(long)]
    pub walls: Option<usize>,

    /// Seconds a player may think before the watchdog ends the game
    #[arg(long)]
    pub move_timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_local_defaults() {
        let cli = Cli::try_parse_from(["quoridor", "local"]).unwrap();
        let Command::Local { game, agents, json } = cli.command else {
            panic!("expected local");
        };
        assert_eq!(game.players, 2);
        assert_eq!(game.size, 9);
        assert_eq!(agents, vec!["runner", "runner"]);
        assert!(!json);
    }

    #[test]
    fn test_join_parses_address_and_agents() {
        let cli =
            Cli::try_parse_from(["quoridor", "join", "10.0.0.2:7777", "-a", "blocker", "-a", "runner"])
                .unwrap();
        let Command::Join { addr, agents, .. } = cli.command else {
            panic!("expected join");
        };
        assert_eq!(addr, Some("10.0.0.2:7777".parse().unwrap()));
        assert_eq!(agents, vec!["blocker", "runner"]);
    }
}
