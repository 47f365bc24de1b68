//! `quoridor` binary
//!
//! Runs a local game between built-in agents, hosts a game for remote
//! players, or joins one.

mod agents;
mod cli;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, GameArgs};
use quoridor_core::config::DEFAULT_WALL_POOL;
use quoridor_core::{GameConfig, PlayerId, QuoridorError};
use quoridor_engine::{Agent, Game, GameHandle, Player, Session, SessionConfig, SessionReport};
use quoridor_net::{ClientConfig, GameServer, RemoteGame, ServerConfig, discover};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Local { game, agents, json } => run_local(&game, &agents, json),
        Command::Host {
            game,
            agents,
            name,
            port,
            discovery_port,
            no_discovery,
            wait,
            json,
        } => {
            let server = ServerConfig {
                name,
                bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                tcp_port: port,
                discovery_port: (!no_discovery).then_some(discovery_port),
            };
            run_host(&game, &agents, server, Duration::from_secs(wait), json)
        }
        Command::Join {
            addr,
            agents,
            port,
            discovery_port,
            request_timeout,
        } => {
            let addr = match addr {
                Some(addr) => addr,
                None => find_host(discovery_port, port)?,
            };
            let config = ClientConfig {
                request_timeout: (request_timeout > 0)
                    .then(|| Duration::from_secs(request_timeout)),
                ..ClientConfig::default()
            };
            run_join(addr, &agents, config)
        }
        Command::Discover { port, wait } => {
            let found = lookup(port, Duration::from_millis(wait))?;
            if found.is_empty() {
                info!("No hosts answered");
            }
            for server in found {
                println!("{}\t{}", server.name, server.addr.ip());
            }
            Ok(())
        }
        Command::Agents => {
            for name in agents::registry()?.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn game_config(args: &GameArgs) -> Result<GameConfig> {
    let config = GameConfig {
        board_size: args.size,
        player_count: args.players,
        walls_per_player: args
            .walls
            .unwrap_or(DEFAULT_WALL_POOL / args.players.max(1)),
    };
    config.validate()?;
    Ok(config)
}

fn session_config(args: &GameArgs) -> SessionConfig {
    let config = SessionConfig::from_env();
    match args.move_timeout {
        Some(secs) => config.with_move_timeout(Duration::from_secs(secs)),
        None => config,
    }
}

fn run_local(args: &GameArgs, agents: &[String], json: bool) -> Result<()> {
    let registry = agents::registry()?;
    let game = Arc::new(Game::new(game_config(args)?)?);
    let names: Vec<&str> = agents.iter().map(String::as_str).collect();
    let session = Session::from_registry(game.clone(), &registry, &names, session_config(args))?;

    end_on_interrupt(game.clone());
    let report = session.start()?.join()?;
    summarize(&game, &report, json)
}

fn run_host(
    args: &GameArgs,
    agents: &[String],
    server_config: ServerConfig,
    wait: Duration,
    json: bool,
) -> Result<()> {
    let config = game_config(args)?;
    if agents.len() >= config.player_count {
        bail!(
            "{} local agents leave no seat for remote players",
            agents.len()
        );
    }
    let registry = agents::registry()?;
    let game = Arc::new(Game::new(config)?);
    let server = GameServer::bind(game.clone(), server_config)?;

    let remote: Vec<PlayerId> = (agents.len()..game.config().player_count)
        .map(|seat| PlayerId::new(seat as u8))
        .collect();
    server.open_seats(&remote);
    info!(addr = %server.local_addr(), seats = ?remote, "Waiting for remote players");
    let seats = server.wait_for_players(wait)?;

    let handle: Arc<dyn GameHandle> = game.clone();
    let mut seated = agents
        .iter()
        .enumerate()
        .map(|(seat, name)| {
            let player = Player::new(PlayerId::new(seat as u8), name.as_str(), handle.clone());
            registry.create(name, player).map_err(QuoridorError::from)
        })
        .collect::<Result<Vec<Box<dyn Agent>>, _>>()?;
    for seat in &seats {
        info!(player = %seat.player_id, name = %seat.name, "Remote seat");
        seated.push(Box::new(server.remote_agent(seat)));
    }

    let session = Session::new(game.clone(), seated, session_config(args))?;
    end_on_interrupt(game.clone());
    let report = session.start()?.join()?;
    summarize(&game, &report, json)?;
    server.shutdown();
    Ok(())
}

fn run_join(addr: SocketAddr, agents: &[String], config: ClientConfig) -> Result<()> {
    let registry = agents::registry()?;
    let client = RemoteGame::connect(addr, config)
        .with_context(|| format!("cannot join {addr}"))?;

    let mut seated = Vec::with_capacity(agents.len());
    for name in agents {
        let player = client.add_player(name)?;
        info!(player = %player.id(), agent = %name, "Playing");
        seated.push(registry.create(name, player)?);
    }
    client.run_agents(seated);

    match client.board().winner() {
        Some(winner) => println!("{winner} wins"),
        None => println!("no winner"),
    }
    Ok(())
}

fn lookup(port: u16, wait: Duration) -> Result<Vec<quoridor_net::DiscoveredServer>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));
    Ok(runtime.block_on(discover(target, wait))?)
}

fn find_host(discovery_port: u16, game_port: u16) -> Result<SocketAddr> {
    let found = lookup(discovery_port, Duration::from_secs(1))?;
    let host = found.first().context("no host answered discovery")?;
    info!(name = %host.name, ip = %host.addr.ip(), "Joining discovered host");
    Ok(SocketAddr::new(host.addr.ip(), game_port))
}

/// End `game` on Ctrl-C so the session winds down and remote clients hear
/// about it
fn end_on_interrupt(game: Arc<Game>) {
    let spawned = thread::Builder::new()
        .name("quoridor-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("No interrupt handler: {}", e);
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                warn!("Interrupted");
                game.end();
            }
        });
    if let Err(e) = spawned {
        warn!("No interrupt handler: {}", e);
    }
}

fn summarize(game: &Game, report: &SessionReport, json: bool) -> Result<()> {
    info!(
        moves = report.moves,
        missed_ticks = report.missed_ticks,
        timed_out = report.timed_out,
        "Session over"
    );
    match report.winner {
        Some(winner) => println!("{winner} wins after {} moves", report.moves),
        None => println!("no winner after {} moves", report.moves),
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&game.board().snapshot())?);
    }
    Ok(())
}
