//! Hosting side of the transport
//!
//! A [`GameServer`] owns a single-worker I/O runtime with an accept loop, an
//! optional discovery responder and one task per connected client. Remote
//! players take seats with `AddRemotePlayer`; the host drives those seats
//! through [`RemoteAgent`]s like any other agent.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use quoridor_core::{BoardSnapshot, Deadline, PlayerAction, PlayerId, QuoridorError, Result};
use quoridor_engine::{ActionObserver, Agent, Game, GameHandle, Player};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::discovery;
use crate::framing::{FrameReader, FrameWriter};
use crate::protocol::{BoardUpdate, Message, PROTOCOL_TOKEN, deserialize, serialize};
use crate::transport::{AsyncReader, AsyncWriter};

pub const DEFAULT_TCP_PORT: u16 = 7777;
pub const DEFAULT_DISCOVERY_PORT: u16 = 7778;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Announced to discovery queries and in handshake replies
    pub name: String,
    pub bind_addr: IpAddr,
    pub tcp_port: u16,
    /// `None` disables the discovery responder
    pub discovery_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "quoridor".into(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: DEFAULT_TCP_PORT,
            discovery_port: Some(DEFAULT_DISCOVERY_PORT),
        }
    }
}

/// A seat taken by a remote client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSeat {
    pub player_id: PlayerId,
    pub name: String,
    session: u64,
}

struct Client {
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<u64, Client>,
    open_seats: VecDeque<PlayerId>,
    seats: BTreeMap<PlayerId, RemoteSeat>,
}

/// Connected clients and seat table, shared by every session task
struct SessionHub {
    game: Arc<Game>,
    name: String,
    state: Mutex<HubState>,
    seated: Condvar,
    next_session: AtomicU64,
}

impl SessionHub {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, frame: &[u8]) {
        for client in self.lock().clients.values() {
            // A closed channel means the session is already on its way out
            let _ = client.outbound.send(frame.to_vec());
        }
    }

    /// Start forwarding broadcasts to a client, preceded by the current board
    fn attach(
        &self,
        session: u64,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        self.game.with_current_state(|snapshot, turn| {
            let update = BoardUpdate {
                turn,
                snapshot: snapshot.clone(),
            };
            let frame = serialize(&Message::BoardStateUpdate(update))?;
            let _ = outbound.send(frame);
            self.lock().clients.insert(session, Client { peer, outbound });
            Ok::<_, QuoridorError>(())
        })?;
        info!(%peer, session, "Client identified");
        Ok(())
    }

    fn detach(&self, session: u64) {
        let reopen = self.game.accepted_actions() == 0;
        let mut state = self.lock();
        let peer = state.clients.remove(&session).map(|c| c.peer);
        let lost: Vec<PlayerId> = state
            .seats
            .values()
            .filter(|seat| seat.session == session)
            .map(|seat| seat.player_id)
            .collect();
        for id in &lost {
            state.seats.remove(id);
            if reopen {
                state.open_seats.push_back(*id);
            }
        }
        if let Some(peer) = peer {
            info!(%peer, session, seats = ?lost, "Client disconnected");
        }
    }

    fn seat_player(&self, session: u64, name: String) -> Message {
        let mut state = self.lock();
        let Some(player_id) = state.open_seats.pop_front() else {
            return Message::failure("no free seat");
        };
        info!(%player_id, %name, "Remote player seated");
        state.seats.insert(
            player_id,
            RemoteSeat {
                player_id,
                name,
                session,
            },
        );
        self.seated.notify_all();
        Message::ok(vec![player_id.0])
    }

    async fn submit(&self, session: u64, action: PlayerAction) -> Message {
        let holds_seat = self
            .lock()
            .seats
            .get(&action.player_id)
            .is_some_and(|seat| seat.session == session);
        if !holds_seat {
            return Message::failure("seat not held by this client");
        }

        let game = self.game.clone();
        match tokio::task::spawn_blocking(move || game.process_player_action(&action)).await {
            Ok(Ok(())) => Message::ok(Vec::new()),
            Ok(Err(reason)) => Message::failure(&reason.to_string()),
            Err(e) => Message::failure(&format!("internal error: {e}")),
        }
    }

    fn request_move(&self, player_id: PlayerId) -> anyhow::Result<()> {
        let frame = serialize(&Message::RequestPlayerNextMove { player_id })?;
        let state = self.lock();
        let seat = state
            .seats
            .get(&player_id)
            .ok_or_else(|| anyhow!("{player_id} has no connected client"))?;
        let client = state
            .clients
            .get(&seat.session)
            .ok_or_else(|| anyhow!("{player_id}'s client is gone"))?;
        client
            .outbound
            .send(frame)
            .map_err(|_| anyhow!("{player_id}'s client is disconnecting"))
    }
}

impl ActionObserver for SessionHub {
    fn action_applied(&self, action: &PlayerAction, _next: PlayerId) {
        match serialize(&Message::PlayerAction(*action)) {
            Ok(frame) => self.broadcast(&frame),
            Err(e) => warn!(%action, "Cannot broadcast: {}", e),
        }
    }

    fn game_ended(&self, snapshot: &BoardSnapshot, turn: PlayerId) {
        let update = BoardUpdate {
            turn,
            snapshot: snapshot.clone(),
        };
        match serialize(&Message::BoardStateUpdate(update)) {
            Ok(frame) => self.broadcast(&frame),
            Err(e) => warn!("Cannot broadcast final board: {}", e),
        }
    }
}

/// Drives a remotely held seat from the host's session loop
pub struct RemoteAgent {
    player: Player,
    hub: Arc<SessionHub>,
}

impl Agent for RemoteAgent {
    fn player(&self) -> &Player {
        &self.player
    }

    /// Ask the client to move; the turn loop then waits for its action
    fn do_next_move(&mut self) -> anyhow::Result<()> {
        self.hub.request_move(self.player.id())
    }
}

/// The single-worker runtime every transport runs its I/O on
pub(crate) fn io_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("quoridor-io")
        .enable_all()
        .build()?)
}

/// Hosts one game for remote players
pub struct GameServer {
    runtime: Option<Runtime>,
    hub: Arc<SessionHub>,
    local_addr: SocketAddr,
    discovery_addr: Option<SocketAddr>,
}

impl GameServer {
    /// Bind the listeners and start serving `game`
    pub fn bind(game: Arc<Game>, config: ServerConfig) -> Result<Self> {
        let runtime = io_runtime()?;
        let (listener, discovery) = runtime.block_on(async {
            let listener = TcpListener::bind((config.bind_addr, config.tcp_port)).await?;
            let discovery = match config.discovery_port {
                Some(port) => Some(UdpSocket::bind((config.bind_addr, port)).await?),
                None => None,
            };
            Ok::<_, QuoridorError>((listener, discovery))
        })?;
        let local_addr = listener.local_addr()?;
        let discovery_addr = discovery.as_ref().map(UdpSocket::local_addr).transpose()?;

        let hub = Arc::new(SessionHub {
            game: game.clone(),
            name: config.name.clone(),
            state: Mutex::new(HubState::default()),
            seated: Condvar::new(),
            next_session: AtomicU64::new(1),
        });
        game.set_observer(hub.clone());
        runtime.spawn(accept_loop(listener, hub.clone()));
        if let Some(socket) = discovery {
            runtime.spawn(discovery::respond(socket, config.name.clone()));
        }

        info!(%local_addr, ?discovery_addr, name = %config.name, "Hosting game");
        Ok(Self {
            runtime: Some(runtime),
            hub,
            local_addr,
            discovery_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery_addr
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.hub.game
    }

    /// Make seats available to `AddRemotePlayer`, handed out in order
    pub fn open_seats(&self, seats: &[PlayerId]) {
        let mut state = self.hub.lock();
        for &seat in seats {
            if !state.open_seats.contains(&seat) && !state.seats.contains_key(&seat) {
                state.open_seats.push_back(seat);
            }
        }
    }

    /// Block until every open seat is taken
    pub fn wait_for_players(&self, timeout: Duration) -> Result<Vec<RemoteSeat>> {
        let deadline = Deadline::after(timeout);
        let mut state = self.hub.lock();
        while !state.open_seats.is_empty() {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(QuoridorError::Timeout(format!(
                    "{} seat(s) still open",
                    state.open_seats.len()
                )));
            }
            state = self
                .hub
                .seated
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(state.seats.values().cloned().collect())
    }

    /// Agent for a seat returned by [`wait_for_players`](Self::wait_for_players)
    pub fn remote_agent(&self, seat: &RemoteSeat) -> RemoteAgent {
        let handle: Arc<dyn GameHandle> = self.hub.game.clone();
        RemoteAgent {
            player: Player::new(seat.player_id, seat.name.clone(), handle),
            hub: self.hub.clone(),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.hub.lock().clients.len()
    }

    /// Drop every connection and stop serving
    pub fn shutdown(mut self) {
        info!(addr = %self.local_addr, "Shutting down host");
        self.hub.game.clear_observer();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.hub.game.clear_observer();
        self.hub.lock().clients.clear();
        debug!("Stopping I/O runtime");
    }
}

async fn accept_loop(listener: TcpListener, hub: Arc<SessionHub>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Connection");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, "set_nodelay failed: {}", e);
                }
                tokio::spawn(serve_client(hub.clone(), stream, peer));
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn write_loop<W: AsyncWriter>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&frame).await {
            debug!("Write loop stopping: {}", e);
            break;
        }
    }
}

async fn serve_client(hub: Arc<SessionHub>, stream: TcpStream, peer: SocketAddr) {
    let session = hub.next_session.fetch_add(1, Ordering::Relaxed);
    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(FrameWriter(write_half), outbound_rx));
    let mut reader = FrameReader::new(read_half);
    let mut identified = false;

    loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%peer, "Session ending: {}", e);
                break;
            }
        };

        let mut close = false;
        let reply = match deserialize(&frame) {
            Err(e) => {
                warn!(%peer, "Malformed frame: {}", e);
                Message::failure(&e.to_string())
            }
            Ok(Message::Identification(token)) => {
                if token != PROTOCOL_TOKEN {
                    warn!(%peer, %token, "Handshake mismatch");
                    close = true;
                    Message::failure("handshake mismatch")
                } else if let Err(e) = hub.attach(session, peer, outbound.clone()) {
                    warn!(%peer, "Cannot sync board: {}", e);
                    close = true;
                    Message::failure(&format!("cannot sync board: {e}"))
                } else {
                    identified = true;
                    Message::ok(hub.name.as_bytes())
                }
            }
            Ok(_) if !identified => Message::failure("identify first"),
            Ok(Message::AddRemotePlayer { name }) => hub.seat_player(session, name),
            Ok(Message::PlayerAction(action)) => hub.submit(session, action).await,
            Ok(other) => Message::failure(&format!("unexpected {:?}", other.message_type())),
        };

        let sent = serialize(&reply)
            .map(|bytes| outbound.send(bytes).is_ok())
            .unwrap_or(false);
        if close || !sent {
            break;
        }
    }

    hub.detach(session);
    drop(outbound);
    let _ = writer.await;
}
