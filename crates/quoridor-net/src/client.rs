//! Blocking client for a remote host
//!
//! [`RemoteGame`] keeps a mirror of the host's board, updated from the
//! notifications the host pushes, and implements [`GameHandle`] so ordinary
//! [`Player`]s and agents can play through it. Calls block the caller while
//! the single I/O worker does the socket work.

use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quoridor_core::{
    ActionResult, BoardState, BoardWriter, Deadline, GameConfig, PlayerAction, PlayerId,
    QuoridorError, Rejection, Result,
};
use quoridor_engine::{Agent, GameHandle, Player};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::framing::{FrameReader, FrameWriter, TcpFrameReader, TcpFrameWriter};
use crate::protocol::{BoardUpdate, Message, PROTOCOL_TOKEN, deserialize, encode_action, serialize};
use crate::server::io_runtime;
use crate::transport::{AsyncReader, AsyncWriter, PendingReply, reader_task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a request waits for its response. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

struct MirrorInner {
    writer: BoardWriter,
    turn: PlayerId,
    connected: bool,
}

/// Local copy of the host's board
struct Mirror {
    board: Arc<BoardState>,
    player_count: usize,
    inner: Mutex<MirrorInner>,
    changed: Condvar,
}

impl Mirror {
    fn new(update: BoardUpdate) -> Self {
        let config = GameConfig {
            board_size: update.snapshot.size,
            player_count: update.snapshot.player_count(),
            walls_per_player: update
                .snapshot
                .players
                .iter()
                .map(|p| p.walls_remaining as usize)
                .max()
                .unwrap_or(0),
        };
        let (board, writer) = BoardState::create(&config);
        writer.restore(update.snapshot).notify();
        Self {
            board,
            player_count: config.player_count,
            inner: Mutex::new(MirrorInner {
                writer,
                turn: update.turn,
                connected: true,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MirrorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_action(&self, action: &PlayerAction) {
        let changed = {
            let mut inner = self.lock();
            let changed = inner.writer.apply_action(action);
            inner.turn = action.player_id.next(self.player_count);
            self.changed.notify_all();
            changed
        };
        changed.notify();
    }

    fn restore(&self, update: BoardUpdate) {
        let changed = {
            let mut inner = self.lock();
            // Board updates do not carry the last action
            let mut snapshot = update.snapshot;
            if snapshot.last_action.is_none() {
                snapshot.last_action = self.board.snapshot().last_action;
            }
            let changed = inner.writer.restore(snapshot);
            inner.turn = update.turn;
            self.changed.notify_all();
            changed
        };
        changed.notify();
    }

    /// The host is gone; nothing will move again
    fn disconnect(&self) {
        let changed = {
            let mut inner = self.lock();
            inner.connected = false;
            let changed = inner.writer.finish(None);
            self.changed.notify_all();
            changed
        };
        changed.notify();
    }

    fn turn(&self) -> PlayerId {
        self.lock().turn
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn is_waiting_on(&self, inner: &MirrorInner, player: PlayerId) -> bool {
        inner.connected && !self.board.is_finished() && inner.turn == player
    }

    /// Block while it is `player`'s turn. Returns false if `deadline` passed first.
    fn wait_until_moved(&self, player: PlayerId, deadline: Option<Deadline>) -> bool {
        let mut inner = self.lock();
        while self.is_waiting_on(&inner, player) {
            inner = match deadline {
                Some(deadline) => {
                    let remaining = deadline.remaining();
                    if remaining.is_zero() {
                        return false;
                    }
                    self.changed
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }
}

/// Connection to a hosted game
pub struct RemoteGame {
    runtime: Runtime,
    writer: Arc<tokio::sync::Mutex<TcpFrameWriter>>,
    requests: mpsc::UnboundedSender<PendingReply>,
    /// Held for a whole write-and-wait so responses pair up in order
    round_trip: Mutex<()>,
    mirror: Arc<Mirror>,
    move_requests: Mutex<std_mpsc::Receiver<PlayerId>>,
    server_name: String,
    config: ClientConfig,
}

impl RemoteGame {
    /// Connect, identify and sync the board
    pub fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Arc<Self>> {
        let runtime = io_runtime()?;
        let limit = config.connect_timeout;
        let (reader, writer, server_name, update) = runtime.block_on(async move {
            let stream = tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| QuoridorError::Timeout(format!("connecting to {addr}")))??;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            let mut reader = FrameReader::new(read_half);
            let mut writer = FrameWriter(write_half);

            let hello = serialize(&Message::Identification(PROTOCOL_TOKEN.into()))?;
            writer.write_frame(&hello).await?;
            let (name, update) = tokio::time::timeout(limit, handshake(&mut reader))
                .await
                .map_err(|_| QuoridorError::Timeout(format!("handshake with {addr}")))??;
            Ok::<_, QuoridorError>((reader, writer, name, update))
        })?;

        let mirror = Arc::new(Mirror::new(update));
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (move_tx, move_rx) = std_mpsc::channel();

        let notified = mirror.clone();
        let on_notification = move |msg: Message| match msg {
            Message::PlayerAction(action) => notified.apply_action(&action),
            Message::BoardStateUpdate(update) => notified.restore(update),
            Message::RequestPlayerNextMove { player_id } => {
                let _ = move_tx.send(player_id);
            }
            other => warn!("Unexpected {:?} from host", other.message_type()),
        };
        let closed = mirror.clone();
        runtime.spawn(async move {
            reader_task(reader, request_rx, on_notification).await;
            info!("Host connection closed");
            closed.disconnect();
        });

        info!(%addr, server = %server_name, "Connected");
        Ok(Arc::new(Self {
            runtime,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            requests,
            round_trip: Mutex::new(()),
            mirror,
            move_requests: Mutex::new(move_rx),
            server_name,
            config,
        }))
    }

    /// Name the host announced in its handshake reply
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn is_connected(&self) -> bool {
        self.mirror.is_connected()
    }

    /// Take a seat. The host picks which one.
    pub fn add_player(self: &Arc<Self>, name: &str) -> Result<Player> {
        let reply = self.request(&Message::AddRemotePlayer { name: name.into() })?;
        match reply {
            Message::ServerResponse {
                success: true,
                payload,
            } => {
                let id = payload.first().copied().ok_or_else(|| {
                    QuoridorError::ProtocolError("seat reply without a player id".into())
                })?;
                let handle: Arc<dyn GameHandle> = self.clone();
                info!(player = id, %name, "Seated");
                Ok(Player::new(PlayerId::new(id), name, handle))
            }
            Message::ServerResponse {
                success: false,
                payload,
            } => Err(QuoridorError::Config(format!(
                "host refused seat: {}",
                String::from_utf8_lossy(&payload)
            ))),
            other => Err(QuoridorError::ProtocolError(format!(
                "unexpected {:?} reply",
                other.message_type()
            ))),
        }
    }

    /// Next seat the host wants a move from, or `None` once the game is over
    /// or the host has gone away
    pub fn next_move_request(&self) -> Option<PlayerId> {
        let requests = self
            .move_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match requests.recv_timeout(Duration::from_millis(100)) {
                Ok(player) => return Some(player),
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    if self.mirror.board.is_finished() {
                        return None;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Serve move requests with `agents` until the game ends
    pub fn run_agents(&self, mut agents: Vec<Box<dyn Agent>>) {
        while let Some(player) = self.next_move_request() {
            let Some(agent) = agents.iter_mut().find(|a| a.player().id() == player) else {
                warn!(%player, "Move requested for a seat this client does not hold");
                continue;
            };
            if let Err(e) = agent.do_next_move() {
                warn!(%player, "Agent failed: {:#}", e);
            }
        }
        match self.mirror.board.winner() {
            Some(winner) => info!(%winner, "Game over"),
            None => info!("Game over without a winner"),
        }
    }

    fn request(&self, msg: &Message) -> Result<Message> {
        let frame = serialize(msg)?;
        let _turn = self
            .round_trip
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .map_err(|_| QuoridorError::IpcError("connection closed".into()))?;

        let writer = self.writer.clone();
        let exchange = async move {
            writer.lock().await.write_frame(&frame).await?;
            match reply_rx.await {
                Ok(reply) => reply,
                Err(_) => Err(QuoridorError::IpcError("connection lost".into())),
            }
        };
        match self.config.request_timeout {
            Some(limit) => self.runtime.block_on(async move {
                match tokio::time::timeout(limit, exchange).await {
                    Ok(reply) => reply,
                    Err(_) => Err(QuoridorError::Timeout(format!(
                        "no response within {limit:?}"
                    ))),
                }
            }),
            None => self.runtime.block_on(exchange),
        }
    }
}

impl GameHandle for RemoteGame {
    fn board(&self) -> Arc<BoardState> {
        self.mirror.board.clone()
    }

    fn process_player_action(&self, action: &PlayerAction) -> ActionResult {
        if encode_action(action).is_err() {
            return Err(Rejection::OutOfBounds);
        }
        match self.request(&Message::PlayerAction(*action)) {
            Ok(Message::ServerResponse { success: true, .. }) => Ok(()),
            Ok(Message::ServerResponse {
                success: false,
                payload,
            }) => {
                let reason = String::from_utf8_lossy(&payload).into_owned();
                debug!(%action, %reason, "Host rejected action");
                Err(Rejection::Remote(reason))
            }
            Ok(other) => Err(Rejection::Transport(format!(
                "unexpected {:?} reply",
                other.message_type()
            ))),
            Err(e) => Err(Rejection::Transport(e.to_string())),
        }
    }

    fn current_player(&self) -> PlayerId {
        self.mirror.turn()
    }

    fn wait_player_move(&self, player: PlayerId) {
        self.mirror.wait_until_moved(player, None);
    }

    fn wait_player_move_until(&self, player: PlayerId, deadline: Deadline) -> bool {
        self.mirror.wait_until_moved(player, Some(deadline))
    }
}

/// Read the host's answer to `Identification`: the board sync, possibly
/// actions that landed meanwhile, then the response itself
async fn handshake(reader: &mut TcpFrameReader) -> Result<(String, BoardUpdate)> {
    let mut synced: Option<BoardUpdate> = None;
    loop {
        match deserialize(&reader.read_frame().await?)? {
            Message::BoardStateUpdate(update) => synced = Some(update),
            Message::PlayerAction(action) => {
                if let Some(update) = synced.as_mut() {
                    update.snapshot.apply_unchecked(&action);
                    update.turn = action.player_id.next(update.snapshot.player_count());
                }
            }
            Message::ServerResponse {
                success: true,
                payload,
            } => {
                let update = synced.ok_or_else(|| {
                    QuoridorError::ProtocolError("host accepted without sending the board".into())
                })?;
                return Ok((String::from_utf8_lossy(&payload).into_owned(), update));
            }
            Message::ServerResponse {
                success: false,
                payload,
            } => {
                return Err(QuoridorError::ProtocolError(format!(
                    "host refused handshake: {}",
                    String::from_utf8_lossy(&payload)
                )));
            }
            other => debug!("Ignoring {:?} during handshake", other.message_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{GameServer, ServerConfig};
    use quoridor_core::{Direction, Position};
    use quoridor_engine::{Game, Session, SessionConfig};
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;

    const P0: PlayerId = PlayerId::new(0);
    const P1: PlayerId = PlayerId::new(1);

    struct Runner(Player);

    impl Agent for Runner {
        fn player(&self) -> &Player {
            &self.0
        }

        fn do_next_move(&mut self) -> anyhow::Result<()> {
            let next = self
                .0
                .shortest_path()
                .and_then(|path| path.first().copied())
                .ok_or_else(|| anyhow::anyhow!("no path"))?;
            if self.0.move_to(next).is_err() {
                let side = self.0.legal_moves().into_iter().next();
                self.0.move_to(side.ok_or_else(|| anyhow::anyhow!("stuck"))?)?;
            }
            Ok(())
        }
    }

    fn host(seats: &[PlayerId]) -> GameServer {
        let game = Arc::new(Game::new(GameConfig::default()).unwrap());
        let server = GameServer::bind(
            game,
            ServerConfig {
                name: "den".into(),
                bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                tcp_port: 0,
                discovery_port: None,
            },
        )
        .unwrap();
        server.open_seats(seats);
        server
    }

    fn join(server: &GameServer) -> Arc<RemoteGame> {
        RemoteGame::connect(server.local_addr(), ClientConfig::default()).unwrap()
    }

    fn local(server: &GameServer, id: PlayerId) -> Player {
        let handle: Arc<dyn GameHandle> = server.game().clone();
        Player::new(id, "local", handle)
    }

    #[test]
    fn test_remote_seat_follows_and_plays() {
        let server = host(&[P1]);
        let client = join(&server);
        assert_eq!(client.server_name(), "den");

        let remote = client.add_player("remote").unwrap();
        assert_eq!(remote.id(), P1);
        let seats = server.wait_for_players(Duration::from_secs(5)).unwrap();
        assert_eq!(seats.len(), 1);
        assert_eq!(seats[0].name, "remote");
        assert_eq!(client.board().snapshot(), server.game().board().snapshot());

        local(&server, P0).move_direction(Direction::Up).unwrap();
        assert!(client.wait_player_move_until(P0, Deadline::after(Duration::from_secs(5))));
        assert_eq!(client.current_player(), P1);
        assert_eq!(client.board().snapshot(), server.game().board().snapshot());

        remote.move_direction(Direction::Up).unwrap();
        assert_eq!(server.game().current_player(), P0);
        // The broadcast lands before the response
        assert_eq!(client.board().snapshot(), server.game().board().snapshot());
        assert_eq!(remote.position(), Position::new(7, 4));

        let refused = remote.move_direction(Direction::Up).unwrap_err();
        assert_eq!(refused, Rejection::Remote("not Player 1's turn (waiting on Player 0)".into()));
        assert_eq!(remote.illegal_moves(), 1);
    }

    #[test]
    fn test_seat_refused_when_none_open() {
        let server = host(&[]);
        let client = join(&server);
        let err = client.add_player("late").unwrap_err();
        assert!(err.to_string().contains("no free seat"), "{}", err);
    }

    #[test]
    fn test_cannot_act_for_another_seat() {
        let server = host(&[P1]);
        let client = join(&server);
        client.add_player("remote").unwrap();

        let start = server.game().config().start_position(P0);
        let action = PlayerAction::movement(P0, start.step(Direction::Up));
        let err = client.process_player_action(&action).unwrap_err();
        assert!(matches!(&err, Rejection::Remote(reason) if reason.contains("seat not held")));
        assert_eq!(server.game().accepted_actions(), 0);
    }

    #[test]
    fn test_session_with_a_remote_seat_runs_to_the_end() {
        let server = host(&[P1]);
        let client = join(&server);
        let remote = client.add_player("remote").unwrap();
        let driver = {
            let client = client.clone();
            thread::spawn(move || client.run_agents(vec![Box::new(Runner(remote))]))
        };

        let seats = server.wait_for_players(Duration::from_secs(5)).unwrap();
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(Runner(local(&server, P0))),
            Box::new(server.remote_agent(&seats[0])),
        ];
        let config = SessionConfig::default()
            .with_min_move_duration(Duration::ZERO)
            .with_watchdog(false);
        let report = Session::new(server.game().clone(), agents, config)
            .unwrap()
            .start()
            .unwrap()
            .join()
            .unwrap();
        driver.join().unwrap();

        assert_eq!(report.winner, Some(P1));
        assert_eq!(report.missed_ticks, 0);
        assert_eq!(client.board().winner(), Some(P1));
        assert_eq!(client.board().snapshot(), server.game().board().snapshot());
        // The winning move still hands the cursor on
        assert_eq!(server.game().current_player(), P0);
        assert_eq!(client.current_player(), P0);
    }

    #[test]
    fn test_wrong_token_is_refused() {
        let server = host(&[P1]);
        let mut stream = std::net::TcpStream::connect(server.local_addr()).unwrap();
        stream
            .write_all(&serialize(&Message::Identification("HELLO/9".into())).unwrap())
            .unwrap();

        let mut header = [0u8; 2];
        stream.read_exact(&mut header).unwrap();
        let mut payload = vec![0u8; header[0] as usize];
        stream.read_exact(&mut payload).unwrap();
        let reply = deserialize(&crate::protocol::RawFrame {
            kind: header[1],
            payload,
        })
        .unwrap();
        assert_eq!(reply, Message::failure("handshake mismatch"));

        // The host hangs up afterwards
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_host_going_away_finishes_the_mirror() {
        let server = host(&[P1]);
        let client = join(&server);
        let remote = client.add_player("remote").unwrap();
        server.shutdown();

        let deadline = Deadline::after(Duration::from_secs(5));
        while client.is_connected() && !deadline.expired() {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!client.is_connected());
        assert!(client.board().is_finished());
        assert_eq!(client.next_move_request(), None);
        assert!(matches!(
            remote.move_direction(Direction::Up),
            Err(Rejection::Transport(_))
        ));
    }
}
