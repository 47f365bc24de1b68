//! Wire protocol between a hosting game and remote players
//!
//! Every frame is `[len: u8][type: u8][payload; len]`, so a payload is at most
//! 255 bytes. Payloads are packed by hand:
//!
//! | type | payload |
//! |---|---|
//! | Identification | protocol token, UTF-8 |
//! | ServerResponse | `[success]` then free-form bytes |
//! | AddRemotePlayer | display name, UTF-8 |
//! | RequestPlayerNextMove | `[player_id]` |
//! | PlayerAction | `[player_id, action_type, x, y, orientation]` |
//! | BoardStateUpdate | see [`BoardUpdate`] |
//!
//! Coordinates travel in the canonical frame.

use quoridor_core::{
    ActionKind, ActionType, BoardSnapshot, Direction, Orientation, PlayerAction, PlayerId,
    PlayerState, Position, QuoridorError, Result, WallState,
};

/// Largest payload a frame can carry
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Sent by clients in `Identification`; anything else is refused
pub const PROTOCOL_TOKEN: &str = "QUORIDOR/1";

const NO_WINNER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Identification = 1,
    ServerResponse = 2,
    AddRemotePlayer = 3,
    RequestPlayerNextMove = 4,
    PlayerAction = 5,
    BoardStateUpdate = 6,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Identification),
            2 => Some(MessageType::ServerResponse),
            3 => Some(MessageType::AddRemotePlayer),
            4 => Some(MessageType::RequestPlayerNextMove),
            5 => Some(MessageType::PlayerAction),
            6 => Some(MessageType::BoardStateUpdate),
            _ => None,
        }
    }
}

/// Full board plus whose turn it is, as pushed by the host
///
/// Layout: `[size, player_count, turn, finished, winner]`, then
/// `[facing, x, y, walls_remaining]` per player, then `[wall_count]` and
/// `[x, y, orientation]` per wall. `winner` is `0xFF` while there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardUpdate {
    pub turn: PlayerId,
    pub snapshot: BoardSnapshot,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Identification(String),
    ServerResponse { success: bool, payload: Vec<u8> },
    AddRemotePlayer { name: String },
    RequestPlayerNextMove { player_id: PlayerId },
    PlayerAction(PlayerAction),
    BoardStateUpdate(BoardUpdate),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Identification(_) => MessageType::Identification,
            Message::ServerResponse { .. } => MessageType::ServerResponse,
            Message::AddRemotePlayer { .. } => MessageType::AddRemotePlayer,
            Message::RequestPlayerNextMove { .. } => MessageType::RequestPlayerNextMove,
            Message::PlayerAction(_) => MessageType::PlayerAction,
            Message::BoardStateUpdate(_) => MessageType::BoardStateUpdate,
        }
    }

    /// Successful response
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Message::ServerResponse {
            success: true,
            payload: payload.into(),
        }
    }

    /// Failed response carrying a reason, cut to fit a frame
    pub fn failure(reason: &str) -> Self {
        let mut end = reason.len().min(MAX_PAYLOAD - 1);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        Message::ServerResponse {
            success: false,
            payload: reason.as_bytes()[..end].to_vec(),
        }
    }
}

/// Raw frame as read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

fn coord(value: i32) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| QuoridorError::ProtocolError(format!("coordinate {value} out of range")))
}

fn truncated(what: &str) -> QuoridorError {
    QuoridorError::ProtocolError(format!("truncated {what}"))
}

/// Pack an action into its 5-byte record
pub fn encode_action(action: &PlayerAction) -> Result<[u8; 5]> {
    let (x, y, orientation) = match action.kind {
        ActionKind::Move { target } => (target.x, target.y, 0),
        ActionKind::Wall { wall } => (wall.position.x, wall.position.y, wall.orientation as u8),
        ActionKind::Invalid => (0, 0, 0),
    };
    Ok([
        action.player_id.0,
        action.action_type() as u8,
        coord(x)?,
        coord(y)?,
        orientation,
    ])
}

pub fn decode_action(bytes: &[u8]) -> Result<PlayerAction> {
    let &[player, kind, x, y, orientation] = bytes else {
        return Err(QuoridorError::ProtocolError(format!(
            "action record is {} bytes",
            bytes.len()
        )));
    };
    let player_id = PlayerId::new(player);
    let position = Position::new(x as i32, y as i32);
    let action = match ActionType::from_u8(kind) {
        Some(ActionType::Move) => PlayerAction::movement(player_id, position),
        Some(ActionType::Wall) => {
            let orientation = match orientation {
                0 => Orientation::Horizontal,
                1 => Orientation::Vertical,
                other => {
                    return Err(QuoridorError::ProtocolError(format!(
                        "bad orientation {other}"
                    )));
                }
            };
            PlayerAction::wall(player_id, WallState::new(position, orientation))
        }
        Some(ActionType::Invalid) => PlayerAction::invalid(player_id),
        None => {
            return Err(QuoridorError::ProtocolError(format!(
                "bad action type {kind}"
            )));
        }
    };
    Ok(action)
}

fn encode_board(update: &BoardUpdate) -> Result<Vec<u8>> {
    let s = &update.snapshot;
    let mut out = Vec::with_capacity(6 + 4 * s.players.len() + 3 * s.walls.len());
    out.push(s.size as u8);
    out.push(s.players.len() as u8);
    out.push(update.turn.0);
    out.push(s.finished as u8);
    out.push(s.winner.map_or(NO_WINNER, |w| w.0));
    for p in &s.players {
        out.extend_from_slice(&[
            p.initial_facing as u8,
            coord(p.position.x)?,
            coord(p.position.y)?,
            p.walls_remaining,
        ]);
    }
    let wall_count = u8::try_from(s.walls.len())
        .map_err(|_| QuoridorError::ProtocolError("too many walls".into()))?;
    out.push(wall_count);
    for w in &s.walls {
        out.extend_from_slice(&[
            coord(w.position.x)?,
            coord(w.position.y)?,
            w.orientation as u8,
        ]);
    }
    Ok(out)
}

fn decode_board(bytes: &[u8]) -> Result<BoardUpdate> {
    let mut it = bytes.iter().copied();
    let mut next = |what: &str| it.next().ok_or_else(|| truncated(what));

    let size = next("board header")? as usize;
    let player_count = next("board header")? as usize;
    let turn = PlayerId::new(next("board header")?);
    let finished = next("board header")? != 0;
    let winner = match next("board header")? {
        NO_WINNER => None,
        id => Some(PlayerId::new(id)),
    };

    let mut players = Vec::with_capacity(player_count);
    for _ in 0..player_count {
        let facing = next("player")?;
        if facing > 3 {
            return Err(QuoridorError::ProtocolError(format!("bad facing {facing}")));
        }
        let x = next("player")?;
        let y = next("player")?;
        players.push(PlayerState {
            initial_facing: Direction::from_index(facing),
            position: Position::new(x as i32, y as i32),
            walls_remaining: next("player")?,
        });
    }

    let wall_count = next("wall count")?;
    let mut walls = Vec::with_capacity(wall_count as usize);
    for _ in 0..wall_count {
        let x = next("wall")?;
        let y = next("wall")?;
        let orientation = if next("wall")? == 0 {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        };
        walls.push(WallState::new(Position::new(x as i32, y as i32), orientation));
    }

    Ok(BoardUpdate {
        turn,
        snapshot: BoardSnapshot {
            size,
            players,
            walls,
            last_action: None,
            finished,
            winner,
        },
    })
}

fn text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| QuoridorError::ProtocolError(e.to_string()))
}

/// Encode a message into a complete frame
pub fn serialize(msg: &Message) -> Result<Vec<u8>> {
    let payload = match msg {
        Message::Identification(token) => token.as_bytes().to_vec(),
        Message::ServerResponse { success, payload } => {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.push(*success as u8);
            out.extend_from_slice(payload);
            out
        }
        Message::AddRemotePlayer { name } => name.as_bytes().to_vec(),
        Message::RequestPlayerNextMove { player_id } => vec![player_id.0],
        Message::PlayerAction(action) => encode_action(action)?.to_vec(),
        Message::BoardStateUpdate(update) => encode_board(update)?,
    };
    if payload.len() > MAX_PAYLOAD {
        return Err(QuoridorError::ProtocolError(format!(
            "{:?} payload is {} bytes",
            msg.message_type(),
            payload.len()
        )));
    }
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(payload.len() as u8);
    frame.push(msg.message_type() as u8);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame's payload according to its type byte
pub fn deserialize(frame: &RawFrame) -> Result<Message> {
    let payload = frame.payload.as_slice();
    let kind = MessageType::from_u8(frame.kind).ok_or_else(|| {
        QuoridorError::ProtocolError(format!("unknown message type {}", frame.kind))
    })?;
    let msg = match kind {
        MessageType::Identification => Message::Identification(text(payload)?),
        MessageType::ServerResponse => {
            let (&success, rest) = payload
                .split_first()
                .ok_or_else(|| truncated("response"))?;
            Message::ServerResponse {
                success: success != 0,
                payload: rest.to_vec(),
            }
        }
        MessageType::AddRemotePlayer => Message::AddRemotePlayer {
            name: text(payload)?,
        },
        MessageType::RequestPlayerNextMove => Message::RequestPlayerNextMove {
            player_id: PlayerId::new(*payload.first().ok_or_else(|| truncated("move request"))?),
        },
        MessageType::PlayerAction => Message::PlayerAction(decode_action(payload)?),
        MessageType::BoardStateUpdate => Message::BoardStateUpdate(decode_board(payload)?),
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoridor_core::GameConfig;

    fn frame_of(bytes: &[u8]) -> RawFrame {
        assert_eq!(bytes[0] as usize, bytes.len() - 2);
        RawFrame {
            kind: bytes[1],
            payload: bytes[2..].to_vec(),
        }
    }

    #[test]
    fn test_action_record_layout() {
        let action = PlayerAction::wall(
            PlayerId::new(2),
            WallState::new(Position::new(3, 7), Orientation::Vertical),
        );
        assert_eq!(encode_action(&action).unwrap(), [2, 1, 3, 7, 1]);

        let bytes = serialize(&Message::PlayerAction(action)).unwrap();
        assert_eq!(bytes, vec![5, 5, 2, 1, 3, 7, 1]);
        assert_eq!(
            deserialize(&frame_of(&bytes)).unwrap(),
            Message::PlayerAction(action)
        );
    }

    #[test]
    fn test_action_round_trip_keeps_every_field() {
        let actions = [
            PlayerAction::movement(PlayerId::new(0), Position::new(7, 4)),
            PlayerAction::wall(
                PlayerId::new(3),
                WallState::new(Position::new(0, 0), Orientation::Horizontal),
            ),
            PlayerAction::invalid(PlayerId::new(1)),
        ];
        for action in actions {
            let decoded = decode_action(&encode_action(&action).unwrap()).unwrap();
            assert_eq!(decoded.player_id, action.player_id);
            assert_eq!(decoded.action_type(), action.action_type());
            assert_eq!(decoded, action);
        }
    }

    #[test]
    fn test_negative_coordinates_do_not_encode() {
        let action = PlayerAction::movement(PlayerId::new(0), Position::new(-1, 4));
        assert!(matches!(
            encode_action(&action),
            Err(QuoridorError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(decode_action(&[0, 1, 2]).is_err());
        assert!(decode_action(&[0, 9, 0, 0, 0]).is_err());
        assert!(decode_action(&[0, 1, 0, 0, 7]).is_err());
        let unknown = RawFrame {
            kind: 42,
            payload: Vec::new(),
        };
        assert!(deserialize(&unknown).is_err());
        let empty_response = RawFrame {
            kind: MessageType::ServerResponse as u8,
            payload: Vec::new(),
        };
        assert!(deserialize(&empty_response).is_err());
    }

    #[test]
    fn test_board_update_layout() {
        let mut snapshot = BoardSnapshot::initial(&GameConfig::default());
        snapshot.apply_unchecked(&PlayerAction::wall(
            PlayerId::new(0),
            WallState::new(Position::new(2, 3), Orientation::Vertical),
        ));
        snapshot.last_action = None;
        let update = BoardUpdate {
            turn: PlayerId::new(1),
            snapshot,
        };

        let bytes = serialize(&Message::BoardStateUpdate(update.clone())).unwrap();
        assert_eq!(
            &bytes[2..],
            &[9, 2, 1, 0, 0xFF, 0, 8, 4, 9, 2, 0, 4, 10, 1, 2, 3, 1]
        );
        assert_eq!(
            deserialize(&frame_of(&bytes)).unwrap(),
            Message::BoardStateUpdate(update)
        );
    }

    #[test]
    fn test_truncated_board_update() {
        let frame = RawFrame {
            kind: MessageType::BoardStateUpdate as u8,
            payload: vec![9, 2, 0, 0, 0xFF, 0, 8],
        };
        assert!(matches!(
            deserialize(&frame),
            Err(QuoridorError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_failure_reason_is_cut_to_fit() {
        let reason = "x".repeat(400);
        let bytes = serialize(&Message::failure(&reason)).unwrap();
        assert_eq!(bytes.len(), 2 + MAX_PAYLOAD);

        let msg = deserialize(&frame_of(&serialize(&Message::failure("intersecting wall")).unwrap()))
            .unwrap();
        assert_eq!(
            msg,
            Message::ServerResponse {
                success: false,
                payload: b"intersecting wall".to_vec()
            }
        );
    }

    #[test]
    fn test_oversized_payload_is_refused() {
        let msg = Message::AddRemotePlayer {
            name: "n".repeat(300),
        };
        assert!(serialize(&msg).is_err());
    }
}
