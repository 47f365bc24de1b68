//! UDP discovery
//!
//! Clients broadcast [`CLIENT_TOKEN`]; every host listening on the discovery
//! port answers with [`SERVER_TOKEN`] followed by its name.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use quoridor_core::Result;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

pub const CLIENT_TOKEN: &[u8] = b"QUORIDOR?";
pub const SERVER_TOKEN: &[u8] = b"QUORIDOR!";

/// A host that answered a discovery query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub name: String,
    /// Address the answer came from
    pub addr: SocketAddr,
}

/// Parse a discovery answer
pub fn parse_reply(reply: &[u8]) -> Option<String> {
    let name = reply.strip_prefix(SERVER_TOKEN)?;
    Some(String::from_utf8_lossy(name).into_owned())
}

/// Answer discovery queries on `socket` until the task is dropped
pub async fn respond(socket: UdpSocket, name: String) {
    let mut reply = SERVER_TOKEN.to_vec();
    reply.extend_from_slice(name.as_bytes());
    let mut buf = [0u8; 64];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!("Discovery receive failed: {}", e);
                continue;
            }
        };
        if &buf[..len] != CLIENT_TOKEN {
            debug!(%peer, "Ignoring stray datagram");
            continue;
        }
        debug!(%peer, "Discovery query");
        if let Err(e) = socket.send_to(&reply, peer).await {
            debug!(%peer, "Discovery reply failed: {}", e);
        }
    }
}

/// Query `target` (usually a broadcast address) and collect answers until
/// `wait` has passed
pub async fn discover(target: SocketAddr, wait: Duration) -> Result<Vec<DiscoveredServer>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(CLIENT_TOKEN, target).await?;

    let deadline = Instant::now() + wait;
    let mut found: Vec<DiscoveredServer> = Vec::new();
    let mut buf = [0u8; 512];
    while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (len, addr) = received?;
        let Some(name) = parse_reply(&buf[..len]) else {
            continue;
        };
        if found.iter().all(|s| s.addr != addr) {
            info!(%addr, %name, "Found host");
            found.push(DiscoveredServer { name, addr });
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(b"QUORIDOR!den"), Some("den".to_string()));
        assert_eq!(parse_reply(b"QUORIDOR!"), Some(String::new()));
        assert_eq!(parse_reply(b"HELLO"), None);
    }

    #[tokio::test]
    async fn test_query_and_answer_on_loopback() {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let responder = tokio::spawn(respond(socket, "den".into()));

        let found = discover(addr, Duration::from_millis(200)).await.unwrap();
        responder.abort();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "den");
        assert_eq!(found[0].addr, addr);
    }
}
