//! Networked play for Quoridor
//!
//! This crate provides:
//! - Wire protocol: length-prefixed frames and the packed payload formats
//! - Transport abstractions (AsyncReader/AsyncWriter traits) and the reader
//!   task that pairs responses with requests
//! - UDP discovery of hosts on the local network
//! - `GameServer`, hosting a game for remote seats
//! - `RemoteGame`, a blocking client that mirrors the host's board

pub mod client;
pub mod discovery;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ClientConfig, RemoteGame};
pub use discovery::{DiscoveredServer, discover};
pub use protocol::{BoardUpdate, Message, MessageType, deserialize, serialize};
pub use server::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_TCP_PORT, GameServer, RemoteAgent, RemoteSeat, ServerConfig,
};
pub use transport::{AsyncReader, AsyncWriter, reader_task};
