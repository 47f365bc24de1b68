//! Transport abstractions
//!
//! Provides AsyncReader/AsyncWriter traits over framed byte streams and the
//! client-side reader task that pairs responses with requests.

use std::collections::VecDeque;

use async_trait::async_trait;
use quoridor_core::{QuoridorError, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::protocol::{Message, MessageType, RawFrame, deserialize};

/// Trait for async reading from a transport
#[async_trait]
pub trait AsyncReader: Send {
    /// Read one complete frame. Must be cancel safe.
    async fn read_frame(&mut self) -> Result<RawFrame>;
}

/// Trait for async writing to a transport
#[async_trait]
pub trait AsyncWriter: Send {
    /// Write one complete, already encoded frame
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

/// Where the reader task delivers the response to one request
pub type PendingReply = oneshot::Sender<Result<Message>>;

/// Background reader task for the client side of a connection
///
/// This task:
/// - Receives frames from the host via the transport
/// - Hands `ServerResponse` frames to pending requests in FIFO order
/// - Passes every other message to `on_notification`, inline and in arrival
///   order, so a notification sent before a response is always handled first
///
/// Requests must be registered on `request_rx` before they are written. The
/// select is biased towards registrations so a response can never overtake
/// the registration of its own request.
pub async fn reader_task<R, F>(
    mut reader: R,
    mut request_rx: mpsc::UnboundedReceiver<PendingReply>,
    mut on_notification: F,
) where
    R: AsyncReader,
    F: FnMut(Message) + Send,
{
    let mut pending: VecDeque<PendingReply> = VecDeque::new();

    loop {
        tokio::select! {
            biased;

            req = request_rx.recv() => {
                match req {
                    Some(response_tx) => pending.push_back(response_tx),
                    None => {
                        debug!("Request channel closed, reader task exiting");
                        break;
                    }
                }
            }

            frame = reader.read_frame() => {
                match frame {
                    Ok(frame) => match deserialize(&frame) {
                        Ok(msg @ Message::ServerResponse { .. }) => {
                            if let Some(response_tx) = pending.pop_front() {
                                let _ = response_tx.send(Ok(msg));
                            } else {
                                warn!("Received response but no pending request: {:?}", msg);
                            }
                        }
                        Ok(msg) => {
                            debug!("[Host→Client] {:?}", msg.message_type());
                            on_notification(msg);
                        }
                        Err(e) => {
                            error!("Failed to decode frame: {}", e);
                            // Only a broken response consumes a pending request
                            if frame.kind == MessageType::ServerResponse as u8 {
                                if let Some(response_tx) = pending.pop_front() {
                                    let _ = response_tx.send(Err(e));
                                }
                            }
                        }
                    },
                    Err(e) => {
                        debug!("Reader task stopping: {}", e);
                        for response_tx in pending.drain(..) {
                            let _ = response_tx
                                .send(Err(QuoridorError::IpcError("Connection lost".into())));
                        }
                        break;
                    }
                }
            }
        }
    }
}
