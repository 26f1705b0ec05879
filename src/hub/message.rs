use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{ConnectionId, Destination};

/// One inbound chat line on its way through the hub.
///
/// Serializes as `{"user": .., "data": .., "timestamp": ..}`; the connection
/// and destination only drive routing. The timestamp stays empty until the hub
/// delivers it.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip)]
    pub connection: ConnectionId,
    #[serde(skip)]
    pub destination: Destination,
    #[serde(rename = "user")]
    pub sender: String,
    pub data: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

impl Message {
    pub fn new(
        connection: ConnectionId,
        destination: Destination,
        sender: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            destination,
            sender: sender.into(),
            data: data.into(),
            timestamp: None,
        }
    }
}

/// What the writer loop is asked to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Utf8Bytes),
    Close { code: u16, reason: &'static str },
}

/// Producer end of a connection's bounded outbound queue.
///
/// The hub holds the only one; dropping it closes the queue, which is what
/// tells the writer loop to send a close frame and stop.
#[derive(Debug)]
pub struct Outbox(mpsc::Sender<Outbound>);

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self(tx), rx)
    }

    /// Never waits: a full queue is reported back instead.
    pub fn offer(&self, payload: Utf8Bytes) -> Result<(), TrySendError<Outbound>> {
        self.0.try_send(Outbound::Text(payload))
    }

    /// Queues a close notification, then closes the queue.
    pub fn reject(self, code: u16, reason: &'static str) {
        let _ = self.0.try_send(Outbound::Close { code, reason });
    }
}
