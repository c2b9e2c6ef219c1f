//! Transport abstraction between the session driver and the socket.
//!
//! A [`Connector`] opens one [`Link`] per attempt. The link is a pair of
//! channels to tasks that own the socket, so the driver never blocks on
//! I/O and never touches the socket directly.

pub mod websocket;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use url::Url;

use crate::error::VoxError;

pub use websocket::WsConnector;

/// Close code for an intentional, orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// One message on the multiplexed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// What the socket tasks report to the driver, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(Frame),
    /// A socket error. A `Closed` event always follows.
    Error(String),
    /// The connection ended. `code` is `None` when no close frame arrived.
    Closed { code: Option<u16>, reason: String },
}

impl TransportEvent {
    /// Whether this closure was orderly.
    pub fn is_normal_closure(&self) -> bool {
        matches!(self, Self::Closed { code: Some(NORMAL_CLOSURE), .. })
    }
}

/// What the driver asks the socket tasks to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    /// Send a close frame with this code and stop writing.
    Close(u16),
}

/// Handle to one open transport.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl Link {
    pub fn new(outbound: mpsc::Sender<Outbound>, inbound: mpsc::Receiver<TransportEvent>) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a frame for writing without waiting.
    ///
    /// Fails when the write queue is full or the writer has gone away.
    pub fn try_send(&self, frame: Frame) -> Result<(), VoxError> {
        self.outbound
            .try_send(Outbound::Frame(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => VoxError::Transport("write queue full".into()),
                TrySendError::Closed(_) => VoxError::ChannelClosed,
            })
    }

    /// Ask the writer to close with `code`. Best effort.
    pub fn close(&self, code: u16) {
        let _ = self.outbound.try_send(Outbound::Close(code));
    }

    /// Next event from the socket.
    ///
    /// A vanished reader is reported as an abnormal closure.
    pub async fn recv(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed {
                code: None,
                reason: "transport task ended".into(),
            })
    }
}

/// Opens transports. The seam the session driver depends on.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `address`. Resolves once the connection is
    /// established and ready for traffic.
    async fn open(&self, address: &Url) -> Result<Link, VoxError>;
}
