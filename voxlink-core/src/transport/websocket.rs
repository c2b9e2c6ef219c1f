use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};
use url::Url;

use super::{Connector, Frame, Link, Outbound, TransportEvent};
use crate::error::VoxError;
use crate::timer::Timer;

/// How long the reader keeps a dropped link's socket for the close handshake.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    channel_capacity: usize,
    keepalive: Option<Duration>,
    close_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(100)
    }
}

impl WsConnector {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
            keepalive: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Send a ping every `interval` while the link is open.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }

    /// Bound the wait for the peer's close reply once the link is dropped.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, address: &Url) -> Result<Link, VoxError> {
        match address.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(VoxError::InvalidAddress(format!(
                    "unsupported scheme `{other}` in {address}"
                )));
            }
        }

        let (stream, _response) = connect_async(address.as_str()).await?;
        info!(%address, "websocket open");
        let (mut net_writer, mut net_reader) = stream.split();

        // Driver -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Outbound>(self.channel_capacity);
        // Network -> Driver
        let (network_tx, user_rx) = mpsc::channel::<TransportEvent>(self.channel_capacity);

        // ── Writer ───────────────────────────────────────────────
        let keepalive = self.keepalive;
        tokio::spawn(async move {
            let mut ping = keepalive.map(tokio::time::interval);
            loop {
                let outbound = tokio::select! {
                    outbound = network_rx.recv() => outbound,
                    _ = async {
                        match ping.as_mut() {
                            Some(interval) => { interval.tick().await; }
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        if let Err(e) = net_writer.send(Message::Ping(Vec::new().into())).await {
                            debug!("keepalive ping failed: {e}");
                            break;
                        }
                        continue;
                    }
                };

                let message = match outbound {
                    Some(Outbound::Frame(Frame::Text(text))) => Message::Text(text.into()),
                    Some(Outbound::Frame(Frame::Binary(data))) => Message::Binary(data.to_vec().into()),
                    Some(Outbound::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if let Err(e) = net_writer.send(Message::Close(Some(frame))).await {
                            debug!("close frame not sent: {e}");
                        }
                        break;
                    }
                    // Link dropped by the driver
                    None => {
                        let _ = net_writer.close().await;
                        break;
                    }
                };
                if let Err(e) = net_writer.send(message).await {
                    warn!("websocket write error: {e}");
                    break;
                }
            }
        });

        // ── Reader ───────────────────────────────────────────────
        let close_timeout = self.close_timeout;
        tokio::spawn(async move {
            let mut linger = Timer::new();
            let closed = loop {
                let next = tokio::select! {
                    next = net_reader.next() => next,
                    _ = network_tx.closed(), if !linger.is_armed() => {
                        // Keep reading so the close handshake can finish.
                        linger.arm(close_timeout);
                        continue;
                    }
                    _ = linger.fired() => {
                        debug!("peer never finished closing; dropping socket");
                        return;
                    }
                };
                let event = match next {
                    Some(Ok(Message::Text(text))) => {
                        TransportEvent::Message(Frame::Text(text.to_string()))
                    }
                    Some(Ok(Message::Binary(data))) => {
                        TransportEvent::Message(Frame::Binary(Bytes::from(data)))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.to_string(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("websocket read error: {e}");
                        let _ = network_tx.send(TransportEvent::Error(e.to_string())).await;
                        break TransportEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".into(),
                        };
                    }
                };
                if network_tx.send(event).await.is_err() {
                    // Driver dropped the link.
                    return;
                }
            };
            debug!(?closed, "websocket reader finished");
            let _ = network_tx.send(closed).await;
        });

        Ok(Link::new(user_tx, user_rx))
    }
}
