//! The session: one logical relay connection and its matchmaking state.
//!
//! [`SessionHandle::spawn`] starts a driver task that owns the connection.
//! Handles are cheap to clone; every method is a request to that task and
//! resolves once the request has been applied.
//!
//! ```text
//!            ┌──────────── connect ────────────┐
//!            ▼                                 │
//! Idle ─► Connecting ─► Open ─► Closing ─► Closed
//!            ▲   │        │
//!            │   └────────┴─► Reconnecting ─► Failed
//!            └── timer ───────────┘
//! ```

mod driver;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::audio::AudioFrame;
use crate::config::SessionConfig;
use crate::error::VoxError;
use crate::event::EventBus;
use crate::message::{ControlMessage, Profile};
use crate::state::{ConnectionSnapshot, ConnectionState};
use crate::transport::Connector;

use driver::{Command, Driver};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    events: EventBus,
}

impl SessionHandle {
    /// Start a session on the current tokio runtime.
    pub fn spawn<C: Connector>(config: SessionConfig, connector: C) -> Self {
        let events = EventBus::new(config.event_channel_capacity);
        Self::spawn_with_events(config, Arc::new(connector), events)
    }

    /// Start a session that publishes into an existing bus.
    pub fn spawn_with_events(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(ConnectionSnapshot::default());
        let driver = Driver::new(config, connector, events.clone(), commands_rx, snapshot_tx);
        tokio::spawn(driver.run());
        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), VoxError>>) -> Command,
    ) -> Result<(), VoxError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| VoxError::Destroyed)?;
        reply_rx.await.map_err(|_| VoxError::Destroyed)?
    }

    // ── Connection ───────────────────────────────────────────────

    /// Connect to `address`. A no-op while connecting or open.
    pub async fn connect(&self, address: &str) -> Result<(), VoxError> {
        let address = address.to_string();
        self.request(|reply| Command::Connect { address, reply }).await
    }

    /// Close the connection and stop reconnecting. Idempotent.
    pub async fn disconnect(&self) -> Result<(), VoxError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Cancel any scheduled reconnect and disable further ones.
    pub async fn stop_reconnecting(&self) -> Result<(), VoxError> {
        self.request(|reply| Command::StopReconnecting { reply }).await
    }

    /// Return the session to `Idle`, keeping event listeners.
    pub async fn reset(&self) -> Result<(), VoxError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Tear the session down for good. Later calls fail with `Destroyed`.
    pub async fn destroy(&self) -> Result<(), VoxError> {
        self.request(|reply| Command::Destroy { reply }).await
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Send one clip. Fails with `NotConnected` unless open.
    pub async fn send_audio(&self, frame: AudioFrame) -> Result<(), VoxError> {
        self.request(|reply| Command::SendAudio { frame, reply }).await
    }

    pub async fn send_control(&self, message: ControlMessage) -> Result<(), VoxError> {
        self.request(|reply| Command::SendControl { message, reply })
            .await
    }

    /// Ask the relay for a partner, remembering `profile`.
    pub async fn find_match(&self, profile: Profile) -> Result<(), VoxError> {
        self.request(|reply| Command::FindMatch { profile, reply }).await
    }

    /// Leave the current match.
    pub async fn end_match(&self) -> Result<(), VoxError> {
        self.request(|reply| Command::EndMatch { reply }).await
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified after every driver step.
    pub fn watch_snapshot(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
