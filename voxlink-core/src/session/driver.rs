//! The task that owns the connection.
//!
//! All session state lives here and is mutated only from this task's
//! `select!` loop, so commands, transport events and timers are handled
//! one at a time in arrival order.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::audio::AudioFrame;
use crate::audio::transcode;
use crate::codec::{ControlCodec, Inbound};
use crate::config::SessionConfig;
use crate::error::{ErrorKind, SessionError, VoxError};
use crate::event::{EventBus, SessionEvent};
use crate::message::{ControlMessage, Partner, Profile, StatsSnapshot};
use crate::reconnect::ReconnectPolicy;
use crate::state::{ConnectionSnapshot, ConnectionState};
use crate::timer::Timer;
use crate::transport::{Connector, Frame, Link, NORMAL_CLOSURE, TransportEvent};

type Reply<T> = oneshot::Sender<Result<T, VoxError>>;

/// Requests from [`SessionHandle`](super::SessionHandle) to the driver.
#[derive(Debug)]
pub(crate) enum Command {
    Connect { address: String, reply: Reply<()> },
    Disconnect { reply: Reply<()> },
    StopReconnecting { reply: Reply<()> },
    SendAudio { frame: AudioFrame, reply: Reply<()> },
    SendControl { message: ControlMessage, reply: Reply<()> },
    FindMatch { profile: Profile, reply: Reply<()> },
    EndMatch { reply: Reply<()> },
    Reset { reply: Reply<()> },
    Destroy { reply: Reply<()> },
}

pub(crate) struct Driver {
    connector: Arc<dyn Connector>,
    codec: ControlCodec,
    policy: ReconnectPolicy,
    config: SessionConfig,
    events: EventBus,
    commands: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<ConnectionSnapshot>,

    // ── Connection ───────────────────────────────────────────────
    state: ConnectionState,
    address: Option<Url>,
    retry_count: u32,
    last_error: Option<ErrorKind>,
    should_reconnect: bool,
    pending_open: Option<BoxFuture<'static, Result<Link, VoxError>>>,
    link: Option<Link>,
    connect_timer: Timer,
    reconnect_timer: Timer,

    // ── Matchmaking ──────────────────────────────────────────────
    partner: Option<Partner>,
    profile: Option<Profile>,
    stats: Option<StatsSnapshot>,
}

impl Driver {
    pub(crate) fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        commands: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<ConnectionSnapshot>,
    ) -> Self {
        Self {
            connector,
            codec: ControlCodec::new(config.base64_audio_threshold),
            policy: config.reconnect_policy(),
            config,
            events,
            commands,
            snapshot_tx,
            state: ConnectionState::Idle,
            address: None,
            retry_count: 0,
            last_error: None,
            should_reconnect: false,
            pending_open: None,
            link: None,
            connect_timer: Timer::new(),
            reconnect_timer: Timer::new(),
            partner: None,
            profile: None,
            stats: None,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("all session handles dropped");
                        self.teardown();
                        break;
                    };
                    let done = self.handle_command(command);
                    if done {
                        break;
                    }
                }
                result = poll_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open_result(result);
                }
                _ = self.connect_timer.fired() => {
                    self.on_connect_timeout();
                }
                _ = self.reconnect_timer.fired() => {
                    self.on_reconnect_due();
                }
                event = poll_link(&mut self.link) => {
                    self.on_transport_event(event);
                }
            }
            self.publish();
        }
        info!("session driver stopped");
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ConnectionSnapshot {
            address: self.address.clone(),
            state: self.state,
            retry_count: self.retry_count,
            last_error: self.last_error,
            partner: self.partner.clone(),
            profile: self.profile.clone(),
            stats: self.stats,
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(&event);
    }

    fn emit_error(&mut self, error: &VoxError) {
        self.last_error = Some(error.kind());
        self.emit(SessionEvent::Error(SessionError::from(error)));
    }

    fn transition(&mut self, step: fn(&mut ConnectionState) -> Result<(), VoxError>) {
        let from = self.state;
        match step(&mut self.state) {
            Ok(()) => info!(%from, to = %self.state, "connection state"),
            Err(e) => warn!(%from, "rejected transition: {e}"),
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Returns `true` once the session is destroyed.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { address, reply } => {
                let result = self.connect(&address);
                self.respond(reply, result);
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                self.respond(reply, Ok(()));
            }
            Command::StopReconnecting { reply } => {
                self.stop_reconnecting();
                self.respond(reply, Ok(()));
            }
            Command::SendAudio { frame, reply } => {
                let result = self.send_audio(&frame);
                self.respond(reply, result);
            }
            Command::SendControl { message, reply } => {
                let result = self.send_control(&message);
                self.respond(reply, result);
            }
            Command::FindMatch { profile, reply } => {
                let result = self.find_match(profile);
                self.respond(reply, result);
            }
            Command::EndMatch { reply } => {
                let result = self.send_control(&ControlMessage::EndMatch);
                if result.is_ok() {
                    self.partner = None;
                }
                self.respond(reply, result);
            }
            Command::Reset { reply } => {
                self.reset();
                self.respond(reply, Ok(()));
            }
            Command::Destroy { reply } => {
                self.destroy();
                self.respond(reply, Ok(()));
                return true;
            }
        }
        false
    }

    /// Publish before replying so callers observe the new state.
    fn respond(&self, reply: Reply<()>, result: Result<(), VoxError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn connect(&mut self, address: &str) -> Result<(), VoxError> {
        if self.state.is_active() {
            debug!(state = %self.state, "connect ignored");
            return Ok(());
        }
        let url = Url::parse(address)?;

        self.reconnect_timer.cancel();
        self.should_reconnect = true;
        // A caller-initiated connect starts a fresh retry budget.
        if self.state != ConnectionState::Reconnecting {
            self.retry_count = 0;
        }
        self.address = Some(url);
        self.start_attempt();
        Ok(())
    }

    fn start_attempt(&mut self) {
        let Some(url) = self.address.clone() else {
            warn!("no address to connect to");
            return;
        };
        self.transition(ConnectionState::begin_connect);
        info!(address = %url, attempt = self.retry_count, "opening transport");

        let connector = self.connector.clone();
        self.pending_open = Some(Box::pin(async move { connector.open(&url).await }));
        self.connect_timer.arm(self.config.connect_timeout());
    }

    fn disconnect(&mut self) {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            debug!(state = %self.state, "disconnect ignored");
            self.should_reconnect = false;
            self.reconnect_timer.cancel();
            return;
        }
        let was_open = self.teardown();
        if was_open {
            self.transition(ConnectionState::begin_close);
        }
        self.transition(ConnectionState::finish_close);
        self.partner = None;
        self.profile = None;
        self.emit(SessionEvent::Disconnect);
    }

    fn stop_reconnecting(&mut self) {
        self.should_reconnect = false;
        self.reconnect_timer.cancel();
        if self.state == ConnectionState::Reconnecting {
            self.transition(ConnectionState::fail);
        }
    }

    fn reset(&mut self) {
        let was_open = self.teardown();
        self.state.reset();
        self.address = None;
        self.retry_count = 0;
        self.last_error = None;
        self.partner = None;
        self.profile = None;
        self.stats = None;
        if was_open {
            self.emit(SessionEvent::Disconnect);
        }
        info!("session reset");
    }

    fn destroy(&mut self) {
        let was_open = self.teardown();
        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            self.transition(ConnectionState::finish_close);
        }
        self.partner = None;
        self.profile = None;
        if was_open {
            self.emit(SessionEvent::Disconnect);
        }
        self.events.remove_all_listeners(None);
        info!("session destroyed");
    }

    /// Release timers and transport handles. Returns whether the link was
    /// open.
    fn teardown(&mut self) -> bool {
        self.should_reconnect = false;
        self.connect_timer.cancel();
        self.reconnect_timer.cancel();
        self.pending_open = None;

        let was_open = self.state.is_open();
        if let Some(link) = self.link.take() {
            if was_open {
                let bye = self.codec.encode_frame(&ControlMessage::end_session());
                match bye.and_then(|frame| link.try_send(frame)) {
                    Ok(()) => debug!("sent end_session"),
                    Err(e) => debug!("end_session not sent: {e}"),
                }
            }
            link.close(NORMAL_CLOSURE);
        }
        was_open
    }

    // ── Sending ──────────────────────────────────────────────────

    fn open_link(&self) -> Result<&Link, VoxError> {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Open) => Ok(link),
            _ => Err(VoxError::NotConnected { state: self.state }),
        }
    }

    fn write(&mut self, frame: Frame) -> Result<(), VoxError> {
        let result = self.open_link()?.try_send(frame);
        if let Err(e) = &result {
            warn!("write failed: {e}");
            self.emit_error(e);
        }
        result
    }

    fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), VoxError> {
        self.open_link()?;
        debug!(len = frame.len(), format = %frame.format(), "sending audio");
        self.write(transcode::to_wire(frame, self.config.audio_wire))
    }

    fn send_control(&mut self, message: &ControlMessage) -> Result<(), VoxError> {
        self.open_link()?;
        let frame = self.codec.encode_frame(message)?;
        debug!(kind = %message.kind(), "sending control");
        self.write(frame)
    }

    fn find_match(&mut self, profile: Profile) -> Result<(), VoxError> {
        let message = ControlMessage::FindMatch {
            profile: profile.clone(),
        };
        self.send_control(&message)?;
        self.profile = Some(profile);
        Ok(())
    }

    // ── Transport ────────────────────────────────────────────────

    fn on_open_result(&mut self, result: Result<Link, VoxError>) {
        self.connect_timer.cancel();
        match result {
            Ok(link) => {
                self.transition(ConnectionState::complete_open);
                self.retry_count = 0;
                self.last_error = None;
                self.link = Some(link);
                self.emit(SessionEvent::Connect);
            }
            Err(e) => {
                warn!("transport open failed: {e}");
                self.emit_error(&e);
                self.on_abnormal_close();
            }
        }
    }

    fn on_connect_timeout(&mut self) {
        // Dropping the future abandons the attempt.
        self.pending_open = None;
        let error = VoxError::ConnectionTimeout(self.config.connect_timeout());
        warn!("{error}");
        self.emit_error(&error);
        self.on_abnormal_close();
    }

    fn on_reconnect_due(&mut self) {
        if self.state == ConnectionState::Reconnecting && self.should_reconnect {
            self.start_attempt();
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        let normal = event.is_normal_closure();
        match event {
            TransportEvent::Message(frame) => self.on_frame(frame),
            TransportEvent::Error(message) => {
                warn!("transport error: {message}");
                self.emit_error(&VoxError::Transport(message));
            }
            TransportEvent::Closed { code, reason } => {
                self.link = None;
                let was_open = self.state.is_open();
                self.partner = None;
                if normal {
                    info!(%reason, "transport closed normally");
                    self.should_reconnect = false;
                    self.transition(ConnectionState::finish_close);
                    self.emit(SessionEvent::Disconnect);
                } else {
                    warn!(?code, %reason, "transport closed abnormally");
                    if was_open {
                        self.emit(SessionEvent::Disconnect);
                    }
                    self.on_abnormal_close();
                }
            }
        }
    }

    fn on_abnormal_close(&mut self) {
        if self.should_reconnect && self.policy.allows_retry(self.retry_count) {
            self.transition(ConnectionState::begin_reconnect);
            self.retry_count += 1;
            let delay = self.policy.delay_for_attempt(self.retry_count);
            info!(attempt = self.retry_count, ?delay, "reconnect scheduled");
            self.reconnect_timer.arm(delay);
            self.emit(SessionEvent::Reconnecting {
                attempt: self.retry_count,
                delay,
            });
        } else {
            self.transition(ConnectionState::fail);
            if self.should_reconnect {
                self.should_reconnect = false;
                let error = VoxError::MaxRetryExceeded {
                    attempts: self.retry_count,
                };
                warn!("{error}");
                self.last_error = Some(error.kind());
                self.emit(SessionEvent::MaxRetryExceeded {
                    attempts: self.retry_count,
                });
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        match self.codec.decode(frame) {
            Ok(Inbound::Control(message)) => self.on_control(message),
            Ok(Inbound::Audio(frame)) => {
                debug!(len = frame.len(), format = %frame.format(), "audio received");
                self.emit(SessionEvent::AudioReceived(frame));
            }
            Ok(Inbound::Unknown { kind }) => {
                debug!(%kind, "dropping unknown control message");
            }
            Err(e) => {
                warn!("dropping malformed message: {e}");
                self.emit_error(&e);
            }
        }
    }

    fn on_control(&mut self, message: ControlMessage) {
        let kind = message.kind();
        debug!(%kind, "control received");
        match message {
            ControlMessage::Connected { message } => {
                self.emit(SessionEvent::Greeting { message });
            }
            ControlMessage::MatchFound { partner } => {
                self.partner = Some(partner.clone());
                self.emit(SessionEvent::MatchFound { partner });
            }
            ControlMessage::MatchEnded { reason } => {
                self.partner = None;
                self.emit(SessionEvent::MatchEnded { reason });
            }
            ControlMessage::NoMatches => self.emit(SessionEvent::NoMatches),
            ControlMessage::PartnerDisconnected => {
                self.partner = None;
                self.emit(SessionEvent::PartnerDisconnected);
            }
            ControlMessage::StatsUpdate { stats } => {
                self.stats = Some(stats);
                self.emit(SessionEvent::StatsUpdate { stats });
            }
            ControlMessage::Error { message } => {
                warn!(%message, "relay reported an error");
                self.emit_error(&VoxError::Server(message));
            }
            ControlMessage::FindMatch { .. }
            | ControlMessage::EndMatch
            | ControlMessage::EndSession { .. } => {
                warn!(%kind, "dropping client-only message from relay");
            }
        }
    }
}

/// Resolves with the pending open, or never when there is none.
async fn poll_open(
    pending: &mut Option<BoxFuture<'static, Result<Link, VoxError>>>,
) -> Result<Link, VoxError> {
    match pending.as_mut() {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}

/// Next event from the live link, or never when there is none.
async fn poll_link(link: &mut Option<Link>) -> TransportEvent {
    match link.as_mut() {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}
