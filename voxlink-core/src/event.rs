//! Typed session events and the bus that fans them out.
//!
//! Two ways to listen:
//!
//! - [`EventBus::on`] registers a synchronous handler for one
//!   [`EventKind`]. Handlers for a kind run in registration order; a handler
//!   that returns an error or panics is logged and skipped, and the rest
//!   still run.
//! - [`EventBus::subscribe`] returns a bounded `broadcast` receiver carrying
//!   every event in emission order.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use crate::audio::AudioFrame;
use crate::error::{SessionError, VoxError};
use crate::message::{Partner, StatsSnapshot};

// ── SessionEvent ─────────────────────────────────────────────────

/// Everything the session reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The transport opened.
    Connect,
    /// An open connection closed, or `disconnect()` ended the session.
    /// A `Reconnecting` event follows when the drop will be retried.
    Disconnect,
    /// The relay's `connected` greeting.
    Greeting { message: Option<String> },
    MatchFound { partner: Partner },
    MatchEnded { reason: Option<String> },
    NoMatches,
    StatsUpdate { stats: StatsSnapshot },
    PartnerDisconnected,
    AudioReceived(AudioFrame),
    Error(SessionError),
    /// The retry budget ran out. Terminal until the next `connect`.
    MaxRetryExceeded { attempts: u32 },
    /// A reconnect attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect => EventKind::Disconnect,
            Self::Greeting { .. } => EventKind::Greeting,
            Self::MatchFound { .. } => EventKind::MatchFound,
            Self::MatchEnded { .. } => EventKind::MatchEnded,
            Self::NoMatches => EventKind::NoMatches,
            Self::StatsUpdate { .. } => EventKind::StatsUpdate,
            Self::PartnerDisconnected => EventKind::PartnerDisconnected,
            Self::AudioReceived(_) => EventKind::AudioReceived,
            Self::Error(_) => EventKind::Error,
            Self::MaxRetryExceeded { .. } => EventKind::MaxRetryExceeded,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
        }
    }
}

/// Discriminant of [`SessionEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Greeting,
    MatchFound,
    MatchEnded,
    NoMatches,
    StatsUpdate,
    PartnerDisconnected,
    AudioReceived,
    Error,
    MaxRetryExceeded,
    Reconnecting,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Greeting => "greeting",
            Self::MatchFound => "matchFound",
            Self::MatchEnded => "matchEnded",
            Self::NoMatches => "noMatches",
            Self::StatsUpdate => "statsUpdate",
            Self::PartnerDisconnected => "partnerDisconnected",
            Self::AudioReceived => "audioReceived",
            Self::Error => "error",
            Self::MaxRetryExceeded => "maxRetryExceeded",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

// ── EventBus ─────────────────────────────────────────────────────

/// Identifies one registered handler for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&SessionEvent) -> Result<(), VoxError> + Send + Sync>;

struct Listener {
    id: ListenerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<EventKind, Vec<Listener>>,
}

/// Cloneable handle to the shared listener registry.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    stream: broadcast::Sender<SessionEvent>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("subscribers", &self.stream.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    /// `capacity` bounds each [`subscribe`](Self::subscribe) receiver.
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            stream,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panicking handler never runs under the lock.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&SessionEvent) -> Result<(), VoxError> + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.entry(kind).or_default().push(Listener {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove one handler. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        for listeners in registry.listeners.values_mut() {
            if let Some(pos) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every handler for `kind`, or every handler when `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut registry = self.registry();
        match kind {
            Some(kind) => {
                registry.listeners.remove(&kind);
            }
            None => registry.listeners.clear(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.values().map(Vec::len).sum()
    }

    /// A receiver for every event emitted from now on.
    ///
    /// A receiver that falls more than `capacity` events behind loses the
    /// oldest ones and observes `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.stream.subscribe()
    }

    /// Deliver `event` to handlers of its kind, then to subscribers.
    ///
    /// Never fails and never panics: handler faults are logged.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        // Snapshot so handlers may call `on`/`off` without deadlocking.
        let handlers: Vec<(ListenerId, Handler)> = self
            .registry()
            .listeners
            .get(&kind)
            .map(|ls| ls.iter().map(|l| (l.id, l.handler.clone())).collect())
            .unwrap_or_default();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = id.0, event = %kind, "event handler failed: {e}"),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    warn!(listener = id.0, event = %kind, "event handler panicked: {msg}");
                }
            }
        }

        // No subscribers is not an error.
        let _ = self.stream.send(event.clone());
    }
}
