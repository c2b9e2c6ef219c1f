//! Session lifecycle tests driven through a scripted in-memory connector
//! on a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use url::Url;
use voxlink_core::{
    AudioFormat, AudioFrame, AudioWire, ConnectionSnapshot, ConnectionState, Connector, ErrorKind,
    EventBus, EventKind, Frame, Gender, Link, LookingFor, Outbound, Profile, SessionConfig,
    SessionEvent, SessionHandle, TransportEvent, VoxError,
};

// ── Mock transport ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Step {
    Open,
    Fail,
    Hang,
}

/// The relay's side of one opened link.
struct Remote {
    outbound: mpsc::Receiver<Outbound>,
    inbound: mpsc::Sender<TransportEvent>,
}

impl Remote {
    async fn push(&self, event: TransportEvent) {
        self.inbound.send(event).await.unwrap();
    }

    async fn push_text(&self, text: &str) {
        self.push(TransportEvent::Message(Frame::Text(text.into()))).await;
    }

    async fn next_outbound(&mut self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(60), self.outbound.recv())
            .await
            .expect("timed out waiting for outbound")
            .expect("outbound closed")
    }
}

#[derive(Clone)]
struct MockConnector {
    steps: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
    opens: Arc<AtomicUsize>,
    remotes: mpsc::UnboundedSender<Remote>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _address: &Url) -> Result<Link, VoxError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match step {
            Step::Fail => Err(VoxError::Transport("connection refused".into())),
            Step::Hang => std::future::pending().await,
            Step::Open => {
                let (out_tx, out_rx) = mpsc::channel(16);
                let (in_tx, in_rx) = mpsc::channel(16);
                let _ = self.remotes.send(Remote {
                    outbound: out_rx,
                    inbound: in_tx,
                });
                Ok(Link::new(out_tx, in_rx))
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

const RELAY: &str = "wss://relay.example/ws";

struct Fixture {
    session: SessionHandle,
    events: broadcast::Receiver<SessionEvent>,
    remotes: mpsc::UnboundedReceiver<Remote>,
    opens: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(steps: &[Step], fallback: Step) -> Self {
        Self::with_config(steps, fallback, SessionConfig::default())
    }

    fn with_config(steps: &[Step], fallback: Step, config: SessionConfig) -> Self {
        let (remotes_tx, remotes) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicUsize::new(0));
        let connector = MockConnector {
            steps: Arc::new(Mutex::new(steps.iter().copied().collect())),
            fallback,
            opens: opens.clone(),
            remotes: remotes_tx,
        };
        let session = SessionHandle::spawn(config, connector);
        let events = session.events().subscribe();
        Self {
            session,
            events,
            remotes,
            opens,
        }
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(600), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    async fn next_remote(&mut self) -> Remote {
        self.remotes.recv().await.expect("connector dropped")
    }

    /// Let any pending timers run out, then check nothing was emitted.
    async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(
            matches!(
                self.events.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ),
            "unexpected event"
        );
    }

    async fn connect_open(&mut self) -> Remote {
        tokio_test::assert_ok!(self.session.connect(RELAY).await);
        assert_eq!(self.next_event().await, SessionEvent::Connect);
        self.next_remote().await
    }
}

fn error_kind(event: &SessionEvent) -> Option<ErrorKind> {
    match event {
        SessionEvent::Error(e) => Some(e.kind),
        _ => None,
    }
}

fn profile() -> Profile {
    Profile {
        display_name: "Sam".into(),
        age: 27,
        gender: Gender::Other,
        looking_for: LookingFor::Any,
        location: Some("Lisbon".into()),
    }
}

// ── Connect ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn connect_twice_while_connecting_opens_once() {
    let fx = Fixture::new(&[], Step::Hang);
    fx.session.connect(RELAY).await.unwrap();
    fx.session.connect(RELAY).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(fx.opens(), 1);
    assert_eq!(fx.session.state(), ConnectionState::Connecting);
    fx.session.stop_reconnecting().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect_while_open_is_a_no_op() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    let _remote = fx.connect_open().await;

    fx.session.connect(RELAY).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(fx.opens(), 1);
    assert_eq!(fx.session.state(), ConnectionState::Open);
    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.address.unwrap().as_str(), RELAY);
    assert_eq!(snapshot.retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_address_is_rejected_without_io() {
    let fx = Fixture::new(&[], Step::Open);
    let err = fx.session.connect("not a url").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);
    assert_eq!(fx.opens(), 0);
    assert_eq!(fx.session.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out_after_ten_seconds() {
    let mut fx = Fixture::new(&[], Step::Hang);
    let start = Instant::now();
    fx.session.connect(RELAY).await.unwrap();

    let event = fx.next_event().await;
    assert_eq!(error_kind(&event), Some(ErrorKind::ConnectionTimeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(10_000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(10_100), "{elapsed:?}");

    assert_eq!(
        fx.next_event().await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );
    assert_eq!(fx.session.snapshot().last_error, Some(ErrorKind::ConnectionTimeout));

    fx.session.stop_reconnecting().await.unwrap();
    assert_eq!(fx.session.state(), ConnectionState::Failed);
    fx.assert_quiet().await;
}

// ── Reconnect ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn backoff_doubles_until_retry_budget_is_spent() {
    let config = SessionConfig {
        max_retries: 4,
        ..Default::default()
    };
    let mut fx = Fixture::with_config(&[], Step::Fail, config);
    let start = Instant::now();
    fx.session.connect(RELAY).await.unwrap();

    let mut error_times = Vec::new();
    let mut delays = Vec::new();
    let attempts = loop {
        match fx.next_event().await {
            SessionEvent::Error(e) => {
                assert_eq!(e.kind, ErrorKind::TransportError);
                error_times.push(start.elapsed().as_millis() as u64);
            }
            SessionEvent::Reconnecting { delay, .. } => delays.push(delay.as_millis() as u64),
            SessionEvent::MaxRetryExceeded { attempts } => break attempts,
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
    assert_eq!(error_times, vec![0, 1_000, 3_000, 7_000, 15_000]);
    assert_eq!(attempts, 4);
    assert_eq!(fx.opens(), 5);

    // Terminal: no more timers, no second maxRetryExceeded.
    fx.assert_quiet().await;
    assert_eq!(fx.opens(), 5);
    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Failed);
    assert_eq!(snapshot.retry_count, 4);
    assert_eq!(snapshot.last_error, Some(ErrorKind::MaxRetryExceeded));
}

#[tokio::test(start_paused = true)]
async fn connect_after_failure_starts_a_fresh_budget() {
    let config = SessionConfig {
        max_retries: 1,
        ..Default::default()
    };
    let mut fx = Fixture::with_config(&[Step::Fail, Step::Fail, Step::Open], Step::Fail, config);
    fx.session.connect(RELAY).await.unwrap();
    loop {
        if let SessionEvent::MaxRetryExceeded { attempts } = fx.next_event().await {
            assert_eq!(attempts, 1);
            break;
        }
    }

    fx.session.connect(RELAY).await.unwrap();
    assert_eq!(fx.next_event().await, SessionEvent::Connect);
    assert_eq!(fx.session.snapshot().retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn connect_while_reconnecting_keeps_the_retry_count() {
    let mut fx = Fixture::new(&[], Step::Fail);
    fx.session.connect(RELAY).await.unwrap();
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert_eq!(
        fx.next_event().await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );

    // Attempts right away instead of waiting out the delay.
    let start = Instant::now();
    fx.session.connect(RELAY).await.unwrap();
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(
        fx.next_event().await,
        SessionEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(2)
        }
    );
    assert_eq!(fx.opens(), 2);
    assert_eq!(fx.session.snapshot().retry_count, 2);

    fx.session.stop_reconnecting().await.unwrap();
    fx.assert_quiet().await;
    assert_eq!(fx.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn abnormal_drop_reconnects_and_resets_retry_count() {
    let mut fx = Fixture::new(&[Step::Open, Step::Fail, Step::Open], Step::Fail);
    let remote = fx.connect_open().await;
    remote
        .push_text(r#"{"type":"match_found","partner":{"displayName":"Ana"}}"#)
        .await;
    assert_eq!(fx.next_event().await.kind(), EventKind::MatchFound);

    remote
        .push(TransportEvent::Closed {
            code: None,
            reason: "reset by peer".into(),
        })
        .await;

    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    assert_eq!(
        fx.next_event().await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );
    assert!(fx.session.snapshot().partner.is_none());

    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert_eq!(
        fx.next_event().await,
        SessionEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(2)
        }
    );
    assert_eq!(fx.next_event().await, SessionEvent::Connect);

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Open);
    assert_eq!(snapshot.retry_count, 0);
    assert_eq!(fx.opens(), 3);
}

#[tokio::test(start_paused = true)]
async fn transport_error_waits_for_close_before_reconnecting() {
    let mut fx = Fixture::new(&[Step::Open], Step::Hang);
    let remote = fx.connect_open().await;

    remote.push(TransportEvent::Error("broken pipe".into())).await;
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert_eq!(fx.session.state(), ConnectionState::Open);

    remote
        .push(TransportEvent::Closed {
            code: Some(1006),
            reason: String::new(),
        })
        .await;
    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    assert_eq!(fx.next_event().await.kind(), EventKind::Reconnecting);
    fx.session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn normal_close_does_not_reconnect() {
    let mut fx = Fixture::new(&[Step::Open], Step::Open);
    let remote = fx.connect_open().await;
    remote
        .push(TransportEvent::Closed {
            code: Some(1000),
            reason: "bye".into(),
        })
        .await;

    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    fx.assert_quiet().await;
    assert_eq!(fx.session.state(), ConnectionState::Closed);
    assert_eq!(fx.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_reconnecting_cancels_the_scheduled_attempt() {
    let mut fx = Fixture::new(&[], Step::Fail);
    fx.session.connect(RELAY).await.unwrap();
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert_eq!(fx.next_event().await.kind(), EventKind::Reconnecting);

    fx.session.stop_reconnecting().await.unwrap();
    assert_eq!(fx.session.state(), ConnectionState::Failed);
    fx.assert_quiet().await;
    assert_eq!(fx.opens(), 1);
}

// ── Disconnect / reset / destroy ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent() {
    let mut fx = Fixture::new(&[Step::Open], Step::Open);
    let mut remote = fx.connect_open().await;
    fx.session.find_match(profile()).await.unwrap();
    let _find_match = remote.next_outbound().await;

    fx.session.disconnect().await.unwrap();
    fx.session.disconnect().await.unwrap();

    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    fx.assert_quiet().await;

    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text(r#"{"type":"end_session"}"#.into()))
    );
    assert_eq!(remote.next_outbound().await, Outbound::Close(1000));

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Closed);
    assert!(snapshot.profile.is_none());
    assert!(snapshot.partner.is_none());
    assert_eq!(fx.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_reconnecting_cancels_timer() {
    let mut fx = Fixture::new(&[], Step::Fail);
    fx.session.connect(RELAY).await.unwrap();
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::TransportError));
    assert_eq!(fx.next_event().await.kind(), EventKind::Reconnecting);

    fx.session.disconnect().await.unwrap();
    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    fx.assert_quiet().await;
    assert_eq!(fx.opens(), 1);
    assert_eq!(fx.session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle_and_keeps_listeners() {
    let mut fx = Fixture::new(&[Step::Open, Step::Open], Step::Fail);
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = connects.clone();
    fx.session.events().on(EventKind::Connect, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let _remote = fx.connect_open().await;
    fx.session.reset().await.unwrap();
    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    assert_eq!(fx.session.snapshot(), ConnectionSnapshot::default());

    let _remote = fx.connect_open().await;
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert_eq!(fx.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn destroy_is_irreversible() {
    let mut fx = Fixture::new(&[Step::Open], Step::Open);
    fx.session.events().on(EventKind::MatchFound, |_| Ok(()));
    let mut remote = fx.connect_open().await;

    fx.session.destroy().await.unwrap();
    assert_eq!(fx.next_event().await, SessionEvent::Disconnect);
    assert_eq!(fx.session.events().listener_count(), 0);
    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text(r#"{"type":"end_session"}"#.into()))
    );
    assert_eq!(remote.next_outbound().await, Outbound::Close(1000));

    let err = fx.session.connect(RELAY).await.unwrap_err();
    assert!(matches!(err, VoxError::Destroyed));
    let err = fx
        .session
        .send_audio(AudioFrame::new(b"OggS".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Destroyed);
    assert_eq!(fx.opens(), 1);
}

// ── Sending ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn send_audio_while_idle_is_not_connected() {
    let fx = Fixture::new(&[], Step::Open);
    let err = fx
        .session
        .send_audio(AudioFrame::new(b"RIFF\0\0\0\0WAVE".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert_eq!(fx.opens(), 0);

    let err = fx.session.find_match(profile()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert!(fx.session.snapshot().profile.is_none());
}

#[tokio::test(start_paused = true)]
async fn outbound_control_and_binary_audio() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    let mut remote = fx.connect_open().await;

    fx.session.find_match(profile()).await.unwrap();
    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text(
            r#"{"type":"find_match","profile":{"displayName":"Sam","age":27,"gender":"other","lookingFor":"any","location":"Lisbon"}}"#
                .into()
        ))
    );
    assert_eq!(fx.session.snapshot().profile, Some(profile()));

    let clip = Bytes::from_static(b"OggS\x00\x02voice");
    fx.session.send_audio(AudioFrame::new(clip.clone())).await.unwrap();
    assert_eq!(remote.next_outbound().await, Outbound::Frame(Frame::Binary(clip)));

    fx.session.end_match().await.unwrap();
    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text(r#"{"type":"end_match"}"#.into()))
    );
}

#[tokio::test(start_paused = true)]
async fn full_write_queue_is_returned_and_emitted() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    // Held but never drained, so the 16-slot queue fills up.
    let _remote = fx.connect_open().await;

    let clip = AudioFrame::new(b"OggS\x00\x02voice".to_vec());
    for _ in 0..16 {
        fx.session.send_audio(clip.clone()).await.unwrap();
    }
    let err = fx.session.send_audio(clip).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);

    match fx.next_event().await {
        SessionEvent::Error(e) => {
            assert_eq!(e.kind, ErrorKind::TransportError);
            assert!(e.message.contains("write queue full"), "{}", e.message);
        }
        other => panic!("expected error, got {other:?}"),
    }
    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Open);
    assert_eq!(snapshot.last_error, Some(ErrorKind::TransportError));
}

#[tokio::test(start_paused = true)]
async fn base64_wire_sends_text_frames() {
    let config = SessionConfig {
        audio_wire: AudioWire::Base64,
        ..Default::default()
    };
    let mut fx = Fixture::with_config(&[Step::Open], Step::Fail, config);
    let mut remote = fx.connect_open().await;

    fx.session
        .send_audio(AudioFrame::new(b"OggS".to_vec()))
        .await
        .unwrap();
    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text("T2dnUw==".into()))
    );
}

// ── Inbound dispatch ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn inbound_messages_dispatch_in_order() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    let remote = fx.connect_open().await;

    let mut wav = b"RIFF\x24\x00\x00\x00WAVE".to_vec();
    wav.resize(1_500, 0x11);
    let wav_text = voxlink_core::audio::transcode::encode_base64(&wav);

    remote.push_text(r#"{"type":"connected","message":"welcome"}"#).await;
    remote
        .push_text(r#"{"type":"match_found","partner":{"displayName":"Ana","age":25,"mood":"chatty"}}"#)
        .await;
    remote.push_text(r#"{"type":"stats_update","stats":{"usersOnline":42}}"#).await;
    remote.push_text(r#"{"type":"typing"}"#).await;
    remote.push_text("{not json").await;
    remote.push_text(&wav_text).await;
    remote
        .push(TransportEvent::Message(Frame::Binary(Bytes::from_static(
            b"OggS\x00\x02clip",
        ))))
        .await;
    remote.push_text(r#"{"type":"error","message":"slow down"}"#).await;
    remote.push_text(r#"{"type":"partner_disconnected"}"#).await;

    assert_eq!(
        fx.next_event().await,
        SessionEvent::Greeting {
            message: Some("welcome".into())
        }
    );
    match fx.next_event().await {
        SessionEvent::MatchFound { partner } => {
            assert_eq!(partner.display_name.as_deref(), Some("Ana"));
            assert_eq!(partner.age, Some(25));
            assert_eq!(partner.extra["mood"], "chatty");
        }
        other => panic!("expected match_found, got {other:?}"),
    }
    match fx.next_event().await {
        SessionEvent::StatsUpdate { stats } => assert_eq!(stats.users_online, 42),
        other => panic!("expected stats_update, got {other:?}"),
    }
    assert_eq!(error_kind(&fx.next_event().await), Some(ErrorKind::ProtocolError));
    match fx.next_event().await {
        SessionEvent::AudioReceived(frame) => {
            assert_eq!(frame.format(), AudioFormat::Wav);
            assert_eq!(frame.data().as_ref(), wav.as_slice());
        }
        other => panic!("expected audio, got {other:?}"),
    }
    match fx.next_event().await {
        SessionEvent::AudioReceived(frame) => assert_eq!(frame.format(), AudioFormat::Ogg),
        other => panic!("expected audio, got {other:?}"),
    }
    match fx.next_event().await {
        SessionEvent::Error(e) => {
            assert_eq!(e.kind, ErrorKind::Server);
            assert!(e.message.contains("slow down"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(fx.next_event().await, SessionEvent::PartnerDisconnected);

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Open);
    assert!(snapshot.partner.is_none());
    assert_eq!(snapshot.stats.map(|s| s.users_online), Some(42));
}

#[tokio::test(start_paused = true)]
async fn match_ended_and_end_match_clear_the_partner() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    let mut remote = fx.connect_open().await;

    remote
        .push_text(r#"{"type":"match_found","partner":{"displayName":"Ana"}}"#)
        .await;
    assert_eq!(fx.next_event().await.kind(), EventKind::MatchFound);
    assert!(fx.session.snapshot().partner.is_some());

    remote.push_text(r#"{"type":"match_ended"}"#).await;
    assert_eq!(fx.next_event().await, SessionEvent::MatchEnded { reason: None });
    assert!(fx.session.snapshot().partner.is_none());

    remote
        .push_text(r#"{"type":"match_found","partner":{"displayName":"Bo"}}"#)
        .await;
    assert_eq!(fx.next_event().await.kind(), EventKind::MatchFound);
    let partner = fx.session.snapshot().partner.unwrap();
    assert_eq!(partner.display_name.as_deref(), Some("Bo"));

    fx.session.end_match().await.unwrap();
    assert!(fx.session.snapshot().partner.is_none());
    assert_eq!(
        remote.next_outbound().await,
        Outbound::Frame(Frame::Text(r#"{"type":"end_match"}"#.into()))
    );
    assert_eq!(fx.session.state(), ConnectionState::Open);
}

// ── Observation ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shared_bus_and_snapshot_watch() {
    let bus = EventBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    bus.on(EventKind::Connect, move |event| {
        log.lock().unwrap().push(event.kind());
        Ok(())
    });

    let (remotes_tx, mut remotes) = mpsc::unbounded_channel();
    let connector = MockConnector {
        steps: Arc::new(Mutex::new(VecDeque::from([Step::Open]))),
        fallback: Step::Fail,
        opens: Arc::new(AtomicUsize::new(0)),
        remotes: remotes_tx,
    };
    let session =
        SessionHandle::spawn_with_events(SessionConfig::default(), Arc::new(connector), bus.clone());
    let mut watch = session.watch_snapshot();

    session.connect(RELAY).await.unwrap();
    let snapshot = watch
        .wait_for(|s| s.state == ConnectionState::Open)
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.address.unwrap().as_str(), RELAY);
    assert_eq!(snapshot.retry_count, 0);
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::Connect]);
    let _remote = remotes.recv().await.unwrap();

    // Listeners registered on the handle land on the shared bus.
    session.events().on(EventKind::Disconnect, |_| Ok(()));
    assert_eq!(bus.listener_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn faulty_handlers_do_not_disturb_the_session() {
    let mut fx = Fixture::new(&[Step::Open], Step::Fail);
    let seen = Arc::new(AtomicUsize::new(0));
    fx.session
        .events()
        .on(EventKind::Connect, |_| panic!("listener bug"));
    fx.session
        .events()
        .on(EventKind::Connect, |_| Err("listener refused".into()));
    let counter = seen.clone();
    fx.session.events().on(EventKind::Connect, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let _remote = fx.connect_open().await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(fx.session.state(), ConnectionState::Open);
}
