//! VoxLink command-line client entry point.
//!
//! ```text
//! voxlink                              Connect with defaults
//! voxlink --config <path>              Use custom config TOML
//! voxlink --server wss://relay/ws      Override the relay address
//! voxlink --clip hello.m4a --clip bye.m4a
//!                                      Send these clips once matched
//! voxlink --gen-config                 Write default config to --config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voxlink_core::{
    AddressProvider, AudioSink, AudioWire, MicrophoneSource, ProfileStore, SessionEvent,
    SessionHandle, WsConnector,
};

use voxlink_cli::config::ClientConfig;
use voxlink_cli::device::{FileMicrophone, build_sink, spawn_playback};

/// Received clips waiting for the player.
const PLAYBACK_QUEUE: usize = 16;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "voxlink", about = "Anonymous voice-clip exchange over a relay")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "voxlink.toml")]
    config: PathBuf,

    /// Relay address (overrides config). Example: wss://relay.example/ws
    #[arg(short, long)]
    server: Option<String>,

    /// Recorded clip to send once matched. Repeatable.
    #[arg(long = "clip")]
    clips: Vec<PathBuf>,

    /// Send audio as base64 text frames.
    #[arg(long)]
    base64: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        config.network.server_address = addr;
    }
    if cli.base64 {
        config.session.audio_wire = AudioWire::Base64;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("voxlink v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Collaborators ────────────────────────────────────────

    let address = config.network.server_address()?;
    let profile = config.profile.stored_profile();
    if profile.is_none() {
        warn!("no profile configured; connecting without matchmaking");
    }
    let mut microphone = FileMicrophone::new(cli.clips);
    let sink: Arc<dyn AudioSink> = build_sink(&config.audio);
    let (clips, player) = spawn_playback(sink, PLAYBACK_QUEUE);

    // ── 2. Start the session ────────────────────────────────────

    let mut connector = WsConnector::new(config.session.transport_channel_capacity);
    if config.network.keepalive_secs > 0 {
        connector = connector.with_keepalive(Duration::from_secs(config.network.keepalive_secs));
    }
    let session = SessionHandle::spawn(config.session.clone(), connector);
    let mut events = session.events().subscribe();

    info!(%address, "connecting");
    session.connect(address.as_str()).await?;

    // ── 3. Event loop ───────────────────────────────────────────

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => event,
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("event stream lagged; {n} events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            SessionEvent::Connect => {
                info!("connected");
                if let Some(profile) = &profile {
                    if let Err(e) = session.find_match(profile.clone()).await {
                        warn!("find_match failed: {e}");
                    }
                }
            }
            SessionEvent::Greeting { message } => {
                info!("relay: {}", message.as_deref().unwrap_or("hello"));
            }
            SessionEvent::MatchFound { partner } => {
                info!(
                    name = partner.display_name.as_deref().unwrap_or("anonymous"),
                    age = ?partner.age,
                    location = partner.location.as_deref().unwrap_or("-"),
                    "matched"
                );
                while microphone.remaining() > 0 {
                    let frame = match microphone.capture_frame().await {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("skipping clip: {e}");
                            continue;
                        }
                    };
                    info!(len = frame.len(), format = %frame.format(), "sending clip");
                    if let Err(e) = session.send_audio(frame).await {
                        warn!("send failed: {e}");
                        break;
                    }
                }
            }
            SessionEvent::MatchEnded { reason } => {
                info!("match ended: {}", reason.as_deref().unwrap_or("no reason"));
            }
            SessionEvent::NoMatches => info!("nobody available right now"),
            SessionEvent::PartnerDisconnected => info!("partner left"),
            SessionEvent::StatsUpdate { stats } => info!(users_online = stats.users_online, "stats"),
            SessionEvent::AudioReceived(frame) => {
                if !frame.format().is_known() {
                    warn!(len = frame.len(), "unrecognized container; playing as m4a");
                }
                if clips.try_send(frame).is_err() {
                    warn!("playback queue full; dropping clip");
                }
            }
            SessionEvent::Error(e) => warn!("{e}"),
            SessionEvent::Reconnecting { attempt, delay } => {
                info!(attempt, ?delay, "reconnecting");
            }
            SessionEvent::Disconnect => info!("disconnected"),
            SessionEvent::MaxRetryExceeded { attempts } => {
                error!("relay unreachable after {attempts} attempts");
                break;
            }
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    session.disconnect().await?;
    session.destroy().await?;
    drop(clips);
    player.abort();
    let _ = player.await;

    Ok(())
}
