//! File- and process-backed collaborators for the session.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use voxlink_core::{
    AddressProvider, AudioFormat, AudioFrame, AudioSink, MicrophoneSource, Profile,
    ProfileStore, TempAudioFile, VoxError,
};

use crate::config::{AudioConfig, NetworkConfig, ProfileConfig};

// ── Address / profile ────────────────────────────────────────────

impl AddressProvider for NetworkConfig {
    fn server_address(&self) -> Result<Url, VoxError> {
        let url = Url::parse(&self.server_address)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(VoxError::InvalidAddress(format!(
                "expected ws:// or wss://, got {other}://"
            ))),
        }
    }
}

impl ProfileStore for ProfileConfig {
    fn stored_profile(&self) -> Option<Profile> {
        if self.display_name.trim().is_empty() {
            return None;
        }
        Some(Profile {
            display_name: self.display_name.trim().to_string(),
            age: self.age,
            gender: self.gender,
            looking_for: self.looking_for,
            location: Some(self.location.trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        })
    }
}

// ── Microphone ───────────────────────────────────────────────────

/// Plays back pre-recorded clips as if they were fresh recordings.
#[derive(Debug, Default)]
pub struct FileMicrophone {
    clips: VecDeque<PathBuf>,
}

impl FileMicrophone {
    pub fn new(clips: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            clips: clips.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.clips.len()
    }
}

#[async_trait]
impl MicrophoneSource for FileMicrophone {
    async fn capture(&mut self) -> Result<Bytes, VoxError> {
        let path = self
            .clips
            .pop_front()
            .ok_or_else(|| VoxError::Other("no recordings left".into()))?;
        // Read fully; the session never streams from disk.
        let data = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), len = data.len(), "captured clip");
        Ok(Bytes::from(data))
    }
}

// ── Sinks ────────────────────────────────────────────────────────

/// Runs an external player on a temporary copy of each clip.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    temp_dir: Option<PathBuf>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>, temp_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            temp_dir,
        }
    }
}

#[async_trait]
impl AudioSink for CommandPlayer {
    async fn play(&self, frame: AudioFrame, hint: AudioFormat) -> Result<(), VoxError> {
        // Deleted when `file` drops, whatever the player does.
        let file = TempAudioFile::materialize(&frame, hint, self.temp_dir.as_deref())?;
        debug!(path = %file.path().display(), %hint, mime = hint.mime_type(), "playing clip");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            return Err(VoxError::Other(format!("{} exited with {status}", self.program)));
        }
        Ok(())
    }
}

/// Saves each clip into a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioSink for DirectorySink {
    async fn play(&self, frame: AudioFrame, hint: AudioFormat) -> Result<(), VoxError> {
        if frame.is_empty() {
            return Err(VoxError::UnsupportedAudioFormat("empty clip".into()));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("clip-{n:04}.{}", hint.extension()));
        tokio::fs::write(&path, frame.data()).await?;
        info!(path = %path.display(), len = frame.len(), "saved clip");
        Ok(())
    }
}

/// Pick the sink the audio config asks for.
pub fn build_sink(config: &AudioConfig) -> Arc<dyn AudioSink> {
    match config.player.split_first() {
        Some((program, args)) => {
            let temp_dir = Some(PathBuf::from(&config.temp_dir)).filter(|d| !d.as_os_str().is_empty());
            Arc::new(CommandPlayer::new(program.clone(), args.to_vec(), temp_dir))
        }
        None => Arc::new(DirectorySink::new(&config.save_dir)),
    }
}

/// Start the task that plays received clips one at a time, in arrival
/// order. Dropping the sender lets it drain the queue and exit; aborting the
/// handle stops the clip in progress.
pub fn spawn_playback(
    sink: Arc<dyn AudioSink>,
    capacity: usize,
) -> (mpsc::Sender<AudioFrame>, JoinHandle<()>) {
    let (clips_tx, mut clips_rx) = mpsc::channel::<AudioFrame>(capacity);
    let task = tokio::spawn(async move {
        while let Some(frame) = clips_rx.recv().await {
            let hint = frame.format().playback();
            if let Err(e) = sink.play(frame, hint).await {
                warn!("playback failed: {e}");
            }
        }
        debug!("playback queue closed");
    });
    (clips_tx, task)
}

// ── Tests ────────────────────────────────────────────────────────
