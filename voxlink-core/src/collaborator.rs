//! Interfaces to the collaborators around the session: where the relay
//! address and profile come from, where recordings come from, and where
//! received audio goes.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::VoxError;
use crate::message::Profile;

/// Supplies the relay address.
pub trait AddressProvider: Send + Sync {
    fn server_address(&self) -> Result<Url, VoxError>;
}

/// Supplies the stored profile, if the user has one.
pub trait ProfileStore: Send + Sync {
    fn stored_profile(&self) -> Option<Profile>;
}

/// Produces one recorded clip per call, fully in memory.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    async fn capture(&mut self) -> Result<Bytes, VoxError>;

    /// Capture and wrap as an outbound frame.
    async fn capture_frame(&mut self) -> Result<AudioFrame, VoxError> {
        let data = self.capture().await?;
        if data.is_empty() {
            return Err(VoxError::UnsupportedAudioFormat("empty recording".into()));
        }
        Ok(AudioFrame::from_recording(data))
    }
}

/// Consumes received audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `frame`. `hint` is the container to assume; never `Unknown`.
    async fn play(&self, frame: AudioFrame, hint: AudioFormat) -> Result<(), VoxError>;
}

/// Static address, e.g. from a config file or command line.
impl AddressProvider for Url {
    fn server_address(&self) -> Result<Url, VoxError> {
        Ok(self.clone())
    }
}

impl ProfileStore for Option<Profile> {
    fn stored_profile(&self) -> Option<Profile> {
        self.clone()
    }
}
