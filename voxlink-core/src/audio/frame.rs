use bytes::Bytes;

use crate::audio::format::AudioFormat;

/// One voice clip as it travels through the session.
///
/// The payload is immutable; transforms produce new buffers. Frames are
/// handed on once (played or sent) and not retained by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    format: AudioFormat,
}

impl AudioFrame {
    /// Wrap a payload, detecting its container.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let format = AudioFormat::detect(&data);
        Self { data, format }
    }

    /// A frame from a finished local recording.
    pub fn from_recording(data: impl Into<Bytes>) -> Self {
        Self::new(data)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame, yielding its payload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
