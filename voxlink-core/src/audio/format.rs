//! Container detection from leading byte signatures.

use std::fmt;

/// Number of leading bytes inspected for container signatures.
pub const HEADER_WINDOW: usize = 12;

/// EBML magic that opens every Matroska/WebM file.
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Audio container inferred from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    M4a,
    Webm,
    Wav,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Classify `data` by inspecting its first [`HEADER_WINDOW`] bytes.
    ///
    /// Detection never reads or alters the payload beyond the window.
    pub fn detect(data: &[u8]) -> Self {
        let head = &data[..data.len().min(HEADER_WINDOW)];

        if head.starts_with(b"RIFF") && head.len() >= 12 && &head[8..12] == b"WAVE" {
            return Self::Wav;
        }
        if head.starts_with(b"OggS") {
            return Self::Ogg;
        }
        if contains(head, b"ftyp") && contains(head, b"M4A") {
            return Self::M4a;
        }
        if head.starts_with(&EBML_MAGIC) || contains(head, b"webm") {
            return Self::Webm;
        }
        Self::Unknown
    }

    /// The format to hand to a player. `Unknown` plays as m4a.
    pub fn playback(self) -> Self {
        match self {
            Self::Unknown => Self::M4a,
            other => other,
        }
    }

    /// MIME type hint for playback. `Unknown` resolves to the m4a hint.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::M4a | Self::Unknown => "audio/mp4",
            Self::Webm => "audio/webm",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
        }
    }

    /// File extension (without the dot) for materialized playback files.
    pub fn extension(self) -> &'static str {
        match self {
            Self::M4a | Self::Unknown => "m4a",
            Self::Webm => "webm",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::M4a => "m4a",
            Self::Webm => "webm",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
