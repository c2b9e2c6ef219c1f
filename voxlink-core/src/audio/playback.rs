//! Materialized playback files.
//!
//! Some audio sinks can only play from a path. [`TempAudioFile`] writes a
//! frame to a uniquely named temporary file whose lifetime is the value's
//! lifetime: dropping it deletes the file, including on error paths.

use std::io::Write;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::audio::format::AudioFormat;
use crate::audio::frame::AudioFrame;
use crate::error::VoxError;

/// A frame written to disk for a path-based sink.
#[derive(Debug)]
pub struct TempAudioFile {
    file: NamedTempFile,
    format: AudioFormat,
    len: u64,
}

impl TempAudioFile {
    /// Write `frame` to a new temporary file in `dir` (or the system
    /// temporary directory) and verify it is non-empty. The file extension
    /// follows `hint`, with `Unknown` played as m4a.
    pub fn materialize(
        frame: &AudioFrame,
        hint: AudioFormat,
        dir: Option<&Path>,
    ) -> Result<Self, VoxError> {
        if frame.is_empty() {
            return Err(VoxError::UnsupportedAudioFormat(
                "refusing to materialize an empty frame".into(),
            ));
        }

        let format = hint.playback();
        let suffix = format!(".{}", format.extension());
        let mut builder = Builder::new();
        builder.prefix("voxlink-").suffix(&suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(frame.data())?;
        file.flush()?;

        // `file` is dropped (and deleted) on every early return below.
        let len = file.as_file().metadata()?.len();
        if len == 0 {
            return Err(VoxError::UnsupportedAudioFormat(
                "materialized file is empty".into(),
            ));
        }

        debug!(path = %file.path().display(), len, %format, "materialized audio");
        Ok(Self { file, format, len })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Playback format (never `Unknown`).
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the file now, reporting any error.
    pub fn close(self) -> Result<(), VoxError> {
        self.file.close()?;
        Ok(())
    }
}
