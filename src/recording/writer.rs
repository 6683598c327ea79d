//! Streaming container writer
//!
//! One output path for the whole process. Each session truncates it and starts
//! over; the size fields are patched exactly once, at shutdown.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ContainerError;
use crate::recording::wav::{finalized_sizes, patch_sizes, FinalSizes, WavFormat};

/// State guarded by the writer lock
#[derive(Debug, Default)]
struct ContainerState {
    file: Option<File>,
    total_samples_written: u64,
    is_header_committed: bool,
    ever_opened: bool,
}

/// What finalize wrote into the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub total_samples: u64,
    pub sizes: FinalSizes,
}

/// WAV file sink shared between the session thread and shutdown
#[derive(Debug)]
pub struct ContainerWriter {
    path: PathBuf,
    format: WavFormat,
    state: Mutex<ContainerState>,
}

impl ContainerWriter {
    pub fn new(path: impl Into<PathBuf>, format: WavFormat) -> Self {
        Self {
            path: path.into(),
            format,
            state: Mutex::new(ContainerState::default()),
        }
    }

    /// Create or truncate the file and write a placeholder header.
    ///
    /// Resets the sample count as soon as the file is truncated, so a failed
    /// header write never leaves an older session's count behind.
    pub fn open(&self) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        if state.is_header_committed {
            return Err(ContainerError::AlreadyFinalized);
        }
        state.file = None;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| ContainerError::Create {
                path: self.path.clone(),
                source,
            })?;
        state.total_samples_written = 0;
        state.ever_opened = true;

        file.write_all(&self.format.header_bytes())?;
        file.flush()?;
        state.file = Some(file);

        tracing::info!(
            "Recording to {} ({} Hz, {} ch, 24-bit)",
            self.path.display(),
            self.format.sample_rate,
            self.format.channels
        );
        Ok(())
    }

    /// Append converted samples carrying `frames` sample frames.
    ///
    /// Returns the number of bytes that reached the file. A short write is
    /// logged and not retried; the sample count still advances by `frames`.
    pub fn append(&self, bytes: &[u8], frames: u64) -> Result<usize, ContainerError> {
        let mut state = self.state.lock();
        let file = state.file.as_mut().ok_or(ContainerError::NotOpen)?;

        let written = write_best_effort(file, bytes);
        if let Err(e) = file.flush() {
            tracing::warn!("Flush failed: {}", e);
        }
        state.total_samples_written += frames;

        if written < bytes.len() {
            tracing::warn!(
                "{}",
                ContainerError::ShortWrite {
                    written,
                    requested: bytes.len(),
                }
            );
        }
        Ok(written)
    }

    /// Close the file handle, leaving the placeholder header for finalize
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush() {
                tracing::warn!("Flush on close failed: {}", e);
            }
        }
    }

    /// Patch the RIFF and data sizes from the current sample count.
    ///
    /// Runs at most once per writer. Returns `Ok(None)` if no session ever
    /// opened the file.
    pub fn finalize(&self) -> Result<Option<FinalizeSummary>, ContainerError> {
        let mut state = self.state.lock();
        if state.is_header_committed {
            return Err(ContainerError::AlreadyFinalized);
        }
        state.is_header_committed = true;

        // An in-flight session may still hold the handle
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }

        if !state.ever_opened {
            return Ok(None);
        }

        let total_samples = state.total_samples_written;
        let sizes = finalized_sizes(total_samples, self.format.channels);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| ContainerError::Reopen {
                path: self.path.clone(),
                source,
            })?;
        patch_sizes(&mut file, sizes).map_err(ContainerError::Patch)?;
        file.sync_all().map_err(ContainerError::Patch)?;

        Ok(Some(FinalizeSummary {
            total_samples,
            sizes,
        }))
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().is_header_committed
    }

    pub fn total_samples_written(&self) -> u64 {
        self.state.lock().total_samples_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> WavFormat {
        self.format
    }
}

/// Write as much as the sink accepts, stopping at the first stall or error
fn write_best_effort<W: Write>(out: &mut W, bytes: &[u8]) -> usize {
    let mut written = 0;
    while written < bytes.len() {
        match out.write(&bytes[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Write failed after {} bytes: {}", written, e);
                break;
            }
        }
    }
    written
}
