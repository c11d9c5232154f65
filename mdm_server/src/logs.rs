//! Operator action log and per-device send timing log.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Append-only log of operator actions, one `HH:MM:SS  message` line each.
pub struct ActionLog {
    path: PathBuf,
    file: File,
}

impl ActionLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Append one timestamped line (local wall-clock time).
    pub fn append(&mut self, message: &str) -> io::Result<()> {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        writeln!(self.file, "{stamp}  {message}")
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File name of the timing log of 1-based `device`.
pub fn timing_log_name(device: usize) -> String {
    format!("speed_log_{device}.log")
}

/// UNIX timestamp of every hardware send of one device.
///
/// Truncated when opened, one `seconds.micros` line per send.
pub struct TimingLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TimingLog {
    /// Create (truncating) the timing log of `device` in `dir`.
    pub fn create(dir: &Path, device: usize) -> io::Result<Self> {
        let path = dir.join(timing_log_name(device));
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Record a send at `at`.
    pub fn record(&mut self, at: SystemTime) -> io::Result<()> {
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        writeln!(self.writer, "{secs:.6}")
    }

    /// Flush buffered lines to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
