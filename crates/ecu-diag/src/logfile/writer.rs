//! Pipe-delimited live log writer

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::config::EcuKind;
use crate::error::EcuError;

/// Timestamp at the start of every line
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S%.3f";
/// Closing field of every line
pub const LINE_SENTINEL: &str = "IMPORTANTLINE=0|";

/// Append-only writer for one log file
pub struct LogWriter {
    path: PathBuf,
    file: File,
    lines: u64,
}

impl LogWriter {
    /// Create `<kind>-YYYY-MM-DD_HH-MM-SS.<ext>` in `dir`
    pub fn create(dir: impl AsRef<Path>, kind: EcuKind) -> Result<Self, EcuError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let name = format!(
            "{}-{}.{}",
            kind,
            Local::now().format("%Y-%m-%d_%H-%M-%S"),
            kind.log_extension()
        );
        Self::open(dir.join(name))
    }

    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EcuError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Log file opened");
        Ok(Self {
            path,
            file,
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Append one complete line
    pub fn write_line(
        &mut self,
        timestamp: &DateTime<Local>,
        intrinsic: &[(String, String)],
        polled: &[(String, String)],
    ) -> Result<(), EcuError> {
        let line = format_line(timestamp, intrinsic, polled);
        self.file.write_all(line.as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and sync to disk
    pub fn sync(&mut self) -> Result<(), EcuError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), EcuError> {
        self.sync()?;
        debug!(path = %self.path.display(), lines = self.lines, "Log file closed");
        Ok(())
    }
}

/// Render one log line, terminator included
///
/// Intrinsic signals come first, then the polled variables, each as
/// `name=value|` with the first decimal point written as a comma.
pub fn format_line(
    timestamp: &DateTime<Local>,
    intrinsic: &[(String, String)],
    polled: &[(String, String)],
) -> String {
    let mut line = String::with_capacity(64 + 24 * (intrinsic.len() + polled.len()));
    line.push_str(&timestamp.format(TIMESTAMP_FORMAT).to_string());
    line.push('|');
    for (name, value) in intrinsic.iter().chain(polled) {
        line.push_str(name);
        line.push('=');
        line.push_str(&value.replacen('.', ",", 1));
        line.push('|');
    }
    line.push_str(LINE_SENTINEL);
    line.push('\n');
    line
}
