//! Replay command - summarise a recorded log

use anyhow::{Context, Result};
use ecu_diag::{LogReader, LogSummary};
use std::path::Path;

/// Print record count, time span and per-signal ranges of a log file
pub fn replay(path: &Path) -> Result<()> {
    let summary = summarise(path)?;
    print!("{}", summary);
    if let Some(duration) = summary.duration() {
        println!("Span:    {:.3} s", duration.num_milliseconds() as f64 / 1000.0);
    }
    Ok(())
}

fn summarise(path: &Path) -> Result<LogSummary> {
    let reader = LogReader::open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    LogSummary::from_records(reader)
        .with_context(|| format!("Failed to read log file: {}", path.display()))
}
