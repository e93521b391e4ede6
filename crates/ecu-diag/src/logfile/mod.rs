//! Live log files
//!
//! One line per successfully decoded tick:
//!
//! ```text
//! 09-03-2024 14:05:07.042|ActualIn.n_Engine=850|In.v_Vehicle=12,5|IMPORTANTLINE=0|
//! ```

mod reader;
mod writer;

pub use reader::{parse_line, LogParseError, LogReader, LogRecord, LogSummary, SignalRange};
pub use writer::{format_line, LogWriter, LINE_SENTINEL, TIMESTAMP_FORMAT};
