//! Reading live logs back

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::writer::{LINE_SENTINEL, TIMESTAMP_FORMAT};
use crate::error::EcuError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LogParseError {
    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    #[error("field {0:?} is not name=value")]
    Field(String),
}

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    /// Name/value pairs in file order, decimal points restored
    pub values: Vec<(String, String)>,
}

impl LogRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Numeric value of `name`, if present and numeric
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name)?.parse().ok()
    }
}

/// Parse one line (with or without its line break)
pub fn parse_line(line: &str) -> Result<LogRecord, LogParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split('|');

    let stamp = fields
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(LogParseError::MissingTimestamp)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|_| LogParseError::Timestamp(stamp.to_string()))?;

    let sentinel = LINE_SENTINEL.trim_end_matches('|');
    let mut values = Vec::new();
    for field in fields.filter(|f| !f.is_empty() && *f != sentinel) {
        let (name, value) = field
            .split_once('=')
            .ok_or_else(|| LogParseError::Field(field.to_string()))?;
        values.push((name.to_string(), value.replacen(',', ".", 1)));
    }

    Ok(LogRecord { timestamp, values })
}

/// Line by line reader over a log file
pub struct LogReader<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl LogReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EcuError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogRecord, EcuError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(&line).map_err(|source| EcuError::LogFormat {
                line: self.line_number,
                source,
            }));
        }
    }
}

/// Min/max of one signal over a log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRange {
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Overview of a log file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub records: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub signals: BTreeMap<String, SignalRange>,
}

impl LogSummary {
    pub fn add(&mut self, record: &LogRecord) {
        self.records += 1;
        self.first = Some(self.first.map_or(record.timestamp, |t| t.min(record.timestamp)));
        self.last = Some(self.last.map_or(record.timestamp, |t| t.max(record.timestamp)));

        for (name, value) in &record.values {
            let Ok(value) = value.parse::<f64>() else {
                continue;
            };
            self.signals
                .entry(name.clone())
                .and_modify(|r| {
                    r.min = r.min.min(value);
                    r.max = r.max.max(value);
                    r.samples += 1;
                })
                .or_insert(SignalRange {
                    min: value,
                    max: value,
                    samples: 1,
                });
        }
    }

    /// Summarise a whole log, stopping at the first malformed line
    pub fn from_records(
        records: impl IntoIterator<Item = Result<LogRecord, EcuError>>,
    ) -> Result<Self, EcuError> {
        let mut summary = Self::default();
        for record in records {
            summary.add(&record?);
        }
        Ok(summary)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.last? - self.first?)
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records: {}", self.records)?;
        if let (Some(first), Some(last)) = (self.first, self.last) {
            writeln!(f, "From:    {}", first.format(TIMESTAMP_FORMAT))?;
            writeln!(f, "To:      {}", last.format(TIMESTAMP_FORMAT))?;
        }
        for (name, range) in &self.signals {
            writeln!(
                f,
                "  {:<32} min {:>12} max {:>12} ({} samples)",
                name, range.min, range.max, range.samples
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::writer::format_line;
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_restores_decimal_points() {
        let ts = Local.with_ymd_and_hms(2023, 11, 2, 8, 30, 0).unwrap();
        let intrinsic = vec![("ActualIn.n_Engine".to_string(), "0".to_string())];
        let polled = vec![
            ("Out.M_Engine".to_string(), "-12.75".to_string()),
            ("In.v_Vehicle".to_string(), "88.1".to_string()),
        ];

        let record = parse_line(&format_line(&ts, &intrinsic, &polled)).unwrap();
        assert_eq!(record.timestamp, ts.naive_local());
        assert_eq!(
            record.values,
            intrinsic.into_iter().chain(polled).collect::<Vec<_>>()
        );
        assert_eq!(record.value("Out.M_Engine"), Some(-12.75));
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_line(""), Err(LogParseError::MissingTimestamp));
        assert!(matches!(
            parse_line("yesterday|a=1|"),
            Err(LogParseError::Timestamp(_))
        ));
        assert_eq!(
            parse_line("01-01-2024 00:00:00.000|garbage|"),
            Err(LogParseError::Field("garbage".to_string()))
        );
    }

    #[test]
    fn test_reader_and_summary() {
        let log = "\
01-01-2024 10:00:00.000|rpm=800|temp=80,5|IMPORTANTLINE=0|
01-01-2024 10:00:00.050|rpm=950|temp=81,0|IMPORTANTLINE=0|

01-01-2024 10:00:01.000|rpm=900|temp=79,5|IMPORTANTLINE=0|
";
        let reader = LogReader::new(std::io::Cursor::new(log));
        let summary = LogSummary::from_records(reader).unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.duration(), Some(chrono::Duration::seconds(1)));
        let rpm = summary.signals["rpm"];
        assert_eq!((rpm.min, rpm.max, rpm.samples), (800.0, 950.0, 3));
        assert_eq!(summary.signals["temp"].min, 79.5);
        assert!(!summary.signals.contains_key("IMPORTANTLINE"));
    }

    #[test]
    fn test_reader_reports_line_number() {
        let log = "01-01-2024 10:00:00.000|rpm=800|\nbroken\n";
        let mut reader = LogReader::new(std::io::Cursor::new(log));
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next().unwrap(),
            Err(EcuError::LogFormat { line: 2, .. })
        ));
        assert!(reader.next().is_none());
    }
}
