//! Decoded log-event sources
//!
//! The wire format of the activity log (XML, text, whatever the VCS emits)
//! is somebody else's problem. This module defines the hand-off surface: a
//! synchronous, finite, non-restartable iterator of [`PathEvent`]s already
//! decoded into primitive fields, strictly in log order (newest commit
//! first). The shipped [`JsonLogReader`] consumes that decoded stream as
//! JSON lines, one event per line.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StructuralLogError;
use crate::models::FileAction;

/// One decoded path-level entry from the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEvent {
    pub path: String,
    pub action: FileAction,
    pub revision: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    /// Hint from the log that the path holds non-line-countable content.
    #[serde(default)]
    pub binary_hint: bool,
}

/// A lazy, finite, non-restartable sequence of decoded path-events.
///
/// Implementors must yield events newest-first; the assembler enforces that
/// ordering and aborts on violation.
pub trait LogSource: Iterator<Item = Result<PathEvent, StructuralLogError>> {}

impl<T> LogSource for T where T: Iterator<Item = Result<PathEvent, StructuralLogError>> {}

/// Reads a pre-decoded event stream: one JSON object per line.
///
/// Blank lines are skipped; anything else that fails to decode is a
/// structural error carrying the offending line number.
pub struct JsonLogReader<R: BufRead> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> JsonLogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonLogReader<R> {
    type Item = Result<PathEvent, StructuralLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(StructuralLogError::Truncated(format!(
                        "read failed at line {}: {}",
                        self.line_no, e
                    ))))
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|e| {
                StructuralLogError::MalformedRecord {
                    line: self.line_no,
                    reason: e.to_string(),
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_events_in_stream_order() {
        let input = r#"
{"path":"src/a.rs","action":"M","revision":9,"author":"bob","timestamp":"2024-03-02T10:00:00Z"}

{"path":"src/a.rs","action":"A","revision":5,"author":"alice","timestamp":"2024-03-01T10:00:00Z","comment":"initial"}
"#;
        let events: Vec<_> = JsonLogReader::new(Cursor::new(input))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].revision, 9);
        assert_eq!(events[0].action, FileAction::Modified);
        assert_eq!(events[1].revision, 5);
        assert_eq!(events[1].comment, "initial");
        assert!(!events[1].binary_hint);
    }

    #[test]
    fn malformed_line_reports_its_position() {
        let input = "{\"path\":\"a\",\"action\":\"A\",\"revision\":3,\"author\":\"x\",\"timestamp\":\"2024-03-01T10:00:00Z\"}\nnot json\n";
        let results: Vec<_> = JsonLogReader::new(Cursor::new(input)).collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(StructuralLogError::MalformedRecord { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let mut reader = JsonLogReader::new(Cursor::new(""));
        assert!(reader.next().is_none());
    }
}
