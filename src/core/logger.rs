//! Operator log
//!
//! Keeps the persistent messages the engine reports (log, warning, error)
//! with timestamps, bounded in size so a scope left attached for days does
//! not grow it without limit. Optionally mirrored to a text file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Rendered size above which old entries are culled
pub const MAX_LOG_CHARS: usize = 10_000;
/// Approximate amount culled each time the limit is exceeded
pub const CULL_CHARS: usize = 2_500;

/// Entry severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Info,
    /// Something the operator should look at
    Warning,
    /// A capture was lost
    Error,
}

impl Severity {
    /// Prefix shown before the message
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Info => "",
            Self::Warning => "WARNING: ",
            Self::Error => "ERROR: ",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Local>,
    /// Severity
    pub severity: Severity,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped now
    pub fn new(severity: Severity, message: &str) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.trim_end().to_string(),
        }
    }

    /// Format as a line of text
    pub fn to_text(&self, show_timestamp: bool) -> String {
        if show_timestamp {
            format!(
                "[{}] {}{}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                self.severity.prefix(),
                self.message
            )
        } else {
            format!("{}{}", self.severity.prefix(), self.message)
        }
    }

    fn rendered_len(&self) -> usize {
        // Line plus its newline
        self.severity.prefix().len() + self.message.len() + 1
    }
}

/// Bounded, timestamped record of operator messages
#[derive(Debug)]
pub struct OperatorLog {
    entries: VecDeque<LogEntry>,
    chars: usize,
    max_chars: usize,
    cull_chars: usize,
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl Default for OperatorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorLog {
    /// Create an in-memory log with the default bounds
    pub fn new() -> Self {
        Self::with_limits(MAX_LOG_CHARS, CULL_CHARS)
    }

    /// Create with explicit bounds
    pub fn with_limits(max_chars: usize, cull_chars: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            chars: 0,
            max_chars,
            cull_chars,
            file: None,
            path: None,
        }
    }

    /// Mirror every subsequent entry to `path` (appending)
    pub fn start_file(&mut self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// File being written, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an entry
    pub fn record(&mut self, severity: Severity, message: &str) {
        let entry = LogEntry::new(severity, message);

        let write_failed = match self.file.as_mut() {
            Some(file) => writeln!(file, "{}", entry.to_text(true))
                .and_then(|()| file.flush())
                .is_err(),
            None => false,
        };
        if write_failed {
            tracing::warn!("operator log file write failed; disabling file output");
            self.file = None;
        }

        self.chars += entry.rendered_len();
        self.entries.push_back(entry);

        if self.chars > self.max_chars {
            self.cull();
        }
    }

    /// Drop whole entries from the front until at least `cull_chars` are gone
    fn cull(&mut self) {
        let mut removed = 0;
        while removed < self.cull_chars {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            removed += entry.rendered_len();
        }
        self.chars -= removed.min(self.chars);
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rendered size of the retained entries
    pub fn char_count(&self) -> usize {
        self.chars
    }

    /// Retained entries rendered one per line, without timestamps
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_text(false) + "\n")
            .collect()
    }
}
