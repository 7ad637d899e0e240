use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Hint,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Success => write!(f, "OK"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Hint => write!(f, "HINT"),
        }
    }
}

/// One diagnostic line. `indent` is the link-recursion depth it was produced at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub indent: usize,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}",
            "  ".repeat(self.indent),
            self.level,
            self.message
        )
    }
}

/// Ordered diagnostic log.
///
/// Every entry is mirrored to `tracing` at the matching level, so callers get
/// both the returned log list and the process-wide subscriber output.
#[derive(Clone, Debug, Default)]
pub struct LogBook {
    entries: Vec<LogEntry>,
    indent: usize,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indent(indent: usize) -> Self {
        Self {
            entries: Vec::new(),
            indent,
        }
    }

    /// Empty book one level deeper, for a recursive call.
    pub fn child(&self) -> Self {
        Self::with_indent(self.indent + 1)
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error | LogLevel::Warning => {
                tracing::warn!(indent = self.indent, "{}", message)
            }
            LogLevel::Success | LogLevel::Info => {
                tracing::debug!(indent = self.indent, "{}", message)
            }
            LogLevel::Hint => tracing::trace!(indent = self.indent, "{}", message),
        }
        self.entries.push(LogEntry {
            level,
            message,
            indent: self.indent,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn hint(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Hint, message);
    }

    /// Flatten a child's entries into this book, keeping their indentation.
    pub fn extend(&mut self, other: LogBook) {
        self.entries.extend(other.entries);
    }

    pub fn extend_entries(&mut self, entries: Vec<LogEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
