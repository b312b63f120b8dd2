#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the pipeline stages and the web server.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component emitting the log (e.g. `ingestion`).
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Short event name or message.
    pub message: String,
    /// Structured fields attached to the record.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches the fields of a JSON object; non-object values land under `value`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match metadata {
            serde_json::Value::Object(map) => self.metadata = map,
            serde_json::Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }

    fn console_line(&self) -> String {
        let mut line = format!(
            "{} {:<5} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.module,
            self.message
        );
        if !self.metadata.is_empty() {
            line.push(' ');
            line.push_str(&serde_json::Value::Object(self.metadata.clone()).to_string());
        }
        line
    }
}

/// Thread-safe JSON logger with append-only semantics and an optional stderr mirror.
#[derive(Debug)]
pub struct JsonLogger {
    path: Option<PathBuf>,
    writer: Option<Mutex<File>>,
    echo: bool,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Creates or opens a logger appending to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path: Some(path),
            writer: Some(Mutex::new(file)),
            echo: false,
            min_level: LogLevel::Debug,
        })
    }

    /// Logger that only writes human-readable lines to stderr.
    #[must_use]
    pub const fn console() -> Self {
        Self {
            path: None,
            writer: None,
            echo: true,
            min_level: LogLevel::Info,
        }
    }

    /// Mirrors every accepted record to stderr.
    #[must_use]
    pub fn echo_to_stderr(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Writes a log record as a JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level {
            return Ok(());
        }
        if let Some(writer) = &self.writer {
            let mut writer = writer.lock();
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        if self.echo {
            eprintln!("{}", record.console_line());
        }
        Ok(())
    }

    /// Returns the file path, if this logger writes to one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
