//! JSONL session log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a partial line.
//!
//! Degradation chain:
//! 1. Primary file under the logs directory
//! 2. Fallback file (`logging.jsonl_fallback`)
//! 3. stderr with `[ARS-JSONL]` prefix
//! 4. Silent discard (a scan never fails because logging failed)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::LoggingConfig;
use crate::core::errors::{ArsError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Level tag used in the plain-text session log.
    #[must_use]
    pub const fn as_level(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Event types of one scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    TransportSelected,
    LogsPruned,
    ListsLoaded,
    ArtifactStart,
    Fingerprint,
    LookupResult,
    RateLimit,
    Sandbox,
    Classification,
    Upload,
    Relocation,
    Report,
    ArtifactComplete,
    Error,
    SessionComplete,
}

/// A single JSONL log entry; all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Artifact file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Filesystem path involved (source or destination).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malicious: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspicious: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// ARS error code if the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details; also the plain-text log message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            artifact: None,
            path: None,
            size: None,
            fingerprint: None,
            disposition: None,
            malicious: None,
            suspicious: None,
            total: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where session log lines currently land, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl Sink {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }

    const fn next(self) -> Self {
        match self {
            Self::Primary => Self::Fallback,
            Self::Fallback => Self::Stderr,
            Self::Stderr | Self::Discard => Self::Discard,
        }
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Size at which the active file is sealed into a numbered segment.
    pub max_size_bytes: u64,
    /// Sealed segments kept per session; older ones are deleted.
    pub max_segments: u32,
}

impl JsonlConfig {
    /// Session JSONL under `logs_dir` with size limits from `[logging]`.
    #[must_use]
    pub fn for_session(logs_dir: &Path, session_id: &str, logging: &LoggingConfig) -> Self {
        let file_name = format!("scan_session_{session_id}.jsonl");
        Self {
            path: logs_dir.join(&file_name),
            fallback_path: logging
                .jsonl_fallback
                .as_ref()
                .map(|dir| dir.join(&file_name)),
            max_size_bytes: logging.jsonl_max_bytes,
            max_segments: logging.jsonl_max_rotated,
        }
    }
}

/// Lines written between `sync_data` calls.
const SYNC_EVERY_LINES: u32 = 64;

/// Append-only writer for one session's JSONL log.
///
/// When the active file outgrows `max_size_bytes` it is renamed to
/// `<name>.1`, `<name>.2`, ... in write order and a fresh file is started.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    file: Option<BufWriter<File>>,
    segment_bytes: u64,
    sealed: u32,
    unsynced_lines: u32,
}

impl JsonlWriter {
    /// Open the primary file, walking down the sink chain if it cannot be opened.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            sink: Sink::Primary,
            file: None,
            segment_bytes: 0,
            sealed: 0,
            unsynced_lines: 0,
        };
        writer.attach(Sink::Primary);
        writer
    }

    /// Sink currently receiving lines.
    #[must_use]
    pub const fn sink(&self) -> Sink {
        self.sink
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[ARS-JSONL] serialize error: {e}");
            }
        }
    }

    /// Flush buffered lines to the OS.
    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Flush and sync; called once when the session ends.
    pub fn finish(&mut self) {
        self.sync();
    }

    // ──────────────────────── internals ────────────────────────

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.file.is_some()
            && self.segment_bytes > 0
            && self.segment_bytes + len > self.config.max_size_bytes
        {
            self.seal_segment();
        }

        match self.sink {
            Sink::Primary | Sink::Fallback => {
                let written = self
                    .file
                    .as_mut()
                    .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                if !written {
                    self.attach(self.sink.next());
                    self.write_line(line);
                    return;
                }
                self.segment_bytes += len;
                self.unsynced_lines += 1;
                if self.unsynced_lines >= SYNC_EVERY_LINES {
                    self.sync();
                }
            }
            Sink::Stderr => {
                if write!(io::stderr(), "[ARS-JSONL] {line}").is_err() {
                    self.sink = Sink::Discard;
                }
            }
            Sink::Discard => {}
        }
    }

    fn sync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.unsynced_lines = 0;
    }

    /// Path backing a file sink.
    fn target(&self, sink: Sink) -> Option<&Path> {
        match sink {
            Sink::Primary => Some(self.config.path.as_path()),
            Sink::Fallback => self.config.fallback_path.as_deref(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    /// Open the first usable sink at or below `from`.
    fn attach(&mut self, from: Sink) {
        self.file = None;
        let mut sink = from;
        while matches!(sink, Sink::Primary | Sink::Fallback) {
            if let Some(path) = self.target(sink)
                && let Ok((file, size)) = open_append(path)
            {
                self.file = Some(BufWriter::new(file));
                self.segment_bytes = size;
                break;
            }
            sink = sink.next();
        }
        if sink != Sink::Primary {
            let _ = writeln!(
                io::stderr(),
                "[ARS-JSONL] session log moved to {} sink",
                sink.as_str()
            );
        }
        self.sink = sink;
    }

    /// Rename the active file to the next segment number and start a new one.
    fn seal_segment(&mut self) {
        self.sync();
        self.file = None;
        let Some(active) = self.target(self.sink).map(Path::to_path_buf) else {
            return;
        };

        self.sealed += 1;
        if fs::rename(&active, segment_name(&active, self.sealed)).is_err() {
            self.attach(self.sink.next());
            return;
        }
        if self.sealed > self.config.max_segments {
            let expired = self.sealed - self.config.max_segments;
            let _ = fs::remove_file(segment_name(&active, expired));
        }

        match open_append(&active) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::new(file));
                self.segment_bytes = size;
            }
            Err(_) => self.attach(self.sink.next()),
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ArsError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ArsError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `scan_session_x.jsonl` → `scan_session_x.jsonl.3`.
fn segment_name(active: &Path, index: u32) -> PathBuf {
    let mut name = active.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Format current UTC time as ISO 8601.
fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
