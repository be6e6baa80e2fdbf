//! Dual-write session logger: JSONL plus a plain-text session log.
//!
//! Architecture: a dedicated logger thread owns the `JsonlWriter` and the text
//! log. The orchestrator sends `ActivityEvent`s through a bounded crossbeam
//! channel. Non-blocking `try_send()` keeps the scan loop from ever waiting on
//! logging back-pressure.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use chrono::Local;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{ArsError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity, Sink};

// ──────────────────── channel capacity ────────────────────

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events emitted during one scan session.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SessionStarted {
        session_id: String,
        version: String,
        config_hash: String,
        directories: Vec<String>,
    },
    TransportSelected {
        kind: String,
        fallback_reason: Option<String>,
    },
    LogsPruned {
        removed: usize,
    },
    ListsLoaded {
        allow: usize,
        deny: usize,
    },
    ArtifactStarted {
        artifact: String,
        path: String,
        size_bytes: u64,
        index: usize,
        total: usize,
    },
    Fingerprinted {
        artifact: String,
        fingerprint: String,
    },
    LookupCompleted {
        artifact: String,
        fingerprint: String,
        status: String,
    },
    RateLimited {
        artifact: String,
        retry: u32,
        wait_secs: u64,
    },
    SandboxVerdicts {
        artifact: String,
        count: usize,
    },
    Classified {
        artifact: String,
        disposition: String,
        malicious: u64,
        suspicious: u64,
        total: u64,
        infecting: usize,
    },
    UploadRouted {
        artifact: String,
        disposition: String,
        reason: String,
    },
    Relocated {
        artifact: String,
        from: String,
        to: String,
    },
    ReportWritten {
        artifact: String,
        path: String,
    },
    ArtifactCompleted {
        artifact: String,
        disposition: String,
        reason: Option<String>,
        duration_ms: u64,
    },
    Error {
        artifact: Option<String>,
        code: String,
        message: String,
    },
    SessionCompleted {
        processed: usize,
        tally: String,
        duration_ms: u64,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
///
/// `send()` uses `try_send()` so callers are never blocked by logging
/// back-pressure.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Join the thread afterwards.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for building the session logger.
pub struct DualLoggerConfig {
    /// Plain-text session log. `None` disables it.
    pub text_path: Option<PathBuf>,
    /// JSONL writer config (always active).
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl DualLoggerConfig {
    /// `scan_session_<id>.log` and `.jsonl` under `logs_dir`.
    #[must_use]
    pub fn for_session(logs_dir: &Path, session_id: &str, logging: &LoggingConfig) -> Self {
        Self {
            text_path: Some(logs_dir.join(format!("scan_session_{session_id}.log"))),
            jsonl_config: JsonlConfig::for_session(logs_dir, session_id, logging),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle.
///
/// The logger thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
///
/// # Errors
/// [`ArsError::Runtime`] if the thread cannot be spawned.
pub fn spawn_logger(
    config: DualLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("ars-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.text_path, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| ArsError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── plain-text log ────────────────────

/// `[YYYY-mm-dd HH:MM:SS] [LEVEL] message` lines, local time.
struct TextLog {
    writer: Option<BufWriter<File>>,
}

impl TextLog {
    fn open(path: Option<&Path>) -> Self {
        let writer = path.and_then(|p| {
            if let Some(parent) = p.parent() {
                let _ = fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(p) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    let _ = writeln!(
                        io::stderr(),
                        "[ARS-LOG] cannot open session log {}: {e}",
                        p.display()
                    );
                    None
                }
            }
        });
        Self { writer }
    }

    fn write(&mut self, severity: Severity, message: &str) {
        let Some(w) = self.writer.as_mut() else {
            return;
        };
        let line = format_text_line(
            &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            severity,
            message,
        );
        if w.write_all(line.as_bytes()).is_err() {
            let _ = writeln!(io::stderr(), "[ARS-LOG] session log write failed, disabling");
            self.writer = None;
        }
    }

    fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }
}

fn format_text_line(timestamp: &str, severity: Severity, message: &str) -> String {
    format!("[{timestamp}] [{}] {message}\n", severity.as_level())
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(
    rx: Receiver<ActivityEvent>,
    text_path: Option<PathBuf>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);
    let mut text = TextLog::open(text_path.as_deref());
    let mut sink = Sink::Primary;
    note_sink_change(&jsonl, &mut sink, &mut text);

    // The shared counter stays cumulative for the handle; only the delta is logged.
    let mut reported = 0u64;

    while let Ok(event) = rx.recv() {
        let total = dropped.load(Ordering::Relaxed);
        if total > reported {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!(
                "{} log events dropped due to back-pressure",
                total - reported
            ));
            reported = total;
            text.write(warn.severity, warn.details.as_deref().unwrap_or_default());
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        let entry = event_to_log_entry(&event);
        text.write(entry.severity, &text_message(&entry));
        jsonl.write_entry(&entry);
        note_sink_change(&jsonl, &mut sink, &mut text);
    }

    text.flush();
    jsonl.finish();
}

/// Mirror a JSONL sink downgrade into the text log once.
fn note_sink_change(jsonl: &JsonlWriter, last: &mut Sink, text: &mut TextLog) {
    let current = jsonl.sink();
    if current != *last {
        text.write(
            Severity::Warning,
            &format!("JSONL log moved to {} sink", current.as_str()),
        );
        *last = current;
    }
}

/// Text-log message: the entry's details, plus the error when present.
fn text_message(entry: &LogEntry) -> String {
    let details = entry.details.as_deref().unwrap_or_default();
    match (&entry.error_code, &entry.error_message) {
        (Some(code), Some(message)) => format!("{details} [{code}] {message}"),
        _ => details.to_string(),
    }
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            session_id,
            version,
            config_hash,
            directories,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!(
                "scan session {session_id} started (version {version}, config {config_hash}, directories: {})",
                directories.join(", ")
            ));
            e
        }
        ActivityEvent::TransportSelected {
            kind,
            fallback_reason,
        } => match fallback_reason {
            Some(reason) => {
                let mut e = LogEntry::new(EventType::TransportSelected, Severity::Warning);
                e.details = Some(format!("using {kind} transport (fallback: {reason})"));
                e
            }
            None => {
                let mut e = LogEntry::new(EventType::TransportSelected, Severity::Info);
                e.details = Some(format!("using {kind} transport"));
                e
            }
        },
        ActivityEvent::LogsPruned { removed } => {
            let mut e = LogEntry::new(EventType::LogsPruned, Severity::Info);
            e.details = Some(format!("pruned {removed} expired session log(s)"));
            e
        }
        ActivityEvent::ListsLoaded { allow, deny } => {
            let mut e = LogEntry::new(EventType::ListsLoaded, Severity::Info);
            e.details = Some(format!(
                "detection lists loaded: {allow} allow pattern(s), {deny} deny pattern(s)"
            ));
            e
        }
        ActivityEvent::ArtifactStarted {
            artifact,
            path,
            size_bytes,
            index,
            total,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactStart, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.path = Some(path.clone());
            e.size = Some(*size_bytes);
            e.details = Some(format!(
                "[{index}/{total}] processing {artifact} ({size_bytes} bytes)"
            ));
            e
        }
        ActivityEvent::Fingerprinted {
            artifact,
            fingerprint,
        } => {
            let mut e = LogEntry::new(EventType::Fingerprint, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.fingerprint = Some(fingerprint.clone());
            e.details = Some(format!("{artifact}: sha256 {fingerprint}"));
            e
        }
        ActivityEvent::LookupCompleted {
            artifact,
            fingerprint,
            status,
        } => {
            let mut e = LogEntry::new(EventType::LookupResult, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.fingerprint = Some(fingerprint.clone());
            e.details = Some(format!("{artifact}: lookup {status}"));
            e
        }
        ActivityEvent::RateLimited {
            artifact,
            retry,
            wait_secs,
        } => {
            let mut e = LogEntry::new(EventType::RateLimit, Severity::Warning);
            e.artifact = Some(artifact.clone());
            e.details = Some(format!(
                "{artifact}: rate limited, retry {retry} in {wait_secs}s"
            ));
            e
        }
        ActivityEvent::SandboxVerdicts { artifact, count } => {
            let mut e = LogEntry::new(EventType::Sandbox, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.details = Some(format!("{artifact}: {count} sandbox verdict(s)"));
            e
        }
        ActivityEvent::Classified {
            artifact,
            disposition,
            malicious,
            suspicious,
            total,
            infecting,
        } => {
            let mut e = LogEntry::new(EventType::Classification, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.disposition = Some(disposition.clone());
            e.malicious = Some(*malicious);
            e.suspicious = Some(*suspicious);
            e.total = Some(*total);
            e.details = Some(format!(
                "{artifact}: {malicious} malicious, {suspicious} suspicious of {total}; \
                 {infecting} infecting detection(s) -> {disposition}"
            ));
            e
        }
        ActivityEvent::UploadRouted {
            artifact,
            disposition,
            reason,
        } => {
            let severity = if disposition == "upload_failed" {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::Upload, severity);
            e.artifact = Some(artifact.clone());
            e.disposition = Some(disposition.clone());
            e.details = Some(format!("{artifact}: not found, {reason} -> {disposition}"));
            e
        }
        ActivityEvent::Relocated { artifact, from, to } => {
            let mut e = LogEntry::new(EventType::Relocation, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.path = Some(to.clone());
            e.details = Some(format!("{artifact}: moved {from} -> {to}"));
            e
        }
        ActivityEvent::ReportWritten { artifact, path } => {
            let mut e = LogEntry::new(EventType::Report, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.path = Some(path.clone());
            e.details = Some(format!("{artifact}: report written to {path}"));
            e
        }
        ActivityEvent::ArtifactCompleted {
            artifact,
            disposition,
            reason,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactComplete, Severity::Info);
            e.artifact = Some(artifact.clone());
            e.disposition = Some(disposition.clone());
            e.duration_ms = Some(*duration_ms);
            e.details = Some(match reason {
                Some(reason) => format!("{artifact}: {disposition} ({reason})"),
                None => format!("{artifact}: {disposition}"),
            });
            e
        }
        ActivityEvent::Error {
            artifact,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.artifact.clone_from(artifact);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.details = Some(match artifact {
                Some(a) => format!("{a}: error"),
                None => "error".to_string(),
            });
            e
        }
        ActivityEvent::SessionCompleted {
            processed,
            tally,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SessionComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!(
                "scan session complete: {processed} artifact(s) processed; {tally}"
            ));
            e
        }
        ActivityEvent::Shutdown => {
            let mut e = LogEntry::new(EventType::SessionComplete, Severity::Info);
            e.details = Some("logger shutdown".to_string());
            e
        }
    }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> DualLoggerConfig {
        DualLoggerConfig {
            text_path: Some(dir.join("test.log")),
            jsonl_config: JsonlConfig {
                path: dir.join("test.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_segments: 3,
            },
            channel_capacity: 64,
        }
    }

    fn started() -> ActivityEvent {
        ActivityEvent::SessionStarted {
            session_id: "20260101_000000".to_string(),
            version: "0.3.1".to_string(),
            config_hash: "abc".to_string(),
            directories: vec!["/downloads".to_string()],
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(started());
        handle.shutdown();
        join.join().unwrap();

        let contents = fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(contents.contains("session_start"));
        let text = fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert!(text.contains("] [INFO] scan session 20260101_000000 started"));
    }

    #[test]
    fn both_sinks_get_every_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();

        handle.send(started());
        handle.send(ActivityEvent::Classified {
            artifact: "app.apk".to_string(),
            disposition: "infected".to_string(),
            malicious: 4,
            suspicious: 1,
            total: 70,
            infecting: 3,
        });
        handle.send(ActivityEvent::Error {
            artifact: Some("other.apk".to_string()),
            code: "ARS-3002".to_string(),
            message: "permission denied".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let jsonl = fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(jsonl.lines().count(), 3);
        let classified: serde_json::Value =
            serde_json::from_str(jsonl.lines().nth(1).unwrap()).unwrap();
        assert_eq!(classified["disposition"], "infected");
        assert_eq!(classified["total"], 70);

        let text = fs::read_to_string(dir.path().join("test.log")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("[ERROR] other.apk: error [ARS-3002] permission denied"));
    }

    #[test]
    fn handles_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        let h2 = handle.clone();

        let worker = thread::spawn(move || {
            h2.send(ActivityEvent::LogsPruned { removed: 2 });
        });
        worker.join().unwrap();
        handle.send(ActivityEvent::ListsLoaded { allow: 1, deny: 0 });
        handle.shutdown();
        join.join().unwrap();

        let contents = fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn text_log_disabled_when_path_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.text_path = None;
        let (handle, join) = spawn_logger(config).unwrap();
        handle.send(ActivityEvent::LogsPruned { removed: 0 });
        handle.shutdown();
        join.join().unwrap();

        assert!(!dir.path().join("test.log").exists());
        assert!(dir.path().join("test.jsonl").exists());
    }

    #[test]
    fn dropped_count_stays_cumulative_after_being_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = bounded::<ActivityEvent>(1);
        let handle = ActivityLoggerHandle {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        handle.send(started());
        handle.send(ActivityEvent::LogsPruned { removed: 0 });
        handle.send(ActivityEvent::LogsPruned { removed: 1 });
        assert_eq!(handle.dropped_events(), 2);

        let config = test_config(dir.path());
        let counter = Arc::clone(&handle.dropped_events);
        let join = thread::spawn(move || {
            logger_thread_main(rx, config.text_path, config.jsonl_config, counter);
        });
        handle.shutdown();
        join.join().unwrap();

        assert_eq!(handle.dropped_events(), 2);
        let jsonl = fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(
            jsonl.matches("2 log events dropped due to back-pressure").count(),
            1
        );
        assert!(jsonl.contains("session_start"));
    }

    #[test]
    fn jsonl_downgrade_is_noted_in_text_log() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();
        let mut config = test_config(dir.path());
        config.jsonl_config.path = blocker.join("test.jsonl");
        config.jsonl_config.fallback_path = Some(dir.path().join("fallback.jsonl"));

        let (handle, join) = spawn_logger(config).unwrap();
        handle.send(started());
        handle.shutdown();
        join.join().unwrap();

        let text = fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(text.matches("JSONL log moved to fallback sink").count(), 1);
        let fallback = fs::read_to_string(dir.path().join("fallback.jsonl")).unwrap();
        assert!(fallback.contains("session_start"));
    }

    #[test]
    fn text_line_format() {
        assert_eq!(
            format_text_line("2026-01-01 12:00:00", Severity::Warning, "rate limited"),
            "[2026-01-01 12:00:00] [WARNING] rate limited\n"
        );
    }

    #[test]
    fn fallback_transport_is_a_warning() {
        let entry = event_to_log_entry(&ActivityEvent::TransportSelected {
            kind: "raw".to_string(),
            fallback_reason: Some("client init failed".to_string()),
        });
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.event, EventType::TransportSelected);
    }

    #[test]
    fn session_paths_share_the_session_id() {
        let cfg = DualLoggerConfig::for_session(
            Path::new("/logs"),
            "20260101_000000",
            &LoggingConfig::default(),
        );
        assert_eq!(
            cfg.text_path,
            Some(PathBuf::from("/logs/scan_session_20260101_000000.log"))
        );
        assert_eq!(
            cfg.jsonl_config.path,
            PathBuf::from("/logs/scan_session_20260101_000000.jsonl")
        );
    }
}
