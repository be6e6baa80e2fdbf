//! Per-artifact text reports, the session JSON summary, and the failed list.
//!
//! All three live in the reports directory:
//!
//! ```text
//! <artifact>_<YYYYmmdd_HHMMSS>.txt   one per artifact
//! session_<id>.json                  rewritten after every artifact
//! failed_<id>.txt                    appended for unknown / upload_failed
//! ```

#![allow(missing_docs)]

use std::fmt::{self, Write as _};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::{ArsError, Result};
use crate::core::paths::{collision_free_path, write_atomic};
use crate::scanner::model::{Disposition, EngineCategory, JudgedDetection, ScanResult};
use crate::scanner::relocate::DirCount;
use crate::transport::UsageSnapshot;

const RULE_WIDE: usize = 50;
const RULE_SECTION: usize = 40;
const RULE_DETECTIONS: usize = 30;

// ──────────────────── tally ────────────────────

/// Running count of artifacts per disposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub clean: usize,
    pub infected: usize,
    pub too_large: usize,
    pub pending: usize,
    pub upload_failed: usize,
    pub unknown: usize,
}

impl Tally {
    pub fn record(&mut self, disposition: Disposition) {
        *self.slot(disposition) += 1;
    }

    #[must_use]
    pub const fn get(&self, disposition: Disposition) -> usize {
        match disposition {
            Disposition::Clean => self.clean,
            Disposition::Infected => self.infected,
            Disposition::TooLarge => self.too_large,
            Disposition::Pending => self.pending,
            Disposition::UploadFailed => self.upload_failed,
            Disposition::Unknown => self.unknown,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.clean + self.infected + self.too_large + self.pending + self.upload_failed + self.unknown
    }

    /// Artifacts that ended on the failed list.
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.upload_failed + self.unknown
    }

    fn slot(&mut self, disposition: Disposition) -> &mut usize {
        match disposition {
            Disposition::Clean => &mut self.clean,
            Disposition::Infected => &mut self.infected,
            Disposition::TooLarge => &mut self.too_large,
            Disposition::Pending => &mut self.pending,
            Disposition::UploadFailed => &mut self.upload_failed,
            Disposition::Unknown => &mut self.unknown,
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Disposition::ALL
            .iter()
            .map(|d| format!("{d}={}", self.get(*d)))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

// ──────────────────── session summary ────────────────────

/// Compact per-artifact record folded into the session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub artifact: String,
    pub fingerprint: Option<String>,
    pub disposition: Disposition,
    pub reason: Option<String>,
    pub malicious: u64,
    pub suspicious: u64,
    pub total: u64,
    pub final_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl ArtifactRecord {
    fn from_result(result: &ScanResult, report_path: Option<PathBuf>) -> Self {
        Self {
            artifact: result.artifact.clone(),
            fingerprint: result.fingerprint.clone(),
            disposition: result.disposition,
            reason: result.reason.clone(),
            malicious: result.malicious,
            suspicious: result.suspicious,
            total: result.total,
            final_path: result.final_path.clone(),
            report_path,
            errors: result.errors.clone(),
            finished_at: result.finished_at,
        }
    }
}

/// The structured summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transport: Option<String>,
    pub counts: Tally,
    pub usage: UsageSnapshot,
    pub organized: Vec<DirCount>,
    pub artifacts: Vec<ArtifactRecord>,
}

// ──────────────────── reporter ────────────────────

/// Writes the report artifacts of one session.
///
/// The summary sits behind a lock so concurrent callers serialize their
/// rewrites of `session_<id>.json` and appends to `failed_<id>.txt`.
pub struct SessionReporter {
    reports_dir: PathBuf,
    summary_path: PathBuf,
    failed_path: PathBuf,
    summary: Mutex<SessionSummary>,
}

impl SessionReporter {
    pub fn new(reports_dir: &Path, session_id: &str, transport: Option<String>) -> Self {
        Self {
            reports_dir: reports_dir.to_path_buf(),
            summary_path: reports_dir.join(format!("session_{session_id}.json")),
            failed_path: reports_dir.join(format!("failed_{session_id}.txt")),
            summary: Mutex::new(SessionSummary {
                session_id: session_id.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                started_at: Utc::now(),
                finished_at: None,
                transport,
                counts: Tally::default(),
                usage: UsageSnapshot::default(),
                organized: Vec::new(),
                artifacts: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    #[must_use]
    pub fn failed_path(&self) -> &Path {
        &self.failed_path
    }

    /// Write the human-readable report for `result`.
    ///
    /// # Errors
    /// [`ArsError::Io`] if the report file cannot be written.
    pub fn write_artifact_report(&self, result: &ScanResult) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let file_name = format!("{}_{stamp}.txt", result.artifact);
        let path = collision_free_path(&self.reports_dir, &file_name, "dup");
        write_atomic(&path, render_text_report(result).as_bytes())
            .map_err(|e| ArsError::io(&path, e))?;
        Ok(path)
    }

    /// Fold `result` into the summary and persist it; failures also go to the
    /// failed list.
    ///
    /// # Errors
    /// [`ArsError::Io`] or [`ArsError::Serialization`] if either file cannot be
    /// written. The in-memory summary is updated regardless.
    pub fn record(&self, result: &ScanResult, report_path: Option<PathBuf>) -> Result<()> {
        let mut summary = self.summary.lock();
        summary.counts.record(result.disposition);
        summary
            .artifacts
            .push(ArtifactRecord::from_result(result, report_path));
        let failed = if result.disposition.is_failure() {
            self.append_failed(result)
        } else {
            Ok(())
        };
        let persisted = self.persist(&summary);
        failed.and(persisted)
    }

    /// Stamp the end of the run with usage and directory counts, then persist.
    ///
    /// # Errors
    /// As for [`Self::record`].
    pub fn finish(&self, usage: UsageSnapshot, organized: Vec<DirCount>) -> Result<SessionSummary> {
        let mut summary = self.summary.lock();
        summary.finished_at = Some(Utc::now());
        summary.usage = usage;
        summary.organized = organized;
        self.persist(&summary)?;
        Ok(summary.clone())
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        self.summary.lock().counts
    }

    /// Copy of the summary as it stands.
    #[must_use]
    pub fn snapshot(&self) -> SessionSummary {
        self.summary.lock().clone()
    }

    fn persist(&self, summary: &SessionSummary) -> Result<()> {
        let mut json =
            serde_json::to_string_pretty(summary).map_err(|e| ArsError::Serialization {
                context: "session summary",
                details: e.to_string(),
            })?;
        json.push('\n');
        write_atomic(&self.summary_path, json.as_bytes())
            .map_err(|e| ArsError::io(&self.summary_path, e))
    }

    fn append_failed(&self, result: &ScanResult) -> Result<()> {
        if let Some(parent) = self.failed_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArsError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failed_path)
            .map_err(|e| ArsError::io(&self.failed_path, e))?;
        let line = match &result.reason {
            Some(reason) => format!("{}\t{}\t{reason}\n", result.artifact, result.disposition),
            None => format!("{}\t{}\n", result.artifact, result.disposition),
        };
        file.write_all(line.as_bytes())
            .map_err(|e| ArsError::io(&self.failed_path, e))
    }
}

// ──────────────────── text report ────────────────────

/// Render the per-artifact report.
#[must_use]
pub fn render_text_report(result: &ScanResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Artifact Reputation Scan Result - arscan {}",
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDE));
    let _ = writeln!(out);
    let _ = writeln!(out, "File: {}", result.artifact);
    let _ = writeln!(
        out,
        "Scan Date: {}",
        result
            .finished_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "File Hash: {}",
        result.fingerprint.as_deref().unwrap_or("unavailable")
    );
    let _ = writeln!(out, "File Size: {} bytes", result.size_bytes);
    let _ = writeln!(
        out,
        "Category: {}",
        result.disposition.as_str().to_uppercase()
    );
    let _ = writeln!(
        out,
        "Detection: {} malicious, {} suspicious out of {} vendors",
        result.malicious, result.suspicious, result.total
    );
    if let Some(reason) = &result.reason {
        let _ = writeln!(out, "Reason: {reason}");
    }
    if let Some(handle) = &result.submission_handle {
        let _ = writeln!(out, "Analysis ID: {handle}");
    }
    if let Some(link) = &result.report_link {
        let _ = writeln!(out, "Report Link: {link}");
    }
    if let Some(path) = &result.final_path {
        let _ = writeln!(out, "Location: {}", path.display());
    }
    for error in &result.errors {
        let _ = writeln!(out, "Error: {error}");
    }

    if !result.sandbox.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "SANDBOX BEHAVIORAL ANALYSIS:");
        let _ = writeln!(out, "{}", "-".repeat(RULE_SECTION));
        for verdict in &result.sandbox {
            let _ = writeln!(out, "{}:", verdict.sandbox_name);
            let _ = writeln!(out, "  Category: {}", verdict.category);
            if let Some(confidence) = verdict.confidence {
                let _ = writeln!(out, "  Confidence: {confidence}%");
            }
            if !verdict.malware_names.is_empty() {
                let _ = writeln!(out, "  Malware Names: {}", verdict.malware_names.join(", "));
            }
            if !verdict.malware_classification.is_empty() {
                let _ = writeln!(
                    out,
                    "  Classification: {}",
                    verdict.malware_classification.join(", ")
                );
            }
        }
    }

    write_bucket(
        &mut out,
        "MALICIOUS DETECTIONS:",
        &result.detections,
        EngineCategory::Malicious,
    );
    write_bucket(
        &mut out,
        "SUSPICIOUS DETECTIONS:",
        &result.detections,
        EngineCategory::Suspicious,
    );
    out
}

fn write_bucket(
    out: &mut String,
    title: &str,
    detections: &[JudgedDetection],
    category: EngineCategory,
) {
    let mut bucket = detections
        .iter()
        .filter(|d| d.verdict.category == category)
        .peekable();
    if bucket.peek().is_none() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(RULE_DETECTIONS));
    for d in bucket {
        let v = &d.verdict;
        if category == EngineCategory::Malicious {
            let _ = writeln!(
                out,
                "{}: {} ({}) - {}",
                v.engine,
                v.effective_label(),
                v.effective_method(),
                d.judgement
            );
        } else {
            let _ = writeln!(out, "{}: {} - {}", v.engine, v.effective_label(), d.judgement);
        }
    }
}

// ──────────────────── tests ────────────────────
