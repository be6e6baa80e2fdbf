//! Domain records shared by every pipeline stage.
//!
//! An [`Artifact`] is discovered by enumeration, gets its fingerprint exactly
//! once, and ends its pass as one immutable [`ScanResult`].

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label shown for a malicious-bucket detection that carries no label.
pub const PLACEHOLDER_MALICIOUS_LABEL: &str = "Generic detection";
/// Label shown for a suspicious-bucket detection that carries no label.
pub const PLACEHOLDER_SUSPICIOUS_LABEL: &str = "Suspicious behavior";
/// Method shown when an engine does not report one.
pub const DEFAULT_DETECTION_METHOD: &str = "Static analysis";

// ──────────────────── artifact ────────────────────

/// One candidate package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    fingerprint: Option<String>,
}

impl Artifact {
    #[must_use]
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            path,
            name,
            size_bytes,
            fingerprint: None,
        }
    }

    /// Record the content digest. Returns `false` (and keeps the first
    /// digest) if one was already assigned.
    pub fn assign_fingerprint(&mut self, digest: String) -> bool {
        if self.fingerprint.is_some() {
            return false;
        }
        self.fingerprint = Some(digest);
        true
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ──────────────────── engine verdicts ────────────────────

/// Category an engine assigned to the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineCategory {
    Malicious,
    Suspicious,
    Harmless,
    Undetected,
}

impl EngineCategory {
    /// Parse the lookup service's category string. Unrecognized categories
    /// (`type-unsupported`, `timeout`, ...) yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "malicious" => Some(Self::Malicious),
            "suspicious" => Some(Self::Suspicious),
            "harmless" => Some(Self::Harmless),
            "undetected" => Some(Self::Undetected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malicious => "malicious",
            Self::Suspicious => "suspicious",
            Self::Harmless => "harmless",
            Self::Undetected => "undetected",
        }
    }

    /// Only flagging categories are collected as detections.
    #[must_use]
    pub const fn is_flagging(self) -> bool {
        matches!(self, Self::Malicious | Self::Suspicious)
    }
}

impl fmt::Display for EngineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single engine's detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVerdict {
    pub engine: String,
    pub category: EngineCategory,
    /// Free-text detection label; may be empty.
    pub label: String,
    pub method: Option<String>,
}

impl EngineVerdict {
    #[must_use]
    pub fn new(engine: impl Into<String>, category: EngineCategory, label: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            category,
            label: label.into(),
            method: None,
        }
    }

    /// Label with the bucket placeholder substituted for an empty one.
    #[must_use]
    pub fn effective_label(&self) -> &str {
        let trimmed = self.label.trim();
        if !trimmed.is_empty() {
            return trimmed;
        }
        match self.category {
            EngineCategory::Suspicious => PLACEHOLDER_SUSPICIOUS_LABEL,
            _ => PLACEHOLDER_MALICIOUS_LABEL,
        }
    }

    #[must_use]
    pub fn effective_method(&self) -> &str {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_DETECTION_METHOD)
    }

    /// The `"<engine>: <label>"` string list patterns are matched against.
    #[must_use]
    pub fn detection_string(&self) -> String {
        format!("{}: {}", self.engine, self.effective_label())
    }
}

/// Aggregate per-category engine counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    #[serde(default)]
    pub malicious: u64,
    #[serde(default)]
    pub suspicious: u64,
    #[serde(default)]
    pub harmless: u64,
    #[serde(default)]
    pub undetected: u64,
    /// Remaining counters (`timeout`, `type-unsupported`, ...).
    #[serde(flatten)]
    pub other: BTreeMap<String, u64>,
}

impl AnalysisStats {
    /// Number of engines that reported anything at all.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.other.values().fold(
            self.malicious + self.suspicious + self.harmless + self.undetected,
            |acc, n| acc.saturating_add(*n),
        )
    }

    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.malicious == 0 && self.suspicious == 0
    }
}

// ──────────────────── sandbox ────────────────────

/// Behavioral-analysis verdict from one sandbox. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxVerdict {
    /// Key under which the lookup service reported this sandbox.
    pub sandbox: String,
    pub sandbox_name: String,
    pub category: String,
    /// Confidence percentage, when reported.
    pub confidence: Option<u32>,
    pub malware_names: Vec<String>,
    pub malware_classification: Vec<String>,
}

// ──────────────────── classification ────────────────────

/// How one detection was judged by the classification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgement {
    /// Matched an allow-list pattern; ignored.
    Allowed,
    /// Matched a deny-list pattern; infecting, evaluation stopped.
    Denied,
    /// Label carries a malicious-family keyword.
    Malicious,
    /// Label carries only a safe-class keyword.
    Safe,
    /// Label matched neither keyword set; fails closed.
    Ambiguous,
    /// Evaluation stopped at an earlier deny-list match.
    NotEvaluated,
}

impl Judgement {
    /// Whether this detection counts toward an infected disposition.
    #[must_use]
    pub const fn is_infecting(self) -> bool {
        matches!(self, Self::Denied | Self::Malicious | Self::Ambiguous)
    }

    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::Denied => "DENIED",
            Self::Malicious => "MALICIOUS",
            Self::Safe => "SAFE",
            Self::Ambiguous => "AMBIGUOUS",
            Self::NotEvaluated => "NOT EVALUATED",
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// An engine verdict together with the policy's judgement of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgedDetection {
    #[serde(flatten)]
    pub verdict: EngineVerdict,
    pub judgement: Judgement,
}

// ──────────────────── disposition ────────────────────

/// Final routing decision for one artifact. Exactly one per artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Clean,
    Infected,
    TooLarge,
    Pending,
    UploadFailed,
    Unknown,
}

impl Disposition {
    pub const ALL: [Self; 6] = [
        Self::Clean,
        Self::Infected,
        Self::TooLarge,
        Self::Pending,
        Self::UploadFailed,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::TooLarge => "too_large",
            Self::Pending => "pending",
            Self::UploadFailed => "upload_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Outcomes that land the artifact on the failed-items list.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::UploadFailed | Self::Unknown)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── scan result ────────────────────

/// Outcome of one artifact's pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub artifact: String,
    pub source_path: PathBuf,
    /// Where the artifact ended up; `None` when it stayed put.
    pub final_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub fingerprint: Option<String>,
    pub disposition: Disposition,
    /// Short machine-readable cause for non-verdict dispositions
    /// (`rate_limit_gave_up`, `upload_disabled`, `exceeds_upload_limit`, ...).
    pub reason: Option<String>,
    pub malicious: u64,
    pub suspicious: u64,
    pub total: u64,
    pub detections: Vec<JudgedDetection>,
    pub sandbox: Vec<SandboxVerdict>,
    /// Analysis handle returned by a successful submission.
    pub submission_handle: Option<String>,
    pub report_link: Option<String>,
    /// Non-fatal problems hit while relocating or reporting.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanResult {
    /// Fresh result for `artifact` with no verdict yet.
    #[must_use]
    pub fn begin(artifact: &Artifact, disposition: Disposition) -> Self {
        let now = Utc::now();
        Self {
            artifact: artifact.name.clone(),
            source_path: artifact.path.clone(),
            final_path: None,
            size_bytes: artifact.size_bytes,
            fingerprint: artifact.fingerprint().map(str::to_string),
            disposition,
            reason: None,
            malicious: 0,
            suspicious: 0,
            total: 0,
            detections: Vec::new(),
            sandbox: Vec::new(),
            submission_handle: None,
            report_link: None,
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Copy aggregate counts from lookup stats.
    pub fn record_stats(&mut self, stats: &AnalysisStats) {
        self.malicious = stats.malicious;
        self.suspicious = stats.suspicious;
        self.total = stats.total();
    }
}
