//! Lookup-service transport: one contract, two implementations.
//!
//! [`managed::ManagedTransport`] drives a pooled `reqwest` client;
//! [`raw::RawTransport`] shells out to `curl`. [`select_transport`] probes
//! once at startup and callers only ever see `dyn ReputationTransport`.

#![allow(clippy::cast_precision_loss)]

pub mod managed;
pub mod raw;
pub mod response;
pub mod retry;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::core::config::{Config, TransportMode};
use crate::core::errors::{ArsError, Result};
use crate::transport::response::FileReport;

/// Which implementation served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process HTTP client.
    Managed,
    /// `curl` subprocess.
    Raw,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => f.write_str("managed"),
            Self::Raw => f.write_str("raw"),
        }
    }
}

/// Result of asking the lookup service about one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// HTTP 200 with a parseable report.
    Found(Box<FileReport>),
    /// HTTP 404.
    NotFound,
    /// HTTP 429.
    RateLimited,
    /// The request did not complete in time.
    Timeout,
    /// Any other status, network failure, or unparseable body.
    Error {
        /// Human-readable cause.
        detail: String,
    },
    /// Rate-limited on every attempt; the retry budget ran out.
    GaveUp {
        /// Total attempts made, including the first.
        attempts: u32,
    },
}

impl LookupOutcome {
    /// Short status name used in logs and reasons.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Error { .. } => "error",
            Self::GaveUp { .. } => "gave_up",
        }
    }
}

/// How file bytes are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRoute {
    /// One multipart POST to `{base}/files`.
    Direct,
    /// Fetch an upload URL first, then POST the bytes there.
    LargeUpload,
}

/// Result of submitting an artifact for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// HTTP 200/201. The handle is the analysis id when the service returned one.
    Accepted {
        /// Analysis identifier.
        handle: Option<String>,
    },
    /// Rejected or never delivered.
    Failed {
        /// Human-readable cause.
        detail: String,
    },
}

/// The lookup/submit contract shared by both transports.
pub trait ReputationTransport: Send + Sync {
    /// Which implementation this is.
    fn kind(&self) -> TransportKind;

    /// Query the service for `fingerprint`. Never panics; every failure is an outcome.
    fn lookup(&self, fingerprint: &str) -> LookupOutcome;

    /// Submit the file at `path` for analysis.
    fn submit(&self, path: &Path, route: SubmitRoute) -> SubmitOutcome;

    /// Counters shared with the session for end-of-run statistics.
    fn usage(&self) -> &UsageCounters;
}

// ──────────────────── usage counters ────────────────────

/// Per-run call counters.
#[derive(Debug, Default)]
pub struct UsageCounters {
    managed: AtomicU64,
    raw: AtomicU64,
    sandbox: AtomicU64,
    errors: AtomicU64,
    rate_limits: AtomicU64,
}

impl UsageCounters {
    /// Count one call made through `kind`.
    pub fn record_call(&self, kind: TransportKind) {
        let counter = match kind {
            TransportKind::Managed => &self.managed,
            TransportKind::Raw => &self.raw,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a lookup response that carried sandbox verdicts.
    pub fn record_sandbox(&self) {
        self.sandbox.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed call.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a rate-limited response.
    pub fn record_rate_limit(&self) {
        self.rate_limits.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a lookup outcome into the error/rate-limit counters.
    pub fn observe_lookup(&self, outcome: &LookupOutcome) {
        match outcome {
            LookupOutcome::RateLimited => self.record_rate_limit(),
            LookupOutcome::Timeout | LookupOutcome::Error { .. } => self.record_error(),
            _ => {}
        }
    }

    /// Fold a submission outcome into the error counter.
    pub fn observe_submit(&self, outcome: &SubmitOutcome) {
        if matches!(outcome, SubmitOutcome::Failed { .. }) {
            self.record_error();
        }
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            managed_calls: self.managed.load(Ordering::Relaxed),
            raw_calls: self.raw.load(Ordering::Relaxed),
            sandbox_analyses: self.sandbox.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            rate_limits: self.rate_limits.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`UsageCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Calls served by the managed client.
    pub managed_calls: u64,
    /// Calls served by curl.
    pub raw_calls: u64,
    /// Lookups that carried sandbox verdicts.
    pub sandbox_analyses: u64,
    /// Timeouts, transport errors, unexpected statuses, failed submissions.
    pub errors: u64,
    /// HTTP 429 responses.
    pub rate_limits: u64,
}

impl UsageSnapshot {
    /// Total calls across both transports.
    #[must_use]
    pub const fn total_calls(&self) -> u64 {
        self.managed_calls + self.raw_calls
    }

    /// Share of calls served by the managed client, in percent.
    #[must_use]
    pub fn managed_pct(&self) -> f64 {
        pct(self.managed_calls, self.total_calls())
    }

    /// Share of calls served by curl, in percent.
    #[must_use]
    pub fn raw_pct(&self) -> f64 {
        pct(self.raw_calls, self.total_calls())
    }
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

// ──────────────────── selection ────────────────────

/// Build the transport configured by `transport.mode`.
///
/// `auto` prefers the managed client and falls back to curl if the client
/// cannot be constructed. The fallback reason, if any, is returned so the
/// caller can log it.
pub fn select_transport(
    config: &Config,
    api_key: &str,
) -> Result<(Box<dyn ReputationTransport>, Option<String>)> {
    let usage = Arc::new(UsageCounters::default());
    match config.transport.mode {
        TransportMode::Managed => {
            let managed = managed::ManagedTransport::new(&config.api, api_key, usage)?;
            Ok((Box::new(managed), None))
        }
        TransportMode::Raw => {
            let raw = raw::RawTransport::new(&config.api, &config.transport, api_key, usage);
            raw.probe()?;
            Ok((Box::new(raw), None))
        }
        TransportMode::Auto => {
            match managed::ManagedTransport::new(&config.api, api_key, Arc::clone(&usage)) {
                Ok(managed) => Ok((Box::new(managed), None)),
                Err(managed_err) => {
                    let raw =
                        raw::RawTransport::new(&config.api, &config.transport, api_key, usage);
                    raw.probe().map_err(|raw_err| ArsError::TransportUnavailable {
                        details: format!("managed client: {managed_err}; curl: {raw_err}"),
                    })?;
                    Ok((Box::new(raw), Some(managed_err.to_string())))
                }
            }
        }
    }
}
