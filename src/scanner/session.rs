//! Scan session orchestrator.
//!
//! ```text
//! idle → enumerating
//!      → per artifact: fingerprinting → querying → classifying | routing
//!                      → relocating → reporting → paced wait
//!      → summarizing → done
//! ```
//!
//! Artifacts are processed one at a time. The only suspension points are the
//! rate-limit backoff and the pacing wait between artifacts. No per-artifact
//! failure ends the session; only missing credentials abort, and they do so
//! before enumeration.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle, DualLoggerConfig, spawn_logger};
use crate::logger::retention::prune_session_logs;
use crate::scanner::hasher;
use crate::scanner::lists::{DetectionLists, ListStore};
use crate::scanner::model::{Artifact, Disposition, ScanResult};
use crate::scanner::policy::ClassificationPolicy;
use crate::scanner::relocate::{Layout, Relocator};
use crate::scanner::report::{SessionReporter, SessionSummary};
use crate::scanner::router::DispositionRouter;
use crate::scanner::sandbox;
use crate::scanner::walker::{SkippedDir, WalkerConfig, enumerate};
use crate::transport::retry::{RetryPolicy, lookup_with_retry};
use crate::transport::{LookupOutcome, ReputationTransport, select_transport};

// ──────────────────── options & observer ────────────────────

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Replace `scan.directories` when non-empty.
    pub directories: Vec<PathBuf>,
    /// `--no-upload`.
    pub no_upload: bool,
    /// Replace `scan.pacing_secs`.
    pub pacing_secs: Option<u64>,
}

/// Progress callbacks for a front end. Every method defaults to a no-op.
pub trait SessionObserver: Sync {
    fn on_start(&self, _session_id: &str, _candidates: usize) {}
    fn on_artifact_start(&self, _index: usize, _total: usize, _artifact: &Artifact) {}
    fn on_backoff(&self, _artifact: &Artifact, _retry: u32, _wait: Duration) {}
    fn on_artifact_done(&self, _result: &ScanResult) {}
    fn on_pacing(&self, _wait: Duration) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl SessionObserver for SilentObserver {}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub summary: SessionSummary,
    pub results: Vec<ScanResult>,
    pub skipped_dirs: Vec<SkippedDir>,
    pub transport_fallback: Option<String>,
    pub summary_path: PathBuf,
    pub failed_path: Option<PathBuf>,
    pub log_path: PathBuf,
    pub dropped_log_events: u64,
}

// ──────────────────── entry points ────────────────────

/// Run a full session with the configured transport.
///
/// # Errors
/// [`crate::core::errors::ArsError::MissingCredentials`] before anything is
/// enumerated when no API key is configured; transport construction errors;
/// output directories that cannot be created.
pub fn run_scan(
    config: &Config,
    options: &ScanOptions,
    observer: &dyn SessionObserver,
) -> Result<SessionOutcome> {
    let api_key = config.api_key()?;
    let (transport, fallback) = select_transport(config, &api_key)?;
    let mut outcome = run_scan_with(
        config,
        transport.as_ref(),
        fallback.as_deref(),
        options,
        observer,
    )?;
    outcome.transport_fallback = fallback;
    Ok(outcome)
}

/// Run a full session against an already-built transport.
///
/// # Errors
/// Output directories that cannot be created, an invalid keyword policy, or a
/// logger thread that cannot be spawned.
pub fn run_scan_with(
    config: &Config,
    transport: &dyn ReputationTransport,
    transport_fallback: Option<&str>,
    options: &ScanOptions,
    observer: &dyn SessionObserver,
) -> Result<SessionOutcome> {
    let started = Instant::now();
    let layout = Layout::from_config(&config.layout);
    layout.ensure_dirs()?;
    let policy = ClassificationPolicy::from_config(&config.policy)?;

    let session_id = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_config = DualLoggerConfig::for_session(&layout.logs, &session_id, &config.logging);
    let log_path = log_config
        .text_path
        .clone()
        .unwrap_or_else(|| log_config.jsonl_config.path.clone());
    let (logger, logger_thread) = spawn_logger(log_config)?;

    let mut walker = WalkerConfig::from_scan(&config.scan);
    if !options.directories.is_empty() {
        walker.directories.clone_from(&options.directories);
    }

    logger.send(ActivityEvent::SessionStarted {
        session_id: session_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash: config.stable_hash().unwrap_or_else(|_| "unavailable".to_string()),
        directories: walker
            .directories
            .iter()
            .map(|d| d.display().to_string())
            .collect(),
    });
    logger.send(ActivityEvent::TransportSelected {
        kind: transport.kind().to_string(),
        fallback_reason: transport_fallback.map(str::to_string),
    });

    match prune_session_logs(&layout.logs, config.logging.retention_days) {
        Ok(removed) => logger.send(ActivityEvent::LogsPruned { removed }),
        Err(e) => send_error(&logger, None, &e),
    }

    let lists = load_lists_for_scan(config, &logger);

    let enumeration = enumerate(&walker);
    for skipped in &enumeration.skipped {
        logger.send(ActivityEvent::Error {
            artifact: None,
            code: "ARS-3002".to_string(),
            message: format!("skipping {}: {}", skipped.path.display(), skipped.reason),
        });
    }

    let reporter = SessionReporter::new(
        &layout.reports,
        &session_id,
        Some(transport.kind().to_string()),
    );
    let pacing = Duration::from_secs(options.pacing_secs.unwrap_or(config.scan.pacing_secs));
    let session = ScanSession {
        config,
        transport,
        policy,
        lists,
        router: DispositionRouter::new(&config.upload, options.no_upload),
        retry: RetryPolicy::from_config(&config.retry),
        relocator: Relocator::new(layout.clone(), Some(logger.clone())),
        reporter: &reporter,
        logger: &logger,
    };

    observer.on_start(&session_id, enumeration.artifacts.len());
    let total = enumeration.artifacts.len();
    let mut results = Vec::with_capacity(total);
    for (i, artifact) in enumeration.artifacts.into_iter().enumerate() {
        results.push(session.process(artifact, i + 1, total, observer));
        if i + 1 < total && !pacing.is_zero() {
            observer.on_pacing(pacing);
            thread::sleep(pacing);
        }
    }

    let summary = match reporter.finish(transport.usage().snapshot(), layout.organized_snapshot()) {
        Ok(summary) => summary,
        Err(e) => {
            send_error(&logger, None, &e);
            // The in-memory summary is still complete.
            reporter.snapshot()
        }
    };
    logger.send(ActivityEvent::SessionCompleted {
        processed: results.len(),
        tally: summary.counts.to_string(),
        duration_ms: elapsed_ms(started),
    });
    let dropped_log_events = logger.dropped_events();
    logger.shutdown();
    join_logger(logger_thread);

    let failed_path = reporter
        .failed_path()
        .exists()
        .then(|| reporter.failed_path().to_path_buf());
    Ok(SessionOutcome {
        summary,
        results,
        skipped_dirs: enumeration.skipped,
        transport_fallback: transport_fallback.map(str::to_string),
        summary_path: reporter.summary_path().to_path_buf(),
        failed_path,
        log_path,
        dropped_log_events,
    })
}

/// Lists for a scan. A corrupt file is logged and treated as empty.
fn load_lists_for_scan(config: &Config, logger: &ActivityLoggerHandle) -> DetectionLists {
    match ListStore::open(&config.lists) {
        Ok(store) => {
            let lists = store.into_lists();
            logger.send(ActivityEvent::ListsLoaded {
                allow: lists.allow.len(),
                deny: lists.deny.len(),
            });
            lists
        }
        Err(e) => {
            send_error(logger, None, &e);
            DetectionLists::default()
        }
    }
}

// ──────────────────── per-artifact pipeline ────────────────────

struct ScanSession<'a> {
    config: &'a Config,
    transport: &'a dyn ReputationTransport,
    policy: ClassificationPolicy,
    lists: DetectionLists,
    router: DispositionRouter,
    retry: RetryPolicy,
    relocator: Relocator,
    reporter: &'a SessionReporter,
    logger: &'a ActivityLoggerHandle,
}

impl ScanSession<'_> {
    fn process(
        &self,
        mut artifact: Artifact,
        index: usize,
        total: usize,
        observer: &dyn SessionObserver,
    ) -> ScanResult {
        let started = Instant::now();
        self.logger.send(ActivityEvent::ArtifactStarted {
            artifact: artifact.name.clone(),
            path: artifact.path.display().to_string(),
            size_bytes: artifact.size_bytes,
            index,
            total,
        });
        observer.on_artifact_start(index, total, &artifact);

        let mut result = self.evaluate(&mut artifact, observer);

        match self.relocator.relocate(&artifact, result.disposition) {
            Ok(final_path) => result.final_path = final_path,
            Err(e) => result.errors.push(e.to_string()),
        }
        result.finished_at = Utc::now();

        let report_path = match self.reporter.write_artifact_report(&result) {
            Ok(path) => {
                self.logger.send(ActivityEvent::ReportWritten {
                    artifact: result.artifact.clone(),
                    path: path.display().to_string(),
                });
                Some(path)
            }
            Err(e) => {
                send_error(self.logger, Some(&result.artifact), &e);
                result.errors.push(e.to_string());
                None
            }
        };
        if let Err(e) = self.reporter.record(&result, report_path) {
            send_error(self.logger, Some(&result.artifact), &e);
        }

        self.logger.send(ActivityEvent::ArtifactCompleted {
            artifact: result.artifact.clone(),
            disposition: result.disposition.to_string(),
            reason: result.reason.clone(),
            duration_ms: elapsed_ms(started),
        });
        observer.on_artifact_done(&result);
        result
    }

    /// Fingerprint, look up, and decide a disposition.
    fn evaluate(&self, artifact: &mut Artifact, observer: &dyn SessionObserver) -> ScanResult {
        let digest = match hasher::fingerprint(artifact.path()) {
            Ok(digest) => digest,
            Err(e) => {
                send_error(self.logger, Some(&artifact.name), &e);
                let mut result = ScanResult::begin(artifact, Disposition::Unknown)
                    .with_reason("fingerprint_failed");
                result.errors.push(e.to_string());
                return result;
            }
        };
        artifact.assign_fingerprint(digest.clone());
        self.logger.send(ActivityEvent::Fingerprinted {
            artifact: artifact.name.clone(),
            fingerprint: digest.clone(),
        });

        let outcome = lookup_with_retry(self.transport, &digest, self.retry, |retry, wait| {
            self.logger.send(ActivityEvent::RateLimited {
                artifact: artifact.name.clone(),
                retry,
                wait_secs: wait.as_secs(),
            });
            observer.on_backoff(artifact, retry, wait);
        });
        self.logger.send(ActivityEvent::LookupCompleted {
            artifact: artifact.name.clone(),
            fingerprint: digest.clone(),
            status: outcome.status().to_string(),
        });

        match outcome {
            LookupOutcome::Found(report) => {
                let sandbox = sandbox::extract(&report.raw, self.transport.usage());
                if !sandbox.is_empty() {
                    self.logger.send(ActivityEvent::SandboxVerdicts {
                        artifact: artifact.name.clone(),
                        count: sandbox.len(),
                    });
                }
                let classification =
                    self.policy
                        .classify(&report.stats, &report.verdicts, &self.lists);
                let infecting = classification.infecting_count();
                let mut result = ScanResult::begin(artifact, classification.disposition);
                result.record_stats(&report.stats);
                result.detections = classification.detections;
                result.sandbox = sandbox;
                result.report_link = Some(self.config.api.gui_link(&digest));
                self.logger.send(ActivityEvent::Classified {
                    artifact: artifact.name.clone(),
                    disposition: result.disposition.to_string(),
                    malicious: result.malicious,
                    suspicious: result.suspicious,
                    total: result.total,
                    infecting,
                });
                result
            }
            LookupOutcome::NotFound => {
                let routed = self
                    .router
                    .route(self.transport, artifact.path(), artifact.size_bytes);
                self.logger.send(ActivityEvent::UploadRouted {
                    artifact: artifact.name.clone(),
                    disposition: routed.disposition.to_string(),
                    reason: routed.reason.clone(),
                });
                let mut result =
                    ScanResult::begin(artifact, routed.disposition).with_reason(routed.reason);
                if routed.disposition == Disposition::Pending {
                    result.report_link = Some(self.config.api.gui_link(&digest));
                }
                result.submission_handle = routed.handle;
                result
            }
            LookupOutcome::Timeout => {
                ScanResult::begin(artifact, Disposition::Unknown).with_reason("lookup_timeout")
            }
            LookupOutcome::Error { detail } => {
                let mut result =
                    ScanResult::begin(artifact, Disposition::Unknown).with_reason("lookup_error");
                result.errors.push(detail);
                result
            }
            LookupOutcome::GaveUp { attempts } => {
                let mut result = ScanResult::begin(artifact, Disposition::Unknown)
                    .with_reason("rate_limit_gave_up");
                result
                    .errors
                    .push(format!("rate limited on all {attempts} attempts"));
                result
            }
            LookupOutcome::RateLimited => {
                ScanResult::begin(artifact, Disposition::Unknown).with_reason("rate_limited")
            }
        }
    }
}

fn send_error(
    logger: &ActivityLoggerHandle,
    artifact: Option<&str>,
    err: &crate::core::errors::ArsError,
) {
    logger.send(ActivityEvent::Error {
        artifact: artifact.map(str::to_string),
        code: err.code().to_string(),
        message: err.to_string(),
    });
}

/// Wait for the logger thread. A panic there is reported, never propagated.
fn join_logger(logger_thread: thread::JoinHandle<()>) -> bool {
    let clean = logger_thread.join().is_ok();
    if !clean {
        let _ = writeln!(
            io::stderr(),
            "[ARS-LOG] logger thread panicked; session log may be incomplete"
        );
    }
    clean
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
