//! Integration tests: full-pipeline scenarios against a scripted transport,
//! and CLI smoke tests against the built binary.

mod common;

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use artifact_reputation_scanner::core::config::{Config, LayoutConfig};
use artifact_reputation_scanner::scanner::model::{
    AnalysisStats, Artifact, Disposition, EngineCategory, EngineVerdict, Judgement, ScanResult,
};
use artifact_reputation_scanner::scanner::session::{
    ScanOptions, SessionObserver, SessionOutcome, SilentObserver, run_scan_with,
};
use artifact_reputation_scanner::transport::response::FileReport;
use artifact_reputation_scanner::transport::{
    LookupOutcome, ReputationTransport, SubmitOutcome, SubmitRoute, TransportKind, UsageCounters,
};

// ──────────────────── scripted transport ────────────────────

struct ScriptedTransport {
    lookups: Mutex<VecDeque<LookupOutcome>>,
    accept_uploads: bool,
    submissions: Mutex<Vec<SubmitRoute>>,
    usage: UsageCounters,
}

impl ScriptedTransport {
    fn new(lookups: Vec<LookupOutcome>) -> Self {
        Self {
            lookups: Mutex::new(lookups.into()),
            accept_uploads: true,
            submissions: Mutex::new(Vec::new()),
            usage: UsageCounters::default(),
        }
    }

    fn rejecting_uploads(mut self) -> Self {
        self.accept_uploads = false;
        self
    }

    fn submissions(&self) -> Vec<SubmitRoute> {
        self.submissions.lock().clone()
    }
}

impl ReputationTransport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Managed
    }

    fn lookup(&self, _fingerprint: &str) -> LookupOutcome {
        self.usage.record_call(TransportKind::Managed);
        let outcome = self
            .lookups
            .lock()
            .pop_front()
            .unwrap_or(LookupOutcome::NotFound);
        self.usage.observe_lookup(&outcome);
        outcome
    }

    fn submit(&self, _path: &Path, route: SubmitRoute) -> SubmitOutcome {
        self.usage.record_call(TransportKind::Managed);
        self.submissions.lock().push(route);
        let outcome = if self.accept_uploads {
            SubmitOutcome::Accepted {
                handle: Some("analysis-123".to_string()),
            }
        } else {
            SubmitOutcome::Failed {
                detail: "HTTP 500: boom".to_string(),
            }
        };
        self.usage.observe_submit(&outcome);
        outcome
    }

    fn usage(&self) -> &UsageCounters {
        &self.usage
    }
}

#[derive(Default)]
struct RecordingObserver {
    backoffs: Mutex<Vec<u32>>,
    done: Mutex<Vec<Disposition>>,
}

impl SessionObserver for RecordingObserver {
    fn on_backoff(&self, _artifact: &Artifact, retry: u32, _wait: Duration) {
        self.backoffs.lock().push(retry);
    }

    fn on_artifact_done(&self, result: &ScanResult) {
        self.done.lock().push(result.disposition);
    }
}

// ──────────────────── fixtures ────────────────────

fn sandbox_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.scan.directories = vec![root.join("in")];
    config.scan.pacing_secs = 0;
    config.retry.rate_limit_wait_secs = 0;
    config.upload.direct_max_bytes = 100;
    config.upload.max_bytes = 500;
    config.layout = LayoutConfig {
        base_dir: root.join("out"),
        ..LayoutConfig::default()
    };
    config.lists.allow_file = root.join("lists/allow.json");
    config.lists.deny_file = root.join("lists/deny.json");
    config
}

fn write_artifact(root: &Path, name: &str, size: usize) {
    let dir = root.join("in");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), vec![b'a'; size]).unwrap();
}

fn write_list(root: &Path, file: &str, patterns: &[&str]) {
    let dir = root.join("lists");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), serde_json::to_string(patterns).unwrap()).unwrap();
}

fn found(malicious: u64, suspicious: u64, verdicts: Vec<EngineVerdict>) -> LookupOutcome {
    LookupOutcome::Found(Box::new(FileReport {
        stats: AnalysisStats {
            malicious,
            suspicious,
            undetected: 60,
            ..AnalysisStats::default()
        },
        verdicts,
        raw: json!({}),
    }))
}

fn trojan() -> EngineVerdict {
    EngineVerdict::new("EngineX", EngineCategory::Malicious, "Trojan.Generic")
}

fn scan(config: &Config, transport: &ScriptedTransport, options: &ScanOptions) -> SessionOutcome {
    run_scan_with(config, transport, None, options, &SilentObserver).unwrap()
}

fn only_result(outcome: &SessionOutcome) -> &ScanResult {
    assert_eq!(outcome.results.len(), 1, "expected exactly one result");
    &outcome.results[0]
}

// ──────────────────── pipeline scenarios ────────────────────

#[test]
fn quiet_stats_are_clean_without_engine_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "quiet.apk", 32);
    let transport = ScriptedTransport::new(vec![found(0, 0, vec![])]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Clean);
    assert!(
        result
            .detections
            .iter()
            .all(|d| d.judgement == Judgement::NotEvaluated)
    );
    let moved = result.final_path.as_ref().unwrap();
    assert!(moved.starts_with(dir.path().join("out/Clean_and_Safe")));
    assert!(moved.exists());
    assert!(!dir.path().join("in/quiet.apk").exists());
    assert!(outcome.failed_path.is_none());
}

#[test]
fn malicious_keyword_label_is_infected() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "bad.apk", 32);
    let transport = ScriptedTransport::new(vec![found(1, 0, vec![trojan()])]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Infected);
    assert_eq!(result.detections[0].judgement, Judgement::Malicious);
    assert!(
        result
            .final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Infected_and_High_Risk"))
    );
    assert!(result.report_link.as_deref().unwrap().ends_with(
        result.fingerprint.as_deref().unwrap()
    ));
}

#[test]
fn allow_list_entry_turns_detection_clean() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "allowed.apk", 32);
    write_list(dir.path(), "allow.json", &["EngineX: Trojan.Generic"]);
    let transport = ScriptedTransport::new(vec![found(1, 0, vec![trojan()])]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Clean);
    assert_eq!(result.detections[0].judgement, Judgement::Allowed);
}

#[test]
fn deny_list_entry_forces_infected() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "denied.apk", 32);
    write_list(dir.path(), "deny.json", &["adware.airpush"]);
    let verdict = EngineVerdict::new("EngineY", EngineCategory::Suspicious, "Adware.AirPush");
    let transport = ScriptedTransport::new(vec![found(0, 1, vec![verdict])]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Infected);
    assert_eq!(result.detections[0].judgement, Judgement::Denied);
}

#[test]
fn oversized_unknown_is_too_large_without_submission() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "huge.apk", 700);
    let transport = ScriptedTransport::new(vec![LookupOutcome::NotFound]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::TooLarge);
    assert!(transport.submissions().is_empty());
    assert!(
        result
            .final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Too_Large_For_Lookup"))
    );
}

#[test]
fn small_unknown_is_submitted_and_pending() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "fresh.apk", 10);
    let transport = ScriptedTransport::new(vec![LookupOutcome::NotFound]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Pending);
    assert_eq!(transport.submissions(), vec![SubmitRoute::Direct]);
    assert_eq!(result.submission_handle.as_deref(), Some("analysis-123"));
    assert!(
        result
            .final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Pending_Manual_Review"))
    );
}

#[test]
fn mid_sized_unknown_uses_large_upload_route() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "mid.apk", 300);
    let transport = ScriptedTransport::new(vec![LookupOutcome::NotFound]);

    let outcome = scan(&config, &transport, &ScanOptions::default());

    assert_eq!(only_result(&outcome).disposition, Disposition::Pending);
    assert_eq!(transport.submissions(), vec![SubmitRoute::LargeUpload]);
}

#[test]
fn rejected_upload_is_upload_failed_and_listed() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "reject.apk", 10);
    let transport = ScriptedTransport::new(vec![LookupOutcome::NotFound]).rejecting_uploads();

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::UploadFailed);
    assert!(
        result
            .final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Too_Large_For_Lookup"))
    );
    let failed = fs::read_to_string(outcome.failed_path.as_ref().unwrap()).unwrap();
    assert!(failed.contains("reject.apk\tupload_failed"));
}

#[test]
fn rate_limit_backs_off_then_classifies() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "busy.apk", 32);
    let transport = ScriptedTransport::new(vec![
        LookupOutcome::RateLimited,
        LookupOutcome::RateLimited,
        found(0, 0, vec![]),
    ]);
    let observer = RecordingObserver::default();

    let outcome = run_scan_with(&config, &transport, None, &ScanOptions::default(), &observer)
        .unwrap();

    assert_eq!(only_result(&outcome).disposition, Disposition::Clean);
    assert_eq!(*observer.backoffs.lock(), vec![1, 2]);
    assert_eq!(outcome.summary.usage.rate_limits, 2);
}

#[test]
fn endless_rate_limit_gives_up_as_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sandbox_config(dir.path());
    config.retry.max_rate_limit_retries = 2;
    write_artifact(dir.path(), "stuck.apk", 32);
    let transport = ScriptedTransport::new(vec![LookupOutcome::RateLimited; 10]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Unknown);
    assert_eq!(result.reason.as_deref(), Some("rate_limit_gave_up"));
    assert!(result.final_path.is_none());
    assert!(dir.path().join("in/stuck.apk").exists());
    let failed = fs::read_to_string(outcome.failed_path.as_ref().unwrap()).unwrap();
    assert!(failed.contains("stuck.apk\tunknown\trate_limit_gave_up"));
}

#[test]
fn no_upload_leaves_unknown_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "keep.apk", 10);
    let transport = ScriptedTransport::new(vec![LookupOutcome::NotFound]);
    let options = ScanOptions {
        no_upload: true,
        ..ScanOptions::default()
    };

    let outcome = scan(&config, &transport, &options);
    let result = only_result(&outcome);

    assert_eq!(result.disposition, Disposition::Unknown);
    assert_eq!(result.reason.as_deref(), Some("upload_disabled"));
    assert!(transport.submissions().is_empty());
    assert!(dir.path().join("in/keep.apk").exists());
}

#[test]
fn session_summary_tallies_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "a_clean.apk", 32);
    write_artifact(dir.path(), "b_bad.apk", 33);
    write_artifact(dir.path(), "c_huge.apk", 700);
    write_artifact(dir.path(), "notes.txt", 5);
    let transport = ScriptedTransport::new(vec![
        found(0, 0, vec![]),
        found(1, 0, vec![trojan()]),
        LookupOutcome::NotFound,
    ]);
    let observer = RecordingObserver::default();

    let outcome = run_scan_with(&config, &transport, None, &ScanOptions::default(), &observer)
        .unwrap();

    assert_eq!(
        *observer.done.lock(),
        vec![Disposition::Clean, Disposition::Infected, Disposition::TooLarge]
    );
    let counts = &outcome.summary.counts;
    assert_eq!(counts.total(), 3);
    assert_eq!(counts.get(Disposition::Clean), 1);
    assert_eq!(counts.get(Disposition::Infected), 1);
    assert_eq!(counts.get(Disposition::TooLarge), 1);
    assert_eq!(counts.failures(), 0);

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&outcome.summary_path).unwrap()).unwrap();
    assert_eq!(summary["artifacts"].as_array().unwrap().len(), 3);
    assert!(dir.path().join("in/notes.txt").exists());

    let reports: Vec<_> = fs::read_dir(dir.path().join("out/Scan_Results"))
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".txt"))
        .collect();
    assert_eq!(reports.len(), 3);
    assert!(outcome.log_path.exists());
}

#[test]
fn same_name_relocation_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let clean_dir = dir.path().join("out/Clean_and_Safe");
    fs::create_dir_all(&clean_dir).unwrap();
    fs::write(clean_dir.join("dup.apk"), b"older").unwrap();
    write_artifact(dir.path(), "dup.apk", 32);
    let transport = ScriptedTransport::new(vec![found(0, 0, vec![])]);

    let outcome = scan(&config, &transport, &ScanOptions::default());

    assert_eq!(fs::read(clean_dir.join("dup.apk")).unwrap(), b"older");
    let moved = only_result(&outcome).final_path.clone().unwrap();
    assert_ne!(moved, clean_dir.join("dup.apk"));
    assert_eq!(fs::read(moved).unwrap().len(), 32);
}

#[test]
fn lookup_timeout_and_error_stay_unknown_and_scan_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "a_slow.apk", 20);
    write_artifact(dir.path(), "b_broken.apk", 21);
    write_artifact(dir.path(), "c_fine.apk", 22);
    let transport = ScriptedTransport::new(vec![
        LookupOutcome::Timeout,
        LookupOutcome::Error {
            detail: "HTTP 500: upstream failure".to_string(),
        },
        found(0, 0, vec![]),
    ]);

    let outcome = scan(&config, &transport, &ScanOptions::default());
    assert_eq!(outcome.results.len(), 3);

    let slow = &outcome.results[0];
    assert_eq!(slow.disposition, Disposition::Unknown);
    assert_eq!(slow.reason.as_deref(), Some("lookup_timeout"));
    assert!(slow.final_path.is_none());

    let broken = &outcome.results[1];
    assert_eq!(broken.disposition, Disposition::Unknown);
    assert_eq!(broken.reason.as_deref(), Some("lookup_error"));
    assert!(broken.errors.iter().any(|e| e.contains("upstream failure")));
    assert!(broken.final_path.is_none());

    assert!(dir.path().join("in/a_slow.apk").exists());
    assert!(dir.path().join("in/b_broken.apk").exists());

    let fine = &outcome.results[2];
    assert_eq!(fine.disposition, Disposition::Clean);
    assert!(!dir.path().join("in/c_fine.apk").exists());
    assert!(
        fine.final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Clean_and_Safe"))
    );

    assert!(transport.submissions().is_empty());
    let failed = fs::read_to_string(outcome.failed_path.as_ref().unwrap()).unwrap();
    assert!(failed.contains("a_slow.apk\tunknown\tlookup_timeout"));
    assert!(failed.contains("b_broken.apk\tunknown\tlookup_error"));
    assert!(!failed.contains("c_fine.apk"));
    assert_eq!(outcome.summary.counts.failures(), 2);
}

/// Swaps the clean destination directory for a plain file once the lookup
/// runs, so the session's own directory setup has already happened.
struct BlockedCleanDir {
    inner: ScriptedTransport,
    clean_dir: std::path::PathBuf,
}

impl ReputationTransport for BlockedCleanDir {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    fn lookup(&self, fingerprint: &str) -> LookupOutcome {
        if self.clean_dir.is_dir() {
            fs::remove_dir_all(&self.clean_dir).unwrap();
            fs::write(&self.clean_dir, b"not a directory").unwrap();
        }
        self.inner.lookup(fingerprint)
    }

    fn submit(&self, path: &Path, route: SubmitRoute) -> SubmitOutcome {
        self.inner.submit(path, route)
    }

    fn usage(&self) -> &UsageCounters {
        self.inner.usage()
    }
}

#[test]
fn unwritable_destination_keeps_disposition_and_still_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    write_artifact(dir.path(), "a_stuck.apk", 32);
    write_artifact(dir.path(), "b_bad.apk", 33);
    let transport = BlockedCleanDir {
        inner: ScriptedTransport::new(vec![found(0, 0, vec![]), found(1, 0, vec![trojan()])]),
        clean_dir: dir.path().join("out/Clean_and_Safe"),
    };

    let outcome =
        run_scan_with(&config, &transport, None, &ScanOptions::default(), &SilentObserver)
            .unwrap();
    assert_eq!(outcome.results.len(), 2);

    let stuck = &outcome.results[0];
    assert_eq!(stuck.disposition, Disposition::Clean);
    assert!(stuck.final_path.is_none());
    assert!(!stuck.errors.is_empty());
    assert!(dir.path().join("in/a_stuck.apk").exists());

    let bad = &outcome.results[1];
    assert_eq!(bad.disposition, Disposition::Infected);
    assert!(
        bad.final_path
            .as_ref()
            .unwrap()
            .starts_with(dir.path().join("out/Infected_and_High_Risk"))
    );

    let reports: Vec<String> = fs::read_dir(dir.path().join("out/Scan_Results"))
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".txt"))
        .collect();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|name| name.contains("a_stuck")));

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&outcome.summary_path).unwrap()).unwrap();
    assert_eq!(summary["artifacts"].as_array().unwrap().len(), 2);
    let log = fs::read_to_string(&outcome.log_path).unwrap();
    assert!(log.contains("ARS-3002"));
}

// ──────────────────── CLI smoke tests ────────────────────

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: arscan [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_emits_json() {
    let result = common::run_cli_case("version_command_emits_json", &["version", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["binary"], "arscan");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn hash_command_prints_sha256() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc.bin");
    fs::write(&file, b"abc").unwrap();
    let path = file.to_string_lossy().to_string();

    let result = common::run_cli_case("hash_command_prints_sha256", &["hash", &path, "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(
        payload["files"][0]["sha256"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn hash_of_missing_file_fails_with_runtime_code() {
    let result = common::run_cli_case(
        "hash_of_missing_file_fails",
        &["hash", "/nonexistent/arscan/file.apk", "--json"],
    );
    assert_eq!(result.code(), Some(2), "log: {}", result.log_path.display());
}

#[test]
fn allow_and_deny_lists_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_sandbox_config(dir.path(), "");
    let config = config.to_string_lossy().to_string();

    let added = common::run_cli_case(
        "allow_add",
        &["--config", &config, "allow", "add", "EngineX:", "Trojan.Generic", "--json"],
    );
    assert!(added.status.success(), "log: {}", added.log_path.display());
    let payload: Value = serde_json::from_str(added.stdout.trim()).unwrap();
    assert_eq!(payload["pattern"], "EngineX: Trojan.Generic");
    assert_eq!(payload["added"], true);

    let stored: Vec<String> =
        serde_json::from_str(&fs::read_to_string(dir.path().join("lists/allow.json")).unwrap())
            .unwrap();
    assert_eq!(stored, vec!["EngineX: Trojan.Generic".to_string()]);

    let deny = common::run_cli_case(
        "deny_add",
        &["--config", &config, "deny", "add", "Adware", "--json"],
    );
    assert!(deny.status.success(), "log: {}", deny.log_path.display());

    let lists = common::run_cli_case("lists", &["--config", &config, "lists", "--json"]);
    let payload: Value = serde_json::from_str(lists.stdout.trim()).unwrap();
    assert_eq!(payload["allow"][0], "EngineX: Trojan.Generic");
    assert_eq!(payload["deny"][0], "Adware");

    let removed = common::run_cli_case(
        "allow_remove",
        &["--config", &config, "allow", "remove", "EngineX:", "Trojan.Generic", "--json"],
    );
    let payload: Value = serde_json::from_str(removed.stdout.trim()).unwrap();
    assert_eq!(payload["removed"], true);

    let cleared = common::run_cli_case(
        "deny_clear",
        &["--config", &config, "deny", "clear", "--json"],
    );
    let payload: Value = serde_json::from_str(cleared.stdout.trim()).unwrap();
    assert_eq!(payload["removed"], 1);
}

#[test]
fn corrupt_list_is_an_error_for_admin_commands() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_sandbox_config(dir.path(), "");
    fs::create_dir_all(dir.path().join("lists")).unwrap();
    fs::write(dir.path().join("lists/deny.json"), b"{oops").unwrap();

    let result = common::run_cli_case(
        "corrupt_list",
        &["--config", &config.to_string_lossy(), "deny", "list"],
    );
    assert_eq!(result.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("ARS-2001"));
}

#[test]
fn scan_without_credentials_exits_runtime_before_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_sandbox_config(dir.path(), "");
    fs::create_dir_all(dir.path().join("in")).unwrap();

    let result = common::run_cli_case(
        "scan_without_credentials",
        &["--config", &config.to_string_lossy(), "scan", "--json"],
    );
    assert_eq!(result.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("ARS-1004"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn config_path_and_show_respect_override() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_sandbox_config(dir.path(), "");
    let config_str = config.to_string_lossy().to_string();

    let path = common::run_cli_case(
        "config_path",
        &["--config", &config_str, "config", "path", "--json"],
    );
    let payload: Value = serde_json::from_str(path.stdout.trim()).unwrap();
    assert_eq!(payload["path"], config_str.as_str());
    assert_eq!(payload["exists"], true);

    let show = common::run_cli_case_with_env(
        "config_show",
        &["--config", &config_str, "config", "show", "--json"],
        &[("ARS_SCAN_PACING_SECS", "7")],
    );
    assert!(show.status.success(), "log: {}", show.log_path.display());
    let payload: Value = serde_json::from_str(show.stdout.trim()).unwrap();
    assert_eq!(payload["config"]["scan"]["pacing_secs"], 7);
    assert_eq!(payload["config"]["api"]["key"], "");
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let result = common::run_cli_case(
        "missing_config",
        &["--config", "/nonexistent/arscan.toml", "lists"],
    );
    assert_eq!(result.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("ARS-1002"));
}
