//! Raw-HTTP transport: `curl` subprocess.
//!
//! The API key travels on curl's stdin (`--header @-`) so it never shows up
//! in the process table. The status code is appended to stdout with
//! `--write-out`.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{ApiConfig, TransportConfig};
use crate::core::errors::{ArsError, Result};
use crate::transport::response::{lookup_outcome, parse_upload_url, submit_outcome};
use crate::transport::{
    LookupOutcome, ReputationTransport, SubmitOutcome, SubmitRoute, TransportKind, UsageCounters,
};

/// curl's exit code for an operation timeout.
const CURL_TIMEOUT_EXIT: i32 = 28;
const STATUS_MARKER: &str = "\n__ARS_HTTP_STATUS__:";

/// Lookup/submit by running `curl`.
pub struct RawTransport {
    curl: String,
    base_url: String,
    api_key: String,
    connect_timeout: Duration,
    lookup_timeout: Duration,
    upload_timeout: Duration,
    large_upload_timeout: Duration,
    usage: Arc<UsageCounters>,
}

/// What one curl invocation produced.
#[derive(Debug)]
enum CurlResult {
    Response { status: u16, body: Vec<u8> },
    TimedOut,
    Failed(String),
}

impl RawTransport {
    /// Configure without probing; see [`Self::probe`].
    #[must_use]
    pub fn new(
        api: &ApiConfig,
        transport: &TransportConfig,
        api_key: &str,
        usage: Arc<UsageCounters>,
    ) -> Self {
        Self {
            curl: transport.curl_binary.clone(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            connect_timeout: api.connect_timeout(),
            lookup_timeout: api.lookup_timeout(),
            upload_timeout: api.upload_timeout(),
            large_upload_timeout: api.large_upload_timeout(),
            usage,
        }
    }

    /// Check that the curl binary runs.
    ///
    /// # Errors
    /// [`ArsError::TransportUnavailable`] if `curl --version` cannot be executed.
    pub fn probe(&self) -> Result<()> {
        let status = Command::new(&self.curl)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ArsError::TransportUnavailable {
                details: format!("{} not runnable: {e}", self.curl),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ArsError::TransportUnavailable {
                details: format!("{} --version exited with {status}", self.curl),
            })
        }
    }

    fn run(&self, timeout: Duration, extra: &[String], url: &str) -> CurlResult {
        let mut cmd = Command::new(&self.curl);
        cmd.args(["--silent", "--show-error", "--header", "@-"])
            .arg("--connect-timeout")
            .arg(self.connect_timeout.as_secs().max(1).to_string())
            .arg("--max-time")
            .arg(timeout.as_secs().max(1).to_string())
            .arg("--write-out")
            .arg(format!("{STATUS_MARKER}%{{http_code}}"))
            .args(extra)
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return CurlResult::Failed(format!("{} failed to start: {e}", self.curl)),
        };
        if let Some(mut stdin) = child.stdin.take() {
            // A write error here surfaces as a curl failure below.
            let _ = writeln!(stdin, "x-apikey: {}", self.api_key);
        }
        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(e) => return CurlResult::Failed(format!("{} wait failed: {e}", self.curl)),
        };

        if output.status.code() == Some(CURL_TIMEOUT_EXIT) {
            return CurlResult::TimedOut;
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return CurlResult::Failed(format!(
                "curl exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        split_status(output.stdout)
    }

    fn post_file(&self, url: &str, path: &Path, timeout: Duration) -> SubmitOutcome {
        if let Err(e) = std::fs::metadata(path) {
            return SubmitOutcome::Failed {
                detail: format!("cannot read {}: {e}", path.display()),
            };
        }
        let form = vec!["--form".to_string(), form_file_field(path)];
        match self.run(timeout, &form, url) {
            CurlResult::Response { status, body } => submit_outcome(status, &body),
            CurlResult::TimedOut => SubmitOutcome::Failed {
                detail: "upload timed out".to_string(),
            },
            CurlResult::Failed(detail) => SubmitOutcome::Failed { detail },
        }
    }
}

impl ReputationTransport for RawTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Raw
    }

    fn lookup(&self, fingerprint: &str) -> LookupOutcome {
        self.usage.record_call(TransportKind::Raw);
        let url = format!("{}/files/{fingerprint}", self.base_url);
        let outcome = match self.run(self.lookup_timeout, &[], &url) {
            CurlResult::Response { status, body } => lookup_outcome(status, &body),
            CurlResult::TimedOut => LookupOutcome::Timeout,
            CurlResult::Failed(detail) => LookupOutcome::Error { detail },
        };
        self.usage.observe_lookup(&outcome);
        outcome
    }

    fn submit(&self, path: &Path, route: SubmitRoute) -> SubmitOutcome {
        self.usage.record_call(TransportKind::Raw);
        let outcome = match route {
            SubmitRoute::Direct => {
                let url = format!("{}/files", self.base_url);
                self.post_file(&url, path, self.upload_timeout)
            }
            SubmitRoute::LargeUpload => {
                let url = format!("{}/files/upload_url", self.base_url);
                match self.run(self.lookup_timeout, &[], &url) {
                    CurlResult::Response { status: 200, body } => match parse_upload_url(&body) {
                        Some(upload_url) => {
                            self.post_file(&upload_url, path, self.large_upload_timeout)
                        }
                        None => SubmitOutcome::Failed {
                            detail: "upload URL missing from response".to_string(),
                        },
                    },
                    CurlResult::Response { status, .. } => SubmitOutcome::Failed {
                        detail: format!("upload URL request returned HTTP {status}"),
                    },
                    CurlResult::TimedOut => SubmitOutcome::Failed {
                        detail: "upload URL request timed out".to_string(),
                    },
                    CurlResult::Failed(detail) => SubmitOutcome::Failed { detail },
                }
            }
        };
        self.usage.observe_submit(&outcome);
        outcome
    }

    fn usage(&self) -> &UsageCounters {
        &self.usage
    }
}

/// Split curl stdout into body and the trailing status marker.
fn split_status(mut stdout: Vec<u8>) -> CurlResult {
    let marker = STATUS_MARKER.as_bytes();
    let Some(pos) = stdout
        .windows(marker.len())
        .rposition(|window| window == marker)
    else {
        return CurlResult::Failed("curl output missing status marker".to_string());
    };
    let code = String::from_utf8_lossy(&stdout[pos + marker.len()..])
        .trim()
        .to_string();
    stdout.truncate(pos);
    match code.parse::<u16>() {
        Ok(0) => CurlResult::Failed("no HTTP response received".to_string()),
        Ok(status) => CurlResult::Response {
            status,
            body: stdout,
        },
        Err(_) => CurlResult::Failed(format!("unparseable HTTP status {code:?}")),
    }
}

/// `file=@"<path>"` with curl's quoting rules for `"` and `\`.
fn form_file_field(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("file=@\"{escaped}\"")
}
