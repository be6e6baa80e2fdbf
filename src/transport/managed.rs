//! Managed transport: pooled blocking `reqwest` client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, multipart};

use crate::core::config::ApiConfig;
use crate::core::errors::Result;
use crate::transport::response::{lookup_outcome, parse_upload_url, submit_outcome};
use crate::transport::{
    LookupOutcome, ReputationTransport, SubmitOutcome, SubmitRoute, TransportKind, UsageCounters,
};

const API_KEY_HEADER: &str = "x-apikey";

/// Lookup/submit over an in-process HTTP client.
pub struct ManagedTransport {
    client: Client,
    base_url: String,
    api_key: String,
    lookup_timeout: Duration,
    upload_timeout: Duration,
    large_upload_timeout: Duration,
    usage: Arc<UsageCounters>,
}

impl ManagedTransport {
    /// Build the client.
    ///
    /// # Errors
    /// [`crate::core::errors::ArsError::Http`] if the TLS backend or client
    /// cannot be initialized.
    pub fn new(api: &ApiConfig, api_key: &str, usage: Arc<UsageCounters>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(api.connect_timeout())
            .user_agent(concat!("arscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            lookup_timeout: api.lookup_timeout(),
            upload_timeout: api.upload_timeout(),
            large_upload_timeout: api.large_upload_timeout(),
            usage,
        })
    }

    fn post_file(&self, url: &str, path: &Path, timeout: Duration) -> SubmitOutcome {
        let form = match multipart::Form::new().file("file", path) {
            Ok(form) => form,
            Err(e) => {
                return SubmitOutcome::Failed {
                    detail: format!("cannot read {}: {e}", path.display()),
                };
            }
        };
        let sent = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(timeout)
            .multipart(form)
            .send();
        match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.bytes().map(|b| b.to_vec()).unwrap_or_default();
                submit_outcome(status, &body)
            }
            Err(e) => SubmitOutcome::Failed {
                detail: describe(&e),
            },
        }
    }

    fn fetch_upload_url(&self) -> std::result::Result<String, String> {
        let resp = self
            .client
            .get(format!("{}/files/upload_url", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.lookup_timeout)
            .send()
            .map_err(|e| describe(&e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(|e| describe(&e))?;
        if status != 200 {
            return Err(format!("upload URL request returned HTTP {status}"));
        }
        parse_upload_url(&body).ok_or_else(|| "upload URL missing from response".to_string())
    }
}

impl ReputationTransport for ManagedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Managed
    }

    fn lookup(&self, fingerprint: &str) -> LookupOutcome {
        self.usage.record_call(TransportKind::Managed);
        let sent = self
            .client
            .get(format!("{}/files/{fingerprint}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.lookup_timeout)
            .send();
        let outcome = match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.bytes() {
                    Ok(body) => lookup_outcome(status, &body),
                    Err(e) if e.is_timeout() => LookupOutcome::Timeout,
                    Err(e) => LookupOutcome::Error {
                        detail: describe(&e),
                    },
                }
            }
            Err(e) if e.is_timeout() => LookupOutcome::Timeout,
            Err(e) => LookupOutcome::Error {
                detail: describe(&e),
            },
        };
        self.usage.observe_lookup(&outcome);
        outcome
    }

    fn submit(&self, path: &Path, route: SubmitRoute) -> SubmitOutcome {
        self.usage.record_call(TransportKind::Managed);
        let outcome = match route {
            SubmitRoute::Direct => {
                let url = format!("{}/files", self.base_url);
                self.post_file(&url, path, self.upload_timeout)
            }
            SubmitRoute::LargeUpload => match self.fetch_upload_url() {
                Ok(url) => self.post_file(&url, path, self.large_upload_timeout),
                Err(detail) => SubmitOutcome::Failed { detail },
            },
        };
        self.usage.observe_submit(&outcome);
        outcome
    }

    fn usage(&self) -> &UsageCounters {
        &self.usage
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
