//! Disposition routing for fingerprints the lookup service has never seen.
//!
//! ```text
//! size > T_max            → too_large (no submission)
//! size ≤ T_small          → direct submission
//! T_small < size ≤ T_max  → upload-handle submission
//! accepted                → pending
//! rejected / unreachable  → upload_failed
//! ```

use std::path::Path;

use crate::core::config::UploadConfig;
use crate::scanner::model::Disposition;
use crate::transport::{ReputationTransport, SubmitOutcome, SubmitRoute};

/// What to do with an unknown artifact of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePlan {
    /// Above the service's upload ceiling.
    TooLarge,
    /// Submit through `route`.
    Submit(SubmitRoute),
    /// Submission is switched off.
    Disabled,
}

/// Size thresholds and the upload switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispositionRouter {
    direct_max_bytes: u64,
    max_bytes: u64,
    enabled: bool,
}

/// Result of routing one unknown artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// One of `TooLarge`, `Pending`, `UploadFailed`, `Unknown`.
    pub disposition: Disposition,
    /// Route used, if a submission was attempted.
    pub route: Option<SubmitRoute>,
    /// Analysis handle for accepted submissions.
    pub handle: Option<String>,
    /// Machine-readable cause.
    pub reason: String,
}

impl DispositionRouter {
    /// Router from the `[upload]` section; `force_disable` is `scan --no-upload`.
    #[must_use]
    pub const fn new(config: &UploadConfig, force_disable: bool) -> Self {
        Self {
            direct_max_bytes: config.direct_max_bytes,
            max_bytes: config.max_bytes,
            enabled: config.enabled && !force_disable,
        }
    }

    /// Plan by size alone. Oversized artifacts are `TooLarge` even when uploads are off.
    #[must_use]
    pub const fn plan(&self, size_bytes: u64) -> RoutePlan {
        if size_bytes > self.max_bytes {
            RoutePlan::TooLarge
        } else if !self.enabled {
            RoutePlan::Disabled
        } else if size_bytes <= self.direct_max_bytes {
            RoutePlan::Submit(SubmitRoute::Direct)
        } else {
            RoutePlan::Submit(SubmitRoute::LargeUpload)
        }
    }

    /// Plan and, where applicable, submit.
    pub fn route(
        &self,
        transport: &dyn ReputationTransport,
        path: &Path,
        size_bytes: u64,
    ) -> RouteOutcome {
        match self.plan(size_bytes) {
            RoutePlan::TooLarge => RouteOutcome {
                disposition: Disposition::TooLarge,
                route: None,
                handle: None,
                reason: "exceeds_upload_limit".to_string(),
            },
            RoutePlan::Disabled => RouteOutcome {
                disposition: Disposition::Unknown,
                route: None,
                handle: None,
                reason: "upload_disabled".to_string(),
            },
            RoutePlan::Submit(route) => match transport.submit(path, route) {
                SubmitOutcome::Accepted { handle } => RouteOutcome {
                    disposition: Disposition::Pending,
                    route: Some(route),
                    handle,
                    reason: "uploaded_awaiting_analysis".to_string(),
                },
                SubmitOutcome::Failed { detail } => RouteOutcome {
                    disposition: Disposition::UploadFailed,
                    route: Some(route),
                    handle: None,
                    reason: format!("upload_failed: {detail}"),
                },
            },
        }
    }
}
