//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use artifact_reputation_scanner::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{ArsError, Result};

// Scanner
pub use crate::scanner::hasher::fingerprint;
pub use crate::scanner::lists::{DetectionLists, ListKind, ListStore, PatternSet};
pub use crate::scanner::model::{
    AnalysisStats, Artifact, Disposition, EngineCategory, EngineVerdict, Judgement, ScanResult,
};
pub use crate::scanner::policy::{Classification, ClassificationPolicy};
pub use crate::scanner::report::{SessionSummary, Tally};
pub use crate::scanner::session::{
    ScanOptions, SessionObserver, SessionOutcome, SilentObserver, run_scan, run_scan_with,
};

// Transport
pub use crate::transport::{
    LookupOutcome, ReputationTransport, SubmitOutcome, SubmitRoute, TransportKind, UsageCounters,
    UsageSnapshot, select_transport,
};
