#![forbid(unsafe_code)]

//! Artifact Reputation Scanner (arscan): sorts downloaded package artifacts by
//! what a threat-intelligence lookup service knows about them.
//!
//! Each artifact in the source directories is:
//! 1. **Fingerprinted**: SHA-256 of the file contents
//! 2. **Looked up**: by fingerprint, with bounded rate-limit backoff
//! 3. **Classified**: engine verdicts judged against allow/deny lists and keywords
//! 4. **Routed**: unknown artifacts are uploaded, parked, or left in place
//! 5. **Relocated and reported**: moved to its disposition directory with a text report
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use artifact_reputation_scanner::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use artifact_reputation_scanner::core::config::Config;
//! use artifact_reputation_scanner::scanner::session::{ScanOptions, run_scan};
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod scanner;
pub mod transport;
