//! Artifact scanning pipeline: fingerprint, look up, classify, route, relocate, report.

pub mod hasher;
pub mod lists;
pub mod model;
pub mod policy;
pub mod relocate;
pub mod report;
pub mod router;
pub mod sandbox;
pub mod session;
pub mod walker;
