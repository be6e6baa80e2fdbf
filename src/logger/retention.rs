//! Pruning of expired session logs.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::core::errors::{ArsError, Result};

const SECS_PER_DAY: u64 = 24 * 3600;

/// Delete session logs in `logs_dir` whose mtime is older than `retention_days`.
///
/// Only `*.log`, `*.jsonl` and rotated `*.jsonl.N` files are considered.
/// A missing directory prunes nothing. Files that vanish or refuse deletion
/// are skipped. Returns the number of files removed.
///
/// # Errors
/// [`ArsError::Io`] if `logs_dir` exists but cannot be listed.
pub fn prune_session_logs(logs_dir: &Path, retention_days: u64) -> Result<usize> {
    prune_older_than(
        logs_dir,
        Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY)),
        SystemTime::now(),
    )
}

fn prune_older_than(logs_dir: &Path, max_age: Duration, now: SystemTime) -> Result<usize> {
    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ArsError::io(logs_dir, e)),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_session_log(&path) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age > max_age && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_session_log(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.ends_with(".log") || name.ends_with(".jsonl") {
        return true;
    }
    // Rotated JSONL: foo.jsonl.3
    name.rsplit_once('.').is_some_and(|(stem, index)| {
        stem.ends_with(".jsonl") && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
    })
}
