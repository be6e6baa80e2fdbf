//! Candidate enumeration: immediate files of each source directory.
//!
//! No recursion. Directories are visited in configuration order and their
//! results concatenated; within one directory files are sorted by name. A file
//! reachable through two configured directories is listed twice.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::config::ScanConfig;
use crate::core::errors::{ArsError, Result};
use crate::scanner::model::Artifact;

/// What to enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    pub directories: Vec<PathBuf>,
    /// Lowercase extensions without the dot. Empty accepts every file.
    pub extensions: Vec<String>,
}

impl WalkerConfig {
    #[must_use]
    pub fn from_scan(scan: &ScanConfig) -> Self {
        Self {
            directories: scan.directories.clone(),
            extensions: scan.extensions.clone(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|want| *want == ext)
            })
    }
}

/// Directory that could not be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDir {
    pub path: PathBuf,
    pub reason: String,
}

/// Enumeration output.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub artifacts: Vec<Artifact>,
    pub skipped: Vec<SkippedDir>,
}

/// Enumerate candidates. Missing or unreadable directories are reported in
/// [`Enumeration::skipped`] and do not stop the walk.
#[must_use]
pub fn enumerate(config: &WalkerConfig) -> Enumeration {
    let mut out = Enumeration::default();
    for dir in &config.directories {
        match list_dir(dir, config) {
            Ok(mut found) => out.artifacts.append(&mut found),
            Err(e) => out.skipped.push(SkippedDir {
                path: dir.clone(),
                reason: e.to_string(),
            }),
        }
    }
    out
}

fn list_dir(dir: &Path, config: &WalkerConfig) -> Result<Vec<Artifact>> {
    let entries = fs::read_dir(dir).map_err(|e| ArsError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(ArsError::io(dir, e)),
        };
        let path = entry.path();
        if !config.accepts(&path) {
            continue;
        }
        // Follows symlinks; only regular files qualify.
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if meta.is_file() {
            found.push(Artifact::new(path, meta.len()));
        }
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}
