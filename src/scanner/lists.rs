//! Operator-maintained allow/deny detection lists.
//!
//! Each list is a set of case-insensitive substring patterns matched against
//! `"<engine>: <label>"`. Lists persist as pretty-printed JSON arrays (sorted,
//! de-duplicated) and are written atomically. A missing file is an empty list.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::config::ListsConfig;
use crate::core::errors::{ArsError, Result};
use crate::core::paths::write_atomic;

/// Which of the two lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Suppresses matching detections.
    Allow,
    /// Forces infected on a matching detection.
    Deny,
}

impl ListKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One list's patterns plus their lowercased match form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: BTreeSet<String>,
    folded: Vec<String>,
}

impl PatternSet {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: BTreeSet<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let folded = patterns.iter().map(|p| p.to_lowercase()).collect();
        Self { patterns, folded }
    }

    /// Case-insensitive substring match against `detection`.
    #[must_use]
    pub fn matches(&self, detection: &str) -> bool {
        if self.folded.is_empty() {
            return false;
        }
        let haystack = detection.to_lowercase();
        self.folded.iter().any(|p| haystack.contains(p.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    fn insert(&mut self, pattern: String) -> bool {
        let inserted = self.patterns.insert(pattern);
        if inserted {
            self.refold();
        }
        inserted
    }

    fn remove(&mut self, pattern: &str) -> bool {
        let removed = self.patterns.remove(pattern);
        if removed {
            self.refold();
        }
        removed
    }

    fn refold(&mut self) {
        self.folded = self.patterns.iter().map(|p| p.to_lowercase()).collect();
    }
}

/// Both detection lists, owned explicitly and passed into the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionLists {
    pub allow: PatternSet,
    pub deny: PatternSet,
}

impl DetectionLists {
    #[must_use]
    pub fn new(allow: PatternSet, deny: PatternSet) -> Self {
        Self { allow, deny }
    }

    #[must_use]
    pub const fn get(&self, kind: ListKind) -> &PatternSet {
        match kind {
            ListKind::Allow => &self.allow,
            ListKind::Deny => &self.deny,
        }
    }

    fn get_mut(&mut self, kind: ListKind) -> &mut PatternSet {
        match kind {
            ListKind::Allow => &mut self.allow,
            ListKind::Deny => &mut self.deny,
        }
    }
}

/// File-backed store for both lists.
#[derive(Debug, Clone)]
pub struct ListStore {
    allow_file: PathBuf,
    deny_file: PathBuf,
    lists: DetectionLists,
}

impl ListStore {
    /// Load both list files. Malformed files are an error.
    pub fn open(config: &ListsConfig) -> Result<Self> {
        let allow = read_pattern_file(&config.allow_file)?;
        let deny = read_pattern_file(&config.deny_file)?;
        Ok(Self {
            allow_file: config.allow_file.clone(),
            deny_file: config.deny_file.clone(),
            lists: DetectionLists::new(allow, deny),
        })
    }

    #[must_use]
    pub const fn lists(&self) -> &DetectionLists {
        &self.lists
    }

    #[must_use]
    pub fn into_lists(self) -> DetectionLists {
        self.lists
    }

    #[must_use]
    pub fn file_for(&self, kind: ListKind) -> &Path {
        match kind {
            ListKind::Allow => &self.allow_file,
            ListKind::Deny => &self.deny_file,
        }
    }

    /// Add a pattern. Returns `false` if it was already present.
    ///
    /// # Errors
    /// [`ArsError::InvalidPattern`] for an empty pattern; IO errors on save.
    pub fn add(&mut self, kind: ListKind, pattern: &str) -> Result<bool> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ArsError::InvalidPattern {
                details: "pattern must not be empty".to_string(),
            });
        }
        let added = self.lists.get_mut(kind).insert(pattern.to_string());
        if added {
            self.save(kind)?;
        }
        Ok(added)
    }

    /// Remove an exact pattern. Returns `false` if it was not present.
    pub fn remove(&mut self, kind: ListKind, pattern: &str) -> Result<bool> {
        let removed = self.lists.get_mut(kind).remove(pattern.trim());
        if removed {
            self.save(kind)?;
        }
        Ok(removed)
    }

    /// Remove every pattern; returns how many were removed.
    pub fn clear(&mut self, kind: ListKind) -> Result<usize> {
        let count = self.lists.get(kind).len();
        *self.lists.get_mut(kind) = PatternSet::default();
        self.save(kind)?;
        Ok(count)
    }

    fn save(&self, kind: ListKind) -> Result<()> {
        let path = self.file_for(kind);
        let patterns: Vec<&str> = self.lists.get(kind).iter().collect();
        let mut json = serde_json::to_string_pretty(&patterns)?;
        json.push('\n');
        write_atomic(path, json.as_bytes()).map_err(|source| ArsError::io(path, source))
    }
}

fn read_pattern_file(path: &Path) -> Result<PatternSet> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PatternSet::default()),
        Err(source) => return Err(ArsError::io(path, source)),
    };
    if raw.trim().is_empty() {
        return Ok(PatternSet::default());
    }
    let patterns: Vec<String> =
        serde_json::from_str(&raw).map_err(|error| ArsError::ListParse {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
    Ok(PatternSet::from_patterns(patterns))
}
