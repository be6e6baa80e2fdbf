//! Disposition-directory layout and artifact relocation.
//!
//! ```text
//! clean                    → <base>/<clean_dir>
//! infected                 → <base>/<infected_dir>
//! too_large, upload_failed → <base>/<too_large_dir>
//! pending                  → <base>/<pending_dir>
//! unknown                  → left in the source directory
//! ```
//!
//! A move is a `rename`; across filesystems it becomes copy + remove. Either
//! way the artifact ends up in exactly one place: a copy whose source cannot
//! be removed is rolled back.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::core::config::LayoutConfig;
use crate::core::errors::{ArsError, Result};
use crate::core::paths::collision_free_path;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::model::{Artifact, Disposition};

// ──────────────────── layout ────────────────────

/// Resolved output directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub clean: PathBuf,
    pub infected: PathBuf,
    pub too_large: PathBuf,
    pub pending: PathBuf,
    pub reports: PathBuf,
    pub logs: PathBuf,
}

/// File count of one disposition directory at session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirCount {
    pub label: &'static str,
    pub path: PathBuf,
    pub files: usize,
}

impl Layout {
    #[must_use]
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            clean: config.clean_path(),
            infected: config.infected_path(),
            too_large: config.too_large_path(),
            pending: config.pending_path(),
            reports: config.reports_path(),
            logs: config.logs_path(),
        }
    }

    /// Create every output directory.
    ///
    /// # Errors
    /// [`ArsError::Io`] naming the first directory that cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in self.all_dirs() {
            fs::create_dir_all(dir).map_err(|e| ArsError::io(dir, e))?;
        }
        Ok(())
    }

    /// Directory an artifact with `disposition` moves to; `None` means it stays.
    #[must_use]
    pub fn destination_dir(&self, disposition: Disposition) -> Option<&Path> {
        match disposition {
            Disposition::Clean => Some(&self.clean),
            Disposition::Infected => Some(&self.infected),
            Disposition::TooLarge | Disposition::UploadFailed => Some(&self.too_large),
            Disposition::Pending => Some(&self.pending),
            Disposition::Unknown => None,
        }
    }

    /// Regular files currently in each disposition directory.
    #[must_use]
    pub fn organized_snapshot(&self) -> Vec<DirCount> {
        [
            ("clean", &self.clean),
            ("infected", &self.infected),
            ("too_large", &self.too_large),
            ("pending", &self.pending),
        ]
        .into_iter()
        .map(|(label, path)| DirCount {
            label,
            path: path.clone(),
            files: count_files(path),
        })
        .collect()
    }

    fn all_dirs(&self) -> [&Path; 6] {
        [
            &self.clean,
            &self.infected,
            &self.too_large,
            &self.pending,
            &self.reports,
            &self.logs,
        ]
    }
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, |entries| {
        entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .count()
    })
}

// ──────────────────── relocator ────────────────────

/// Moves artifacts into their disposition directories.
pub struct Relocator {
    layout: Layout,
    logger: Option<ActivityLoggerHandle>,
}

impl Relocator {
    /// Create a relocator with an optional logger handle.
    pub fn new(layout: Layout, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { layout, logger }
    }

    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Move `artifact` to the directory for `disposition`.
    ///
    /// Returns the new path, or `None` for dispositions that leave the artifact
    /// in place. A name already taken at the destination gets a timestamp
    /// suffix; nothing is overwritten.
    ///
    /// # Errors
    /// [`ArsError::Io`] if the destination cannot be created or the move fails.
    /// The artifact is then still at its source path.
    pub fn relocate(&self, artifact: &Artifact, disposition: Disposition) -> Result<Option<PathBuf>> {
        let Some(dir) = self.layout.destination_dir(disposition) else {
            return Ok(None);
        };

        let suffix = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let target = collision_free_path(dir, &artifact.name, &suffix);
        let moved = fs::create_dir_all(dir)
            .map_err(|e| ArsError::io(dir, e))
            .and_then(|()| {
                move_file(artifact.path(), &target).map_err(|e| ArsError::io(artifact.path(), e))
            });
        match moved {
            Ok(()) => {
                self.log_event(ActivityEvent::Relocated {
                    artifact: artifact.name.clone(),
                    from: artifact.path().display().to_string(),
                    to: target.display().to_string(),
                });
                Ok(Some(target))
            }
            Err(err) => {
                self.log_event(ActivityEvent::Error {
                    artifact: Some(artifact.name.clone()),
                    code: err.code().to_string(),
                    message: format!("relocation to {} failed: {err}", target.display()),
                });
                Err(err)
            }
        }
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

/// `rename`, or copy + remove when the rename is refused (e.g. across devices).
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if !from.is_file() {
        return Err(rename_err);
    }
    if let Err(copy_err) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(copy_err);
    }
    if let Err(remove_err) = fs::remove_file(from) {
        // Keep exactly one copy: the source.
        let _ = fs::remove_file(to);
        return Err(remove_err);
    }
    Ok(())
}

// ──────────────────── tests ────────────────────
