//! Shared path manipulation utilities.

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. a scan directory that does not exist yet), the path is made
/// absolute relative to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Split `name` into stem and extension (`"app.apk"` -> `("app", Some("apk"))`).
///
/// Dotfiles keep their leading dot in the stem.
#[must_use]
pub fn split_file_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

/// First destination under `dir` for `file_name` that does not already exist.
///
/// Collisions get a `_<suffix>` tag before the extension; if that is taken too,
/// a counter is appended (`_<suffix>_2`, `_<suffix>_3`, ...).
#[must_use]
pub fn collision_free_path(dir: &Path, file_name: &str, suffix: &str) -> PathBuf {
    let direct = dir.join(file_name);
    if !direct.exists() {
        return direct;
    }
    let (stem, ext) = split_file_name(file_name);
    let build = |tag: &str| match ext {
        Some(ext) => dir.join(format!("{stem}_{tag}.{ext}")),
        None => dir.join(format!("{stem}_{tag}")),
    };
    let tagged = build(suffix);
    if !tagged.exists() {
        return tagged;
    }
    let mut counter: u32 = 2;
    loop {
        let candidate = build(&format!("{suffix}_{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter = counter.saturating_add(1);
    }
}

/// Replace `path` with `contents` atomically: write a sibling `.tmp`, fsync, rename.
///
/// Parent directories are created as needed. The temp file is removed on failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
