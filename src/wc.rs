//! Working-copy administrative areas.
//!
//! A directory is a working copy when it carries an administrative
//! directory (`.svn/`) with an `entries` file. Write locks live beside it as
//! `.svn/lock`.
//!
//! # Directory Structure
//!
//! ```text
//! <dir>/
//!   .svn/
//!     entries        # AdmEntries as JSON
//!     lock           # present while a write lock is held
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lock;

/// Name of the administrative directory
pub const ADM_DIR: &str = ".svn";

const ENTRIES_FILE: &str = "entries";
const LOCK_FILE: &str = "lock";

/// What the administrative area records about its directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmEntries {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
}

pub fn adm_dir(dir: &Path) -> PathBuf {
    dir.join(ADM_DIR)
}

fn entries_file(dir: &Path) -> PathBuf {
    adm_dir(dir).join(ENTRIES_FILE)
}

/// Path of the on-disk write lock for `dir`.
pub fn lock_file(dir: &Path) -> PathBuf {
    adm_dir(dir).join(LOCK_FILE)
}

/// Whether `path` is a directory with an administrative area.
pub fn is_working_copy(path: &Path) -> bool {
    entries_file(path).is_file()
}

/// Create the administrative area for `dir` if it does not exist.
///
/// Returns `true` when the area was created. An existing area must record
/// the same URL.
pub fn ensure_adm(
    dir: &Path,
    uuid: Option<&str>,
    url: &str,
    repos: Option<&str>,
    revision: u64,
) -> Result<bool> {
    let url = url.trim_end_matches('/');
    if url.is_empty() {
        return Err(Error::InvalidArgument("url cannot be empty".to_string()));
    }
    if let Some(repos) = repos {
        if !url.starts_with(repos.trim_end_matches('/')) {
            return Err(Error::InvalidArgument(format!(
                "url '{url}' is not inside repository root '{repos}'"
            )));
        }
    }

    if is_working_copy(dir) {
        let existing = read_entries(dir)?;
        if existing.url != url {
            return Err(Error::InvalidArgument(format!(
                "'{}' is already a working copy for '{}'",
                dir.display(),
                existing.url
            )));
        }
        return Ok(false);
    }

    fs::create_dir_all(adm_dir(dir))?;
    let entries = AdmEntries {
        url: url.to_string(),
        repos: repos.map(|r| r.trim_end_matches('/').to_string()),
        uuid: uuid.map(str::to_string),
        revision,
        created_at: Utc::now(),
    };
    lock::write_atomic(entries_file(dir), &serde_json::to_vec_pretty(&entries)?)?;
    debug!(dir = %dir.display(), url, "administrative area created");
    Ok(true)
}

/// Read the administrative entries of `dir`.
pub fn read_entries(dir: &Path) -> Result<AdmEntries> {
    if !is_working_copy(dir) {
        return Err(Error::NotAWorkingCopy(dir.to_path_buf()));
    }
    let raw = fs::read(entries_file(dir))?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Whether `dir` carries a write lock that a live holder keeps.
pub fn is_locked(dir: &Path) -> Result<bool> {
    if !is_working_copy(dir) {
        return Err(Error::NotAWorkingCopy(dir.to_path_buf()));
    }
    lock::is_held(&lock_file(dir))
}

/// Whether `dir` is the top of its working copy.
///
/// A versioned directory is a root when its parent is not versioned or
/// records a URL that does not lead to it (a switched subtree).
pub fn is_wc_root(dir: &Path) -> Result<bool> {
    let entries = read_entries(dir)?;
    let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) else {
        return Ok(true);
    };
    if !is_working_copy(parent) {
        return Ok(true);
    }
    let parent_entries = read_entries(parent)?;
    let expected = format!("{}/{}", parent_entries.url, name.to_string_lossy());
    Ok(entries.url != expected)
}

/// Split `path` into the directory to lock and the entry operated on.
///
/// A working-copy root is its own anchor with no target; anything else is
/// anchored at its parent with its basename as target.
pub fn actual_target(path: &Path) -> Result<(PathBuf, Option<String>)> {
    let path = canonicalize(path)?;
    if is_working_copy(&path) && is_wc_root(&path)? {
        return Ok((path, None));
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((
            parent.to_path_buf(),
            Some(name.to_string_lossy().into_owned()),
        )),
        _ => Ok((path, None)),
    }
}

/// Versioned child directories of `dir`, sorted by name.
pub fn versioned_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == ADM_DIR || !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if is_working_copy(&path) {
            children.push(path);
        }
    }
    children.sort();
    Ok(children)
}

/// Remove on-disk write locks that no live holder keeps.
///
/// Walks `dir` and every versioned subdirectory; returns the directories
/// whose stale lock file was removed.
pub fn cleanup(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = canonicalize(dir)?;
    if !is_working_copy(&dir) {
        return Err(Error::NotAWorkingCopy(dir));
    }

    let mut cleaned = Vec::new();
    let mut pending = vec![dir];
    while let Some(current) = pending.pop() {
        let lock_path = lock_file(&current);
        if lock_path.exists() {
            if !lock::is_registered(&current) && lock::remove_stale(&lock_path)? {
                cleaned.push(current.clone());
            } else {
                warn!(dir = %current.display(), "skipping cleanup of a live lock");
            }
        }
        let mut children = versioned_subdirs(&current)?;
        children.reverse();
        pending.extend(children);
    }
    Ok(cleaned)
}

/// Absolute, symlink-free form of `path`.
///
/// Paths that do not exist yet are resolved through their nearest existing
/// ancestor.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Ok(resolved);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = fs::canonicalize(existing) {
            let mut result = resolved;
            for component in missing.iter().rev() {
                result.push(component);
            }
            return Ok(result);
        }
        match (existing.parent(), existing.components().next_back()) {
            (Some(parent), Some(Component::Normal(name))) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}
