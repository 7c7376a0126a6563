//! Administrative locks over working-copy directories.
//!
//! An [`AdmLockHierarchy`] is a set of [`AdmLock`]s opened together under
//! one root directory. Locks are acquired in pre-order (parent before
//! children) and released in reverse, so no child ever outlives its parent.
//!
//! # Depth
//!
//! - `empty`: lock the directory only
//! - `files`: lock the directory only; its files are covered by that lock
//! - `immediates`: also lock each versioned child directory, not deeper
//! - `infinity`: lock every versioned descendant directory
//!
//! A recursive open that fails part way (lock contention, cancellation, I/O)
//! releases everything it acquired before returning the error.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::callbacks::CancelFn;
use crate::error::{Error, Result};
use crate::lock::DirLock;
use crate::wc;

// =============================================================================
// Depth
// =============================================================================

/// Breadth of recursive descent for an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Empty,
    Files,
    Immediates,
    Infinity,
}

impl Depth {
    /// Depth used for each child directory, or `None` when children are not locked.
    pub fn child_depth(&self) -> Option<Depth> {
        match self {
            Depth::Empty | Depth::Files => None,
            Depth::Immediates => Some(Depth::Empty),
            Depth::Infinity => Some(Depth::Infinity),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Empty => write!(f, "empty"),
            Depth::Files => write!(f, "files"),
            Depth::Immediates => write!(f, "immediates"),
            Depth::Infinity => write!(f, "infinity"),
        }
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "empty" => Ok(Depth::Empty),
            "files" => Ok(Depth::Files),
            "immediates" => Ok(Depth::Immediates),
            "infinity" | "infinite" => Ok(Depth::Infinity),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid depth '{}'. Expected: empty, files, immediates, infinity",
                s
            ))),
        }
    }
}

// =============================================================================
// AdmLock
// =============================================================================

/// One administrative lock on one directory.
///
/// Owned by the hierarchy it was opened in; reach it through
/// [`AdmLockHierarchy::retrieve`] and friends.
#[derive(Debug)]
pub struct AdmLock {
    path: PathBuf,
    write_lock: bool,
    depth: Depth,
    claim: Option<DirLock>,
}

impl AdmLock {
    fn acquire(path: &Path, write_lock: bool, depth: Depth) -> Result<Self> {
        if !wc::is_working_copy(path) {
            return Err(Error::NotAWorkingCopy(path.to_path_buf()));
        }
        let claim = DirLock::acquire(path, write_lock)?;
        Ok(Self {
            path: path.to_path_buf(),
            write_lock,
            depth,
            claim: Some(claim),
        })
    }

    /// The locked directory.
    pub fn access_path(&self) -> &Path {
        &self.path
    }

    pub fn is_write_lock(&self) -> bool {
        self.write_lock
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// True while the lock is open.
    pub fn is_locked(&self) -> bool {
        self.claim.is_some()
    }

    fn release(&mut self) -> Result<()> {
        match self.claim.take() {
            Some(claim) => claim.release(),
            None => Err(Error::AlreadyClosed(self.path.clone())),
        }
    }
}

// =============================================================================
// Acquisition
// =============================================================================

fn poll_cancel(cancel: Option<&CancelFn>) -> Result<()> {
    match cancel {
        Some(cancelled) if cancelled() => Err(Error::OperationCancelled),
        _ => Ok(()),
    }
}

/// Lock `dir` and, per `depth`, its versioned descendants.
///
/// All or nothing: on error every lock taken by this call is released
/// (children first) before the error is returned.
fn acquire_tree(
    dir: &Path,
    write_lock: bool,
    depth: Depth,
    cancel: Option<&CancelFn>,
) -> Result<Vec<AdmLock>> {
    let mut acquired = Vec::new();
    match walk(dir, write_lock, depth, cancel, &mut acquired) {
        Ok(()) => Ok(acquired),
        Err(err) => {
            debug!(dir = %dir.display(), opened = acquired.len(), error = %err, "rolling back partial open");
            rollback(acquired);
            Err(err)
        }
    }
}

fn walk(
    dir: &Path,
    write_lock: bool,
    depth: Depth,
    cancel: Option<&CancelFn>,
    acquired: &mut Vec<AdmLock>,
) -> Result<()> {
    poll_cancel(cancel)?;
    acquired.push(AdmLock::acquire(dir, write_lock, depth)?);

    if let Some(child_depth) = depth.child_depth() {
        for child in wc::versioned_subdirs(dir)? {
            walk(&child, write_lock, child_depth, cancel, acquired)?;
        }
    }
    Ok(())
}

fn rollback(mut acquired: Vec<AdmLock>) {
    while let Some(mut lock) = acquired.pop() {
        if let Err(err) = lock.release() {
            warn!(dir = %lock.path.display(), error = %err, "failed to release lock during rollback");
        }
    }
}

/// Nearest versioned directory at or above `path`.
fn nearest_working_copy(path: &Path) -> Option<&Path> {
    path.ancestors().find(|dir| wc::is_working_copy(dir))
}

// =============================================================================
// AdmLockHierarchy
// =============================================================================

/// Locks opened together under one root directory.
///
/// Closed locks stay in the set (reporting `is_locked() == false`) until a
/// later open replaces them. Dropping the hierarchy releases whatever is
/// still open, children first.
#[derive(Debug)]
pub struct AdmLockHierarchy {
    root: PathBuf,
    locks: BTreeMap<PathBuf, AdmLock>,
}

impl AdmLockHierarchy {
    /// Open a hierarchy rooted at `path`.
    ///
    /// Fails with [`Error::NotAWorkingCopy`] if `path` has no administrative
    /// area and with [`Error::AlreadyLocked`] if any directory in reach is
    /// already locked.
    pub fn open(
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        cancel: Option<&CancelFn>,
    ) -> Result<Self> {
        let root = wc::canonicalize(path.as_ref())?;
        let acquired = acquire_tree(&root, write_lock, depth, cancel)?;
        debug!(root = %root.display(), locks = acquired.len(), write_lock, %depth, "opened lock hierarchy");
        Ok(Self {
            locks: acquired
                .into_iter()
                .map(|lock| (lock.path.clone(), lock))
                .collect(),
            root,
        })
    }

    /// Open a hierarchy for `path`, which need not itself be versioned.
    ///
    /// A versioned directory is opened as with [`open`](Self::open).
    /// Otherwise the nearest versioned ancestor is opened instead; when
    /// `path` is not a directory that ancestor is locked at depth `empty`.
    pub fn probe_open(
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        cancel: Option<&CancelFn>,
    ) -> Result<Self> {
        let path = wc::canonicalize(path.as_ref())?;
        if wc::is_working_copy(&path) {
            return Self::open(&path, write_lock, depth, cancel);
        }

        let depth = if path.is_dir() { depth } else { Depth::Empty };
        match path.parent().and_then(nearest_working_copy) {
            Some(anchor) => Self::open(anchor, write_lock, depth, cancel),
            None => Err(Error::NotAWorkingCopy(path)),
        }
    }

    /// Open the anchor of `path` plus `path` itself as a target.
    ///
    /// The anchor is locked at depth `empty`; a versioned directory target
    /// gets its own lock at `depth` within the same hierarchy. For a
    /// working-copy root the anchor is the root itself, opened at `depth`.
    pub fn open_anchor(
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        cancel: Option<&CancelFn>,
    ) -> Result<Anchored> {
        let (anchor, target) = wc::actual_target(path.as_ref())?;
        let Some(target) = target else {
            let hierarchy = Self::open(&anchor, write_lock, depth, cancel)?;
            return Ok(Anchored {
                hierarchy,
                target: None,
            });
        };

        let mut hierarchy = Self::open(&anchor, write_lock, Depth::Empty, cancel)?;
        let target_path = anchor.join(&target);
        if wc::is_working_copy(&target_path) {
            if let Err(err) = hierarchy.open_child(&target_path, write_lock, depth, cancel) {
                if let Err(close_err) = hierarchy.close() {
                    warn!(anchor = %anchor.display(), error = %close_err, "failed to close anchor");
                }
                return Err(err);
            }
        }
        Ok(Anchored {
            hierarchy,
            target: Some(target),
        })
    }

    /// Open further locks inside this hierarchy.
    ///
    /// `path` must lie under the root, which must still be open. Like
    /// [`open`](Self::open), a failed recursive open leaves no new locks
    /// behind; locks already in the hierarchy are untouched.
    pub fn open_child(
        &mut self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        cancel: Option<&CancelFn>,
    ) -> Result<&AdmLock> {
        let path = wc::canonicalize(path.as_ref())?;
        if !path.starts_with(&self.root) {
            return Err(Error::InvalidArgument(format!(
                "'{}' is outside the hierarchy rooted at '{}'",
                path.display(),
                self.root.display()
            )));
        }
        if !self.root().is_locked() {
            return Err(Error::AlreadyClosed(self.root.clone()));
        }
        if self.is_locked(&path) {
            return Err(Error::AlreadyLocked(path));
        }

        let acquired = acquire_tree(&path, write_lock, depth, cancel)?;
        debug!(path = %path.display(), locks = acquired.len(), "opened locks into hierarchy");
        for lock in acquired {
            self.locks.insert(lock.path.clone(), lock);
        }
        self.retrieve(&path)
    }

    /// Return the lock covering `path`, opening one if needed.
    ///
    /// The directory considered is `path` when versioned, else its nearest
    /// versioned ancestor. An open lock on it is returned as is; otherwise
    /// it is opened into this hierarchy.
    pub fn probe_try(
        &mut self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        cancel: Option<&CancelFn>,
    ) -> Result<&AdmLock> {
        let path = wc::canonicalize(path.as_ref())?;
        let dir = nearest_working_copy(&path)
            .ok_or_else(|| Error::NotAWorkingCopy(path.clone()))?
            .to_path_buf();

        if self.is_locked(&dir) {
            return self.retrieve(&dir);
        }
        let depth = if dir == path { depth } else { Depth::Empty };
        self.open_child(&dir, write_lock, depth, cancel)
    }

    /// Look up the open lock for exactly `path`. Never opens anything.
    pub fn retrieve(&self, path: impl AsRef<Path>) -> Result<&AdmLock> {
        let path = wc::canonicalize(path.as_ref())?;
        match self.locks.get(&path) {
            Some(lock) if lock.is_locked() => Ok(lock),
            Some(_) => Err(Error::AlreadyClosed(path)),
            None => Err(Error::NotFound(path)),
        }
    }

    /// Look up the open lock for `path` or its nearest locked ancestor
    /// within this hierarchy. Never opens anything.
    pub fn probe_retrieve(&self, path: impl AsRef<Path>) -> Result<&AdmLock> {
        let path = wc::canonicalize(path.as_ref())?;
        let found = path
            .ancestors()
            .take_while(|dir| dir.starts_with(&self.root))
            .find_map(|dir| self.locks.get(dir).filter(|lock| lock.is_locked()));
        found.ok_or(Error::NotFound(path))
    }

    /// Any lock ever opened for `path` in this hierarchy, open or closed.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&AdmLock> {
        let path = wc::canonicalize(path.as_ref()).ok()?;
        self.locks.get(&path)
    }

    /// Whether `path` has an open lock in this hierarchy.
    pub fn is_locked(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some_and(AdmLock::is_locked)
    }

    pub fn root(&self) -> &AdmLock {
        // The root entry is inserted at construction and never removed.
        &self.locks[&self.root]
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Open locks in pre-order.
    pub fn locked_paths(&self) -> Vec<&Path> {
        self.locks
            .values()
            .filter(|lock| lock.is_locked())
            .map(AdmLock::access_path)
            .collect()
    }

    /// Close the lock on `path` and every open lock beneath it, children first.
    ///
    /// Closing an already closed lock still releases any open locks beneath
    /// it, then fails with [`Error::AlreadyClosed`].
    pub fn close_lock(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = wc::canonicalize(path.as_ref())?;
        let was_open = match self.locks.get(&path) {
            Some(lock) => lock.is_locked(),
            None => return Err(Error::NotFound(path)),
        };

        let doomed: Vec<PathBuf> = self
            .locks
            .iter()
            .filter(|(dir, lock)| dir.starts_with(&path) && lock.is_locked())
            .map(|(dir, _)| dir.clone())
            .collect();

        let mut first_error = None;
        for dir in doomed.iter().rev() {
            if let Some(lock) = self.locks.get_mut(dir) {
                if let Err(err) = lock.release() {
                    warn!(dir = %dir.display(), error = %err, "failed to release lock");
                    first_error.get_or_insert(err);
                }
            }
        }
        debug!(path = %path.display(), closed = doomed.len(), "closed locks");

        if !was_open {
            return Err(Error::AlreadyClosed(path));
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close the whole hierarchy.
    pub fn close(&mut self) -> Result<()> {
        let root = self.root.clone();
        self.close_lock(root)
    }
}

impl Drop for AdmLockHierarchy {
    fn drop(&mut self) {
        for lock in self.locks.values_mut().rev() {
            if lock.is_locked() {
                if let Err(err) = lock.release() {
                    warn!(dir = %lock.path.display(), error = %err, "failed to release lock on drop");
                }
            }
        }
    }
}

/// Result of [`AdmLockHierarchy::open_anchor`].
#[derive(Debug)]
pub struct Anchored {
    pub hierarchy: AdmLockHierarchy,
    target: Option<String>,
}

impl Anchored {
    pub fn anchor(&self) -> &AdmLock {
        self.hierarchy.root()
    }

    /// Entry name inside the anchor, or `None` when the anchor is the target.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn target_path(&self) -> PathBuf {
        match &self.target {
            Some(name) => self.hierarchy.root_path().join(name),
            None => self.hierarchy.root_path().to_path_buf(),
        }
    }

    /// The target's own lock when it is a versioned directory, else the anchor's.
    pub fn target_lock(&self) -> Result<&AdmLock> {
        self.hierarchy.probe_retrieve(self.target_path())
    }

    pub fn into_hierarchy(self) -> AdmLockHierarchy {
        self.hierarchy
    }
}
