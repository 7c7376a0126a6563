//! Directory lock primitives for svnctx
//!
//! This module provides the exclusivity layer under administrative locks:
//! - A process-wide table of locked directories, keyed by canonical path
//! - On-disk write locks (`.svn/lock`) held with fs2/flock so other
//!   processes see them
//! - Atomic writes (temp file + persist) for administrative files
//!
//! Acquisition never waits: a directory that is already locked fails with
//! [`Error::AlreadyLocked`].

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::wc;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Attempts at locking a lock file that keeps being replaced underneath us.
const ACQUIRE_ATTEMPTS: usize = 8;

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

/// Outcome of locking an already opened lock file.
enum Attempt {
    Held(FileLock),
    Contended,
    /// The path no longer names the file we locked: a previous holder
    /// unlinked it between our open and our lock.
    Unlinked,
}

impl FileLock {
    /// Try to acquire a lock without waiting
    ///
    /// Returns `Ok(Some(lock))` if acquired, `Ok(None)` if would block,
    /// or `Err` for other errors. The file is created if missing.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();

        for _ in 0..ACQUIRE_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;

            match Self::lock_opened(file, path)? {
                Attempt::Held(lock) => return Ok(Some(lock)),
                Attempt::Contended => return Ok(None),
                Attempt::Unlinked => {
                    trace!(path = %path.display(), "lock file replaced while locking, retrying");
                }
            }
        }
        Ok(None)
    }

    fn lock_opened(file: File, path: &Path) -> Result<Attempt> {
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_lock_contended(&e) => return Ok(Attempt::Contended),
            Err(e) => return Err(Error::Io(e)),
        }

        if !still_linked(&file, path)? {
            return Ok(Attempt::Unlinked);
        }
        Ok(Attempt::Held(FileLock {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the lock file, then unlock it.
    ///
    /// The unlink happens while the lock is still held, so an opener racing
    /// with us either loses the lock or finds its file unlinked and retries.
    pub fn remove(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(err)),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock the file - ignore errors during drop
        let _ = FileExt::unlock(&self.file);
    }
}

/// Whether `path` still names the open `file`.
fn still_linked(file: &File, path: &Path) -> Result<bool> {
    let on_disk = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(Error::Io(err)),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let opened = file.metadata()?;
        Ok(on_disk.dev() == opened.dev() && on_disk.ino() == opened.ino())
    }
    #[cfg(not(unix))]
    {
        // On Windows an unlinked file keeps its name until every handle closes.
        let _ = (file, on_disk);
        Ok(true)
    }
}

/// Whether some live holder keeps an exclusive lock on `path`.
///
/// Probes with a shared lock, so concurrent probes never contend with one
/// another. A writer trying to lock the same file during the probe still
/// fails with [`Error::AlreadyLocked`]; the window is one syscall wide.
pub fn is_held(path: &Path) -> Result<bool> {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(Error::Io(err)),
    };

    match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(e) if is_lock_contended(&e) => Ok(true),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Remove the lock file at `path` if no live holder keeps it.
///
/// Returns whether a stale file was removed. The file is locked before it is
/// unlinked, so a holder that appears after the check is never robbed.
pub fn remove_stale(path: &Path) -> Result<bool> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(Error::Io(err)),
    };

    match FileLock::lock_opened(file, path)? {
        Attempt::Held(lock) => {
            lock.remove()?;
            Ok(true)
        }
        Attempt::Contended | Attempt::Unlinked => Ok(false),
    }
}

// =============================================================================
// Process-wide lock table
// =============================================================================

fn table() -> MutexGuard<'static, HashSet<PathBuf>> {
    static TABLE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    TABLE
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whether this process currently holds a lock on `dir` (canonical path).
pub fn is_registered(dir: &Path) -> bool {
    table().contains(dir)
}

/// Exclusive claim on one working-copy directory.
///
/// Every claim occupies the process-wide table. Write claims also hold the
/// on-disk lock file. Released explicitly by [`DirLock::release`] or on drop.
#[derive(Debug)]
pub struct DirLock {
    dir: PathBuf,
    file: Option<FileLock>,
    released: bool,
}

impl DirLock {
    /// Claim `dir`, which must already be canonical.
    pub fn acquire(dir: &Path, write_lock: bool) -> Result<Self> {
        let mut table = table();
        if !table.insert(dir.to_path_buf()) {
            return Err(Error::AlreadyLocked(dir.to_path_buf()));
        }

        let file = if write_lock {
            match FileLock::try_acquire(wc::lock_file(dir)) {
                Ok(Some(file)) => Some(file),
                Ok(None) => {
                    table.remove(dir);
                    return Err(Error::AlreadyLocked(dir.to_path_buf()));
                }
                Err(err) => {
                    table.remove(dir);
                    return Err(err);
                }
            }
        } else {
            None
        };

        trace!(dir = %dir.display(), write_lock, "directory claimed");
        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_write_lock(&self) -> bool {
        self.file.is_some()
    }

    /// Release the claim, removing the on-disk lock file for write claims.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = match self.file.take() {
            Some(file) => file.remove(),
            None => Ok(()),
        };
        table().remove(&self.dir);
        debug!(dir = %self.dir.display(), "directory released");
        result
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

// =============================================================================
// Atomic writes
// =============================================================================

/// Atomically write data to a file
///
/// The data goes to a named temporary file beside the target, which is then
/// persisted over it. Readers see the old content or the new, never a mix.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| Error::Io(err.error))?;

    Ok(())
}
