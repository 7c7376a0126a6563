#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use svnctx::wc;
use tempfile::TempDir;

pub const REPOS: &str = "svn://example.com/repo";
pub const URL: &str = "svn://example.com/repo/trunk";

/// A working copy laid out in a temp dir.
pub struct TestWc {
    dir: TempDir,
    root: PathBuf,
}

impl TestWc {
    /// An empty working copy: just the versioned root.
    pub fn init() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().canonicalize()?.join("wc");
        fs::create_dir(&root)?;
        wc::ensure_adm(&root, Some("test-uuid"), URL, Some(REPOS), 1)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
        Ok(Self { dir, root })
    }

    /// The standard tree:
    ///
    /// ```text
    /// wc/
    ///   README.txt
    ///   a/
    ///     a1/
    ///       deep/
    ///     a2/
    ///     notes.txt
    ///   b/
    ///   plain/        (unversioned)
    /// ```
    pub fn tree() -> std::io::Result<Self> {
        let test = Self::init()?;
        test.write_file("README.txt", "hello")?;
        for rel in ["a", "a/a1", "a/a1/deep", "a/a2", "b"] {
            test.add_dir(rel)?;
        }
        test.write_file("a/notes.txt", "notes")?;
        fs::create_dir(test.path("plain"))?;
        Ok(test)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The temp dir holding the working copy, outside any working copy.
    pub fn outside(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            return self.root.clone();
        }
        self.root.join(rel)
    }

    pub fn url(&self, rel: &str) -> String {
        if rel.is_empty() {
            return URL.to_string();
        }
        format!("{URL}/{rel}")
    }

    /// Create a versioned directory at `rel`.
    pub fn add_dir(&self, rel: &str) -> std::io::Result<PathBuf> {
        let path = self.path(rel);
        fs::create_dir_all(&path)?;
        wc::ensure_adm(&path, Some("test-uuid"), &self.url(rel), Some(REPOS), 1)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
        Ok(path)
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join("svnctx.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Whether the on-disk write lock file of `rel` exists.
    pub fn has_lock_file(&self, rel: &str) -> bool {
        wc::lock_file(&self.path(rel)).exists()
    }
}

/// Every versioned directory of the standard tree, in pre-order.
pub fn tree_dirs() -> [&'static str; 6] {
    ["", "a", "a/a1", "a/a1/deep", "a/a2", "b"]
}
