//! svnctx cleanup command implementation

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::wc;

#[derive(serde::Serialize)]
struct CleanupReport {
    path: PathBuf,
    removed: Vec<PathBuf>,
}

pub fn run(path: &Path, output: OutputOptions) -> Result<()> {
    let path = wc::canonicalize(path)?;
    let removed = wc::cleanup(&path)?;

    let header = if removed.is_empty() {
        "svnctx cleanup: nothing to do".to_string()
    } else {
        format!("svnctx cleanup: removed {} stale lock(s)", removed.len())
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("path", path.display().to_string());
    for dir in &removed {
        human.push_detail(dir.display().to_string());
    }

    let report = CleanupReport { path, removed };
    emit_success(output, "cleanup", &report, Some(&human))
}
