//! svnctx lock / locked command implementations

use std::path::{Path, PathBuf};

use crate::adm::Depth;
use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::session::ClientSession;
use crate::wc;

pub struct LockOptions {
    pub path: PathBuf,
    pub depth: String,
    pub write: bool,
    pub config: Config,
    pub output: OutputOptions,
}

#[derive(serde::Serialize)]
struct LockReport {
    root: PathBuf,
    depth: String,
    write_lock: bool,
    locked: Vec<PathBuf>,
}

#[derive(serde::Serialize)]
struct LockedReport {
    path: PathBuf,
    locked: bool,
}

pub fn run_lock(options: LockOptions) -> Result<()> {
    let depth: Depth = options.depth.parse()?;
    let mut session = ClientSession::with_config(&options.config)?;

    let (root, locked) = session.with_locked(&options.path, options.write, depth, |_, hierarchy| {
        let locked = hierarchy
            .locked_paths()
            .into_iter()
            .map(Path::to_path_buf)
            .collect::<Vec<_>>();
        Ok((hierarchy.root_path().to_path_buf(), locked))
    })?;

    let report = LockReport {
        root: root.clone(),
        depth: depth.to_string(),
        write_lock: options.write,
        locked,
    };

    let mut human = HumanOutput::new(format!(
        "svnctx lock: {} director{} locked and released",
        report.locked.len(),
        if report.locked.len() == 1 { "y" } else { "ies" }
    ));
    human.push_summary("root", root.display().to_string());
    human.push_summary("depth", report.depth.clone());
    human.push_summary("mode", if options.write { "write" } else { "read" });
    for dir in &report.locked {
        human.push_detail(dir.display().to_string());
    }

    emit_success(options.output, "lock", &report, Some(&human))
}

pub fn run_locked(path: &Path, output: OutputOptions) -> Result<()> {
    let path = wc::canonicalize(path)?;
    let locked = wc::is_locked(&path)?;

    let report = LockedReport {
        path: path.clone(),
        locked,
    };

    let mut human = HumanOutput::new(if locked {
        "svnctx locked: locked"
    } else {
        "svnctx locked: not locked"
    });
    human.push_summary("path", path.display().to_string());
    if !locked && wc::lock_file(&path).exists() {
        human.push_warning("stale lock file present");
        human.push_next_step(format!("svnctx cleanup {}", path.display()));
    }

    emit_success(output, "locked", &report, Some(&human))
}
