//! svnctx init command implementation
//!
//! Creates the administrative area of a working-copy directory.

use std::fs;
use std::path::PathBuf;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::wc;

pub struct InitOptions {
    pub path: PathBuf,
    pub url: String,
    pub repos: Option<String>,
    pub uuid: Option<String>,
    pub revision: u64,
    pub output: OutputOptions,
}

#[derive(serde::Serialize)]
struct InitReport {
    path: PathBuf,
    url: String,
    revision: u64,
    created: bool,
    wc_root: bool,
}

pub fn run(options: InitOptions) -> Result<()> {
    fs::create_dir_all(&options.path)?;
    let path = wc::canonicalize(&options.path)?;

    let created = wc::ensure_adm(
        &path,
        options.uuid.as_deref(),
        &options.url,
        options.repos.as_deref(),
        options.revision,
    )?;
    let entries = wc::read_entries(&path)?;
    let wc_root = wc::is_wc_root(&path)?;

    let report = InitReport {
        path: path.clone(),
        url: entries.url.clone(),
        revision: entries.revision,
        created,
        wc_root,
    };

    let header = if created {
        "svnctx init: created administrative area".to_string()
    } else {
        "svnctx init: nothing to do".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("path", path.display().to_string());
    human.push_summary("url", entries.url);
    human.push_summary("revision", entries.revision.to_string());
    if !wc_root {
        human.push_detail("nested inside the parent working copy");
    }
    human.push_next_step(format!("svnctx lock {}", path.display()));

    emit_success(options.output, "init", &report, Some(&human))
}
