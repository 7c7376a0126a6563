//! Command-line interface for svnctx
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::output::OutputOptions;

mod auth;
mod cleanup;
mod init;
mod lock;

/// svnctx - working-copy locks and credential resolution
///
/// Opens administrative lock hierarchies over Subversion-style working
/// copies and resolves credentials through an ordered provider chain.
#[derive(Parser, Debug)]
#[command(name = "svnctx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to $SVNCTX_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Never prompt for credentials
    #[arg(long, global = true, env = "SVNCTX_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an administrative area for a directory
    Init {
        /// Directory to turn into a working copy
        path: PathBuf,

        /// Repository URL the directory tracks
        #[arg(long)]
        url: String,

        /// Repository root URL
        #[arg(long)]
        repos: Option<String>,

        /// Repository UUID
        #[arg(long)]
        uuid: Option<String>,

        /// Base revision
        #[arg(long, default_value_t = 0)]
        revision: u64,
    },

    /// Open a lock hierarchy, report what it covers, then close it
    Lock {
        /// Path to lock (need not be versioned itself)
        path: PathBuf,

        /// Depth: empty, files, immediates, infinity
        #[arg(long, default_value = "infinity")]
        depth: String,

        /// Take write locks instead of read locks
        #[arg(long)]
        write: bool,
    },

    /// Check whether a directory carries a live write lock
    Locked {
        /// Working-copy directory
        path: PathBuf,
    },

    /// Remove stale write locks left behind by dead processes
    Cleanup {
        /// Working-copy directory
        path: PathBuf,
    },

    /// Resolve a credential for a realm through the provider chain
    Auth {
        /// Authentication realm, e.g. "<svn://host:3690> repo"
        realm: String,

        /// Credential kind: simple, username
        #[arg(long, default_value = "simple")]
        kind: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Init {
                path,
                url,
                repos,
                uuid,
                revision,
            } => init::run(init::InitOptions {
                path,
                url,
                repos,
                uuid,
                revision,
                output,
            }),
            Commands::Lock { path, depth, write } => {
                let config = load_config(self.config.as_deref())?;
                lock::run_lock(lock::LockOptions {
                    path,
                    depth,
                    write,
                    config,
                    output,
                })
            }
            Commands::Locked { path } => lock::run_locked(&path, output),
            Commands::Cleanup { path } => cleanup::run(&path, output),
            Commands::Auth { realm, kind } => {
                let mut config = load_config(self.config.as_deref())?;
                if self.non_interactive {
                    config.session.non_interactive = true;
                }
                auth::run(auth::AuthOptions {
                    realm,
                    kind,
                    config,
                    output,
                })
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}
