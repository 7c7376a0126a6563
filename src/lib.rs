//! svnctx - Subversion client context library
//!
//! This library provides the session layer a Subversion client runs its
//! operations in: credential resolution, operation hooks, and the
//! administrative lock protocol over working copies.
//!
//! # Core Concepts
//!
//! - **Providers**: Static or interactive strategies producing one kind of credential
//! - **Auth registry**: Ordered provider chain with a shared parameter map and cache
//! - **Callback slots**: Log-message, notification and cancellation hooks
//! - **Client session**: The capability object every operation takes
//! - **Lock hierarchies**: Administrative locks over a working-copy tree
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `svnctx.toml`
//! - `error`: Error types, engine error classification and result aliases
//! - `credential`: Credential kinds and records
//! - `provider`: Credential providers and the prompt adapter
//! - `registry`: The auth registry and its parameters
//! - `callbacks`: Operation hooks and their payloads
//! - `session`: The client session
//! - `adm`: Administrative locks and lock hierarchies
//! - `wc`: Working-copy administrative areas
//! - `lock`: Directory claims, file locking and atomic writes
//! - `output`: JSON envelope and human output

pub mod adm;
pub mod callbacks;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod lock;
pub mod output;
pub mod provider;
pub mod registry;
pub mod session;
pub mod wc;

pub use adm::{AdmLock, AdmLockHierarchy, Anchored, Depth};
pub use callbacks::{CallbackSlots, CommitItem, Notify, NotifyAction};
pub use credential::{Credential, CredentialKind, SslFailures};
pub use error::{Error, Result};
pub use provider::{CredentialProvider, CredentialSource, PromptAdapter, PromptContext};
pub use registry::{AuthParam, AuthParameters, AuthRegistry, AuthToken};
pub use session::{Challenge, ClientSession};
