//! Operation hooks: log-message supplier, notification sink, cancellation poll.
//!
//! Each slot holds a boxed closure; the closure's captures are its state.
//! An empty slot behaves as the no-op default.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};

/// Supplies a commit log message. `Ok(None)` aborts the commit.
pub type LogMessageFn = dyn Fn(&[CommitItem]) -> Result<Option<String>> + Send + Sync;

/// Receives progress notifications.
pub type NotifyFn = dyn Fn(&Notify) + Send + Sync;

/// Polled during long operations; `true` requests an abort.
pub type CancelFn = dyn Fn() -> bool + Send + Sync;

/// A path about to be committed, as shown to the log-message supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitItem {
    pub path: PathBuf,
    pub url: Option<String>,
    pub revision: Option<u64>,
}

/// Node kind reported with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    None,
    File,
    Dir,
    Unknown,
}

/// What happened to the path in a [`Notify`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    Add,
    Copy,
    Delete,
    Restore,
    Revert,
    FailedRevert,
    Resolved,
    Skip,
    UpdateDelete,
    UpdateAdd,
    UpdateUpdate,
    UpdateCompleted,
    UpdateExternal,
    StatusCompleted,
    StatusExternal,
    CommitModified,
    CommitAdded,
    CommitDeleted,
    CommitReplaced,
    CommitPostfixTxdelta,
    BlameRevision,
    Locked,
    Unlocked,
    FailedLock,
    FailedUnlock,
}

/// A progress event from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notify {
    pub path: PathBuf,
    pub action: NotifyAction,
    pub kind: NodeKind,
    pub revision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Notify {
    pub fn new(path: impl Into<PathBuf>, action: NotifyAction) -> Self {
        Self {
            path: path.into(),
            action,
            kind: NodeKind::Unknown,
            revision: None,
            error: None,
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn is_add(&self) -> bool {
        self.action == NotifyAction::Add
    }

    pub fn is_commit_added(&self) -> bool {
        self.action == NotifyAction::CommitAdded
    }

    pub fn is_commit_deleted(&self) -> bool {
        self.action == NotifyAction::CommitDeleted
    }

    pub fn is_commit_postfix_txdelta(&self) -> bool {
        self.action == NotifyAction::CommitPostfixTxdelta
    }

    pub fn is_locked(&self) -> bool {
        self.action == NotifyAction::Locked
    }

    pub fn is_unlocked(&self) -> bool {
        self.action == NotifyAction::Unlocked
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.action,
            NotifyAction::UpdateCompleted | NotifyAction::StatusCompleted
        )
    }
}

/// The three operation hooks of a session.
#[derive(Default)]
pub struct CallbackSlots {
    log_message: Option<Box<LogMessageFn>>,
    notify: Option<Box<NotifyFn>>,
    cancel: Option<Box<CancelFn>>,
}

impl CallbackSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a log-message supplier; `None` restores the default.
    pub fn set_log_message(&mut self, handler: Option<Box<LogMessageFn>>) {
        self.log_message = handler;
    }

    pub fn set_notification(&mut self, handler: Option<Box<NotifyFn>>) {
        self.notify = handler;
    }

    pub fn set_cancellation(&mut self, handler: Option<Box<CancelFn>>) {
        self.cancel = handler;
    }

    pub fn log_message_handler(&self) -> Option<&LogMessageFn> {
        self.log_message.as_deref()
    }

    pub fn notification_handler(&self) -> Option<&NotifyFn> {
        self.notify.as_deref()
    }

    pub fn cancellation_handler(&self) -> Option<&CancelFn> {
        self.cancel.as_deref()
    }

    /// Ask for a log message. Without a supplier there is no message.
    pub fn log_message(&self, items: &[CommitItem]) -> Result<Option<String>> {
        match &self.log_message {
            Some(handler) => handler(items),
            None => Ok(None),
        }
    }

    pub fn notify(&self, event: &Notify) {
        if let Some(handler) = &self.notify {
            handler(event);
        }
    }

    /// Poll the cancellation hook.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|handler| handler())
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::OperationCancelled);
        }
        Ok(())
    }
}

impl fmt::Debug for CallbackSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlots")
            .field("log_message", &self.log_message.is_some())
            .field("notify", &self.notify.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}
