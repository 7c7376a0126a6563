//! Error types for svnctx
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, not a working copy)
//! - 3: Blocked by a lock held elsewhere
//! - 4: Operation failed (engine error, credentials, I/O)
//! - 130: Cancelled by the caller

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::credential::CredentialKind;

/// Exit codes for the svnctx CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const LOCK_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

/// Subversion numeric error codes known to the classification table.
pub mod codes {
    pub const WC_OBSTRUCTED_UPDATE: u32 = 155000;
    pub const WC_LOCKED: u32 = 155004;
    pub const WC_NOT_LOCKED: u32 = 155005;
    pub const WC_INVALID_LOCK: u32 = 155006;
    pub const WC_NOT_WORKING_COPY: u32 = 155007;
    pub const WC_PATH_NOT_FOUND: u32 = 155010;
    pub const RA_ILLEGAL_URL: u32 = 170000;
    pub const RA_NOT_AUTHORIZED: u32 = 170001;
    pub const INCORRECT_PARAMS: u32 = 200004;
    pub const UNSUPPORTED_FEATURE: u32 = 200007;
    pub const CANCELLED: u32 = 200015;
    pub const AUTHN_CREDS_UNAVAILABLE: u32 = 215000;
    pub const AUTHN_NO_PROVIDER: u32 = 215001;
    pub const AUTHN_PROVIDERS_EXHAUSTED: u32 = 215002;
    pub const AUTHN_CREDS_NOT_SAVED: u32 = 215003;
    pub const AUTHN_FAILED: u32 = 215004;
}

/// Structured classification of an engine error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    WcObstructedUpdate,
    WcLocked,
    WcNotLocked,
    WcInvalidLock,
    WcNotWorkingCopy,
    WcPathNotFound,
    RaIllegalUrl,
    RaNotAuthorized,
    IncorrectParams,
    UnsupportedFeature,
    Cancelled,
    AuthnCredsUnavailable,
    AuthnNoProvider,
    AuthnProvidersExhausted,
    AuthnCredsNotSaved,
    AuthnFailed,
}

const CLASSIFICATION: &[(u32, EngineErrorKind)] = &[
    (codes::WC_OBSTRUCTED_UPDATE, EngineErrorKind::WcObstructedUpdate),
    (codes::WC_LOCKED, EngineErrorKind::WcLocked),
    (codes::WC_NOT_LOCKED, EngineErrorKind::WcNotLocked),
    (codes::WC_INVALID_LOCK, EngineErrorKind::WcInvalidLock),
    (codes::WC_NOT_WORKING_COPY, EngineErrorKind::WcNotWorkingCopy),
    (codes::WC_PATH_NOT_FOUND, EngineErrorKind::WcPathNotFound),
    (codes::RA_ILLEGAL_URL, EngineErrorKind::RaIllegalUrl),
    (codes::RA_NOT_AUTHORIZED, EngineErrorKind::RaNotAuthorized),
    (codes::INCORRECT_PARAMS, EngineErrorKind::IncorrectParams),
    (codes::UNSUPPORTED_FEATURE, EngineErrorKind::UnsupportedFeature),
    (codes::CANCELLED, EngineErrorKind::Cancelled),
    (codes::AUTHN_CREDS_UNAVAILABLE, EngineErrorKind::AuthnCredsUnavailable),
    (codes::AUTHN_NO_PROVIDER, EngineErrorKind::AuthnNoProvider),
    (codes::AUTHN_PROVIDERS_EXHAUSTED, EngineErrorKind::AuthnProvidersExhausted),
    (codes::AUTHN_CREDS_NOT_SAVED, EngineErrorKind::AuthnCredsNotSaved),
    (codes::AUTHN_FAILED, EngineErrorKind::AuthnFailed),
];

impl EngineErrorKind {
    /// Look up the kind for a numeric engine code.
    pub fn from_code(code: u32) -> Option<Self> {
        CLASSIFICATION
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
    }

    /// Numeric code for this kind.
    pub fn code(&self) -> u32 {
        CLASSIFICATION
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(code, _)| *code)
            .unwrap_or_default()
    }
}

/// A failure surfaced by the version-control engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineError {
    pub code: u32,
    /// Classification, when the code is in the table.
    pub kind: Option<EngineErrorKind>,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl EngineError {
    pub fn new(
        code: u32,
        message: impl Into<String>,
        file: Option<String>,
        line: Option<u32>,
    ) -> Self {
        Self {
            code,
            kind: EngineErrorKind::from_code(code),
            message: message.into(),
            file,
            line,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = self.file.as_deref() {
            write!(f, "{file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            write!(f, " ")?;
        }
        write!(f, "{} (E{})", self.message, self.code)
    }
}

/// Main error type for svnctx operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("'{0}' is not a working copy")]
    NotAWorkingCopy(PathBuf),

    #[error("No lock for '{0}' in this hierarchy")]
    NotFound(PathBuf),

    #[error("Lock on '{0}' is already closed")]
    AlreadyClosed(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Lock contention (exit code 3)
    #[error("Working copy '{0}' is locked")]
    AlreadyLocked(PathBuf),

    // Operation failures (exit code 4)
    #[error("No {kind} credential available for realm '{realm}'")]
    NoCredentialAvailable { kind: CredentialKind, realm: String },

    #[error("Prompt for {kind} credential in realm '{realm}' gave up after {attempts} attempts")]
    PromptRetryExceeded {
        kind: CredentialKind,
        realm: String,
        attempts: u32,
    },

    #[error("Engine error: {0}")]
    Engine(EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Expected outcome (exit code 130)
    #[error("Operation cancelled")]
    OperationCancelled,
}

impl Error {
    /// Build an error from an engine failure, re-classified through the table.
    ///
    /// Engine cancellations become [`Error::OperationCancelled`] so callers
    /// see a single cancellation kind regardless of where it originated.
    pub fn from_engine(
        code: u32,
        message: impl Into<String>,
        file: Option<String>,
        line: Option<u32>,
    ) -> Self {
        let engine = EngineError::new(code, message, file, line);
        match engine.kind {
            Some(EngineErrorKind::Cancelled) => Error::OperationCancelled,
            _ => Error::Engine(engine),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotAWorkingCopy(_)
            | Error::NotFound(_)
            | Error::AlreadyClosed(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_) => exit_codes::USER_ERROR,

            Error::AlreadyLocked(_) => exit_codes::LOCK_BLOCKED,

            Error::NoCredentialAvailable { .. }
            | Error::PromptRetryExceeded { .. }
            | Error::Engine(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => exit_codes::OPERATION_FAILED,

            Error::OperationCancelled => exit_codes::CANCELLED,
        }
    }

    /// Subversion numeric code equivalent, if there is one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::AlreadyLocked(_) => Some(codes::WC_LOCKED),
            Error::NotAWorkingCopy(_) => Some(codes::WC_NOT_WORKING_COPY),
            Error::NotFound(_) | Error::AlreadyClosed(_) => Some(codes::WC_NOT_LOCKED),
            Error::NoCredentialAvailable { .. } => Some(codes::AUTHN_CREDS_UNAVAILABLE),
            Error::PromptRetryExceeded { .. } => Some(codes::AUTHN_FAILED),
            Error::OperationCancelled => Some(codes::CANCELLED),
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => Some(codes::INCORRECT_PARAMS),
            Error::Engine(engine) => Some(engine.code),
            Error::Io(_) | Error::Json(_) | Error::TomlParse(_) | Error::TomlSerialize(_) => None,
        }
    }

    /// True when the caller aborted rather than the operation failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::OperationCancelled)
    }

    /// Structured extras for JSON output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::AlreadyLocked(path)
            | Error::NotAWorkingCopy(path)
            | Error::NotFound(path)
            | Error::AlreadyClosed(path) => Some(serde_json::json!({ "path": path })),
            Error::NoCredentialAvailable { kind, realm } => {
                Some(serde_json::json!({ "kind": kind.to_string(), "realm": realm }))
            }
            Error::PromptRetryExceeded {
                kind,
                realm,
                attempts,
            } => Some(serde_json::json!({
                "kind": kind.to_string(),
                "realm": realm,
                "attempts": attempts,
            })),
            Error::Engine(engine) => serde_json::to_value(engine).ok(),
            _ => None,
        }
    }
}

/// Result type alias for svnctx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svn_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            svn_code: err.code(),
            details: err.details(),
        }
    }
}
