//! Credential kinds and the records providers fill in.
//!
//! Each [`CredentialKind`] fixes the shape of the [`Credential`] a provider of
//! that kind must produce. Prompt providers start from [`Credential::empty`]
//! and hand the record to a caller-supplied callback to populate.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Credential Kind
// =============================================================================

/// The closed set of credential shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Username and password
    Simple,
    /// Username only
    Username,
    /// Decision to trust a server certificate despite failures
    SslServerTrust,
    /// Path to a client certificate
    SslClientCert,
    /// Passphrase for a client certificate
    SslClientCertPw,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 5] = [
        CredentialKind::Simple,
        CredentialKind::Username,
        CredentialKind::SslServerTrust,
        CredentialKind::SslClientCert,
        CredentialKind::SslClientCertPw,
    ];

    /// Engine-level name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Simple => "svn.simple",
            CredentialKind::Username => "svn.username",
            CredentialKind::SslServerTrust => "svn.ssl.server",
            CredentialKind::SslClientCert => "svn.ssl.client-cert",
            CredentialKind::SslClientCertPw => "svn.ssl.client-passphrase",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simple" | "svn.simple" => Ok(CredentialKind::Simple),
            "username" | "svn.username" => Ok(CredentialKind::Username),
            "ssl-server-trust" | "ssl_server_trust" | "svn.ssl.server" => {
                Ok(CredentialKind::SslServerTrust)
            }
            "ssl-client-cert" | "ssl_client_cert" | "svn.ssl.client-cert" => {
                Ok(CredentialKind::SslClientCert)
            }
            "ssl-client-cert-pw" | "ssl_client_cert_pw" | "svn.ssl.client-passphrase" => {
                Ok(CredentialKind::SslClientCertPw)
            }
            _ => Err(Error::InvalidArgument(format!(
                "Invalid credential kind '{}'. Expected: simple, username, ssl-server-trust, ssl-client-cert, ssl-client-cert-pw",
                s
            ))),
        }
    }
}

// =============================================================================
// SSL Failures
// =============================================================================

/// Bitmask of certificate validation failures reported with a trust challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SslFailures(u32);

impl SslFailures {
    pub const NONE: SslFailures = SslFailures(0);
    pub const NOT_YET_VALID: SslFailures = SslFailures(0x0000_0001);
    pub const EXPIRED: SslFailures = SslFailures(0x0000_0002);
    pub const CN_MISMATCH: SslFailures = SslFailures(0x0000_0004);
    pub const UNKNOWN_CA: SslFailures = SslFailures(0x0000_0008);
    pub const OTHER: SslFailures = SslFailures(0x4000_0000);

    const NAMED: [(&'static str, SslFailures); 5] = [
        ("not-yet-valid", SslFailures::NOT_YET_VALID),
        ("expired", SslFailures::EXPIRED),
        ("cn-mismatch", SslFailures::CN_MISMATCH),
        ("unknown-ca", SslFailures::UNKNOWN_CA),
        ("other", SslFailures::OTHER),
    ];

    pub fn from_bits(bits: u32) -> Self {
        SslFailures(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: SslFailures) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse a failure name such as `unknown-ca`.
    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim().to_lowercase().replace('_', "-");
        SslFailures::NAMED
            .iter()
            .find(|(known, _)| *known == wanted)
            .map(|(_, flag)| *flag)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Invalid ssl failure '{}'. Expected: not-yet-valid, expired, cn-mismatch, unknown-ca, other",
                    name
                ))
            })
    }

    /// Names of the set flags, in mask order.
    pub fn names(&self) -> Vec<&'static str> {
        SslFailures::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for SslFailures {
    type Output = SslFailures;

    fn bitor(self, rhs: SslFailures) -> SslFailures {
        SslFailures(self.0 | rhs.0)
    }
}

impl BitOrAssign for SslFailures {
    fn bitor_assign(&mut self, rhs: SslFailures) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Credential
// =============================================================================

/// A credential record of one [`CredentialKind`].
///
/// `may_save` tells the registry whether the value may be cached once a
/// provider has produced it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Simple {
        username: String,
        password: String,
        may_save: bool,
    },
    Username {
        username: String,
        may_save: bool,
    },
    SslServerTrust {
        /// `None` means the certificate was not accepted.
        accepted_failures: Option<SslFailures>,
        may_save: bool,
    },
    SslClientCert {
        cert_file: PathBuf,
        may_save: bool,
    },
    SslClientCertPw {
        password: String,
        may_save: bool,
    },
}

impl Credential {
    /// An unpopulated record for `kind`.
    pub fn empty(kind: CredentialKind, may_save: bool) -> Self {
        match kind {
            CredentialKind::Simple => Credential::Simple {
                username: String::new(),
                password: String::new(),
                may_save,
            },
            CredentialKind::Username => Credential::Username {
                username: String::new(),
                may_save,
            },
            CredentialKind::SslServerTrust => Credential::SslServerTrust {
                accepted_failures: None,
                may_save,
            },
            CredentialKind::SslClientCert => Credential::SslClientCert {
                cert_file: PathBuf::new(),
                may_save,
            },
            CredentialKind::SslClientCertPw => Credential::SslClientCertPw {
                password: String::new(),
                may_save,
            },
        }
    }

    pub fn simple(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Simple {
            username: username.into(),
            password: password.into(),
            may_save: true,
        }
    }

    pub fn username(username: impl Into<String>) -> Self {
        Credential::Username {
            username: username.into(),
            may_save: true,
        }
    }

    pub fn server_trust(accepted_failures: SslFailures) -> Self {
        Credential::SslServerTrust {
            accepted_failures: Some(accepted_failures),
            may_save: true,
        }
    }

    pub fn client_cert(cert_file: impl Into<PathBuf>) -> Self {
        Credential::SslClientCert {
            cert_file: cert_file.into(),
            may_save: true,
        }
    }

    pub fn client_cert_pw(password: impl Into<String>) -> Self {
        Credential::SslClientCertPw {
            password: password.into(),
            may_save: true,
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Simple { .. } => CredentialKind::Simple,
            Credential::Username { .. } => CredentialKind::Username,
            Credential::SslServerTrust { .. } => CredentialKind::SslServerTrust,
            Credential::SslClientCert { .. } => CredentialKind::SslClientCert,
            Credential::SslClientCertPw { .. } => CredentialKind::SslClientCertPw,
        }
    }

    pub fn may_save(&self) -> bool {
        match self {
            Credential::Simple { may_save, .. }
            | Credential::Username { may_save, .. }
            | Credential::SslServerTrust { may_save, .. }
            | Credential::SslClientCert { may_save, .. }
            | Credential::SslClientCertPw { may_save, .. } => *may_save,
        }
    }

    pub fn set_may_save(&mut self, value: bool) {
        match self {
            Credential::Simple { may_save, .. }
            | Credential::Username { may_save, .. }
            | Credential::SslServerTrust { may_save, .. }
            | Credential::SslClientCert { may_save, .. }
            | Credential::SslClientCertPw { may_save, .. } => *may_save = value,
        }
    }

    /// Username carried by simple and username credentials.
    pub fn user(&self) -> Option<&str> {
        match self {
            Credential::Simple { username, .. } | Credential::Username { username, .. } => {
                Some(username.as_str())
            }
            _ => None,
        }
    }

    /// Whether the record holds a usable value.
    ///
    /// Passwords may be empty; the identifying field may not.
    pub fn is_complete(&self) -> bool {
        match self {
            Credential::Simple { username, .. } | Credential::Username { username, .. } => {
                !username.is_empty()
            }
            Credential::SslServerTrust {
                accepted_failures, ..
            } => accepted_failures.is_some(),
            Credential::SslClientCert { cert_file, .. } => !cert_file.as_os_str().is_empty(),
            Credential::SslClientCertPw { password, .. } => !password.is_empty(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Simple {
                username, may_save, ..
            } => f
                .debug_struct("Simple")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("may_save", may_save)
                .finish(),
            Credential::Username { username, may_save } => f
                .debug_struct("Username")
                .field("username", username)
                .field("may_save", may_save)
                .finish(),
            Credential::SslServerTrust {
                accepted_failures,
                may_save,
            } => f
                .debug_struct("SslServerTrust")
                .field("accepted_failures", accepted_failures)
                .field("may_save", may_save)
                .finish(),
            Credential::SslClientCert {
                cert_file,
                may_save,
            } => f
                .debug_struct("SslClientCert")
                .field("cert_file", cert_file)
                .field("may_save", may_save)
                .finish(),
            Credential::SslClientCertPw { may_save, .. } => f
                .debug_struct("SslClientCertPw")
                .field("password", &"<redacted>")
                .field("may_save", may_save)
                .finish(),
        }
    }
}
