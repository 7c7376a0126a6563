//! Configuration loading and management
//!
//! Handles parsing of `svnctx.toml` configuration files.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential::SslFailures;
use crate::error::{Error, Result};
use crate::registry::{params, AuthParam, AuthParameters};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "SVNCTX_CONFIG";

const CONFIG_FILE: &str = "svnctx.toml";

/// Upper bound for `session.retry_limit`
const MAX_RETRY_LIMIT: u32 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default credential parameters
    #[serde(default)]
    pub auth: AuthConfig,

    /// Session behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Credential defaults handed to static providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Never cache credentials for reuse
    #[serde(default)]
    pub no_auth_cache: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_client_cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_client_cert_password: Option<String>,

    /// Server certificate failures accepted without asking (e.g. `unknown-ca`)
    #[serde(default)]
    pub ssl_trusted_failures: Vec<String>,
}

/// Session-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Never prompt; interactive providers yield nothing
    #[serde(default)]
    pub non_interactive: bool,

    /// Extra prompt attempts after the first
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_retry_limit() -> u32 {
    2
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            non_interactive: false,
            retry_limit: default_retry_limit(),
        }
    }
}

impl AuthConfig {
    /// Mask of the configured trusted failures.
    pub fn trusted_failures(&self) -> Result<SslFailures> {
        let mut mask = SslFailures::NONE;
        for name in &self.ssl_trusted_failures {
            mask |= SslFailures::from_name(name).map_err(|_| {
                Error::InvalidConfig(format!(
                    "auth.ssl_trusted_failures: unknown failure '{name}' (expected not-yet-valid|expired|cn-mismatch|unknown-ca|other)"
                ))
            })?;
        }
        Ok(mask)
    }

    fn validate(&self) -> Result<()> {
        if let Some(username) = &self.username {
            if username.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "auth.username cannot be empty".to_string(),
                ));
            }
        }
        if let Some(cert) = &self.ssl_client_cert_file {
            if cert.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "auth.ssl_client_cert_file cannot be empty".to_string(),
                ));
            }
        }
        self.trusted_failures()?;
        Ok(())
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if self.retry_limit > MAX_RETRY_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "session.retry_limit must be <= {MAX_RETRY_LIMIT}"
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `$SVNCTX_CONFIG`, else the platform config file, else defaults.
    ///
    /// An explicitly named file must exist; the platform file is optional.
    pub fn load_default() -> Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load(Path::new(&explicit));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Platform location of the user config file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "svnctx").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parameters a new session's registry starts from.
    pub fn auth_parameters(&self) -> Result<AuthParameters> {
        let mut parameters = AuthParameters::new();
        let auth = &self.auth;

        if let Some(username) = &auth.username {
            parameters.set(params::DEFAULT_USERNAME, AuthParam::Text(username.clone()));
        }
        if let Some(password) = &auth.password {
            parameters.set(params::DEFAULT_PASSWORD, AuthParam::Text(password.clone()));
        }
        if auth.no_auth_cache {
            parameters.set(params::NO_AUTH_CACHE, AuthParam::Flag(true));
        }
        if self.session.non_interactive {
            parameters.set(params::NON_INTERACTIVE, AuthParam::Flag(true));
        }
        if let Some(cert) = &auth.ssl_client_cert_file {
            parameters.set(
                params::SSL_CLIENT_CERT_FILE,
                AuthParam::Text(cert.to_string_lossy().into_owned()),
            );
        }
        if let Some(password) = &auth.ssl_client_cert_password {
            parameters.set(
                params::SSL_CLIENT_CERT_PASSWORD,
                AuthParam::Text(password.clone()),
            );
        }
        let trusted = auth.trusted_failures()?;
        if !trusted.is_empty() {
            parameters.set(params::SSL_TRUSTED_FAILURES, AuthParam::Failures(trusted));
        }

        Ok(parameters)
    }

    fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.session.validate()?;
        Ok(())
    }
}
