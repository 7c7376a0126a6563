//! Credential providers.
//!
//! A [`CredentialProvider`] is one strategy for producing one kind of
//! credential. Static strategies derive the value from the registry
//! parameters (config defaults, environment); prompt strategies wrap a
//! caller-supplied callback in a [`PromptAdapter`] bounded by a retry limit.
//!
//! Both strategies implement [`CredentialSource`]. Providers never touch the
//! shared parameter map; caching is the registry's job once a provider
//! succeeds.

use std::fmt;
use std::path::PathBuf;

use tracing::trace;

use crate::credential::{Credential, CredentialKind, SslFailures};
use crate::error::{Error, Result};
use crate::registry::{params, AuthParameters};

/// Callback invoked by a prompt provider to populate a credential record.
pub type PromptFn = dyn Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync;

/// Custom static strategy.
pub type StaticFn = dyn Fn(&str, &AuthParameters) -> Option<Credential> + Send + Sync;

/// The narrow interface every strategy implements.
pub trait CredentialSource {
    /// Produce a credential for `realm`, or `None` when this source has nothing.
    fn produce(&self, realm: &str, parameters: &AuthParameters) -> Result<Option<Credential>>;
}

/// Context handed to a prompt callback.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub kind: CredentialKind,
    pub realm: &'a str,
    /// Number of attempts already rejected during this resolution.
    pub prior_failures: u32,
    /// Whether the record may be cached if the caller leaves it unchanged.
    pub may_save: bool,
    /// Username hint from the parameters, if any.
    pub username: Option<&'a str>,
    /// Certificate failures for server trust challenges.
    pub failures: SslFailures,
}

// =============================================================================
// Static strategies
// =============================================================================

/// Strategies that answer without asking anyone.
pub enum StaticStrategy {
    /// Username/password from `svn:auth:username` and `svn:auth:password`
    DefaultSimple,
    /// Username from `svn:auth:username`, then `$USER`/`$USERNAME`
    DefaultUsername,
    /// Trust a server whose failures are all in `svn:auth:ssl:trusted-failures`
    TrustedFailures,
    /// Client certificate path from `svn:auth:ssl:client-cert-file`
    ClientCertFile,
    /// Client certificate passphrase from `svn:auth:ssl:client-cert-password`
    ClientCertPassword,
    /// Caller-supplied derivation
    Custom(Box<StaticFn>),
}

impl StaticStrategy {
    fn name(&self) -> &'static str {
        match self {
            StaticStrategy::DefaultSimple => "default-simple",
            StaticStrategy::DefaultUsername => "default-username",
            StaticStrategy::TrustedFailures => "trusted-failures",
            StaticStrategy::ClientCertFile => "client-cert-file",
            StaticStrategy::ClientCertPassword => "client-cert-password",
            StaticStrategy::Custom(_) => "custom",
        }
    }
}

impl CredentialSource for StaticStrategy {
    fn produce(&self, realm: &str, parameters: &AuthParameters) -> Result<Option<Credential>> {
        let may_save = parameters.may_save();
        let mut cred = match self {
            StaticStrategy::DefaultSimple => {
                let Some(username) = parameters.text(params::DEFAULT_USERNAME) else {
                    return Ok(None);
                };
                let Some(password) = parameters.text(params::DEFAULT_PASSWORD) else {
                    return Ok(None);
                };
                Credential::simple(username, password)
            }
            StaticStrategy::DefaultUsername => {
                let username = parameters
                    .text(params::DEFAULT_USERNAME)
                    .map(str::to_string)
                    .or_else(os_username);
                match username {
                    Some(username) => Credential::username(username),
                    None => return Ok(None),
                }
            }
            StaticStrategy::TrustedFailures => {
                let failures = parameters.failures(params::SSL_SERVER_FAILURES);
                let trusted = parameters.failures(params::SSL_TRUSTED_FAILURES);
                if failures.bits() & !trusted.bits() != 0 {
                    return Ok(None);
                }
                Credential::server_trust(failures)
            }
            StaticStrategy::ClientCertFile => match parameters.text(params::SSL_CLIENT_CERT_FILE) {
                Some(path) => Credential::client_cert(PathBuf::from(path)),
                None => return Ok(None),
            },
            StaticStrategy::ClientCertPassword => {
                match parameters.text(params::SSL_CLIENT_CERT_PASSWORD) {
                    Some(password) => Credential::client_cert_pw(password),
                    None => return Ok(None),
                }
            }
            StaticStrategy::Custom(derive) => match derive(realm, parameters) {
                Some(cred) => cred,
                None => return Ok(None),
            },
        };
        if !may_save {
            cred.set_may_save(false);
        }
        Ok(Some(cred))
    }
}

fn os_username() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

// =============================================================================
// Prompt adapter
// =============================================================================

/// Bridges an interactive callback into the provider protocol.
///
/// Each attempt hands a fresh empty record to the callback. An attempt that
/// leaves the record incomplete counts as a failure; after `retry_limit`
/// retries the adapter gives up with [`Error::PromptRetryExceeded`].
pub struct PromptAdapter {
    kind: CredentialKind,
    retry_limit: u32,
    prompt: Box<PromptFn>,
}

impl PromptAdapter {
    pub fn new<F>(kind: CredentialKind, retry_limit: u32, prompt: F) -> Self
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            kind,
            retry_limit,
            prompt: Box::new(prompt),
        }
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }
}

impl CredentialSource for PromptAdapter {
    fn produce(&self, realm: &str, parameters: &AuthParameters) -> Result<Option<Credential>> {
        if parameters.flag(params::NON_INTERACTIVE) {
            return Ok(None);
        }

        let may_save = parameters.may_save();
        let attempts = self.retry_limit.saturating_add(1);
        for prior_failures in 0..attempts {
            let ctx = PromptContext {
                kind: self.kind,
                realm,
                prior_failures,
                may_save,
                username: parameters.text(params::DEFAULT_USERNAME),
                failures: parameters.failures(params::SSL_SERVER_FAILURES),
            };
            let mut cred = Credential::empty(self.kind, may_save);
            (self.prompt)(&mut cred, &ctx)?;

            if cred.kind() != self.kind {
                return Err(Error::InvalidArgument(format!(
                    "prompt for {} returned a {} credential",
                    self.kind,
                    cred.kind()
                )));
            }
            if cred.is_complete() {
                // The callback may have replaced the record wholesale
                if !may_save {
                    cred.set_may_save(false);
                }
                return Ok(Some(cred));
            }
            trace!(kind = %self.kind, realm, prior_failures, "prompt returned an empty credential");
        }

        Err(Error::PromptRetryExceeded {
            kind: self.kind,
            realm: realm.to_string(),
            attempts,
        })
    }
}

// =============================================================================
// Provider
// =============================================================================

/// How a provider produces its credential.
pub enum Strategy {
    Static(StaticStrategy),
    Prompt(PromptAdapter),
}

/// One registered link in the provider chain. Immutable once built.
pub struct CredentialProvider {
    kind: CredentialKind,
    strategy: Strategy,
}

impl CredentialProvider {
    pub fn new_static(kind: CredentialKind, strategy: StaticStrategy) -> Self {
        Self {
            kind,
            strategy: Strategy::Static(strategy),
        }
    }

    pub fn new_prompt<F>(kind: CredentialKind, retry_limit: u32, prompt: F) -> Self
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            kind,
            strategy: Strategy::Prompt(PromptAdapter::new(kind, retry_limit, prompt)),
        }
    }

    /// Static provider backed by a closure.
    pub fn from_fn<F>(kind: CredentialKind, derive: F) -> Self
    where
        F: Fn(&str, &AuthParameters) -> Option<Credential> + Send + Sync + 'static,
    {
        Self::new_static(kind, StaticStrategy::Custom(Box::new(derive)))
    }

    pub fn simple() -> Self {
        Self::new_static(CredentialKind::Simple, StaticStrategy::DefaultSimple)
    }

    pub fn username() -> Self {
        Self::new_static(CredentialKind::Username, StaticStrategy::DefaultUsername)
    }

    pub fn ssl_server_trust() -> Self {
        Self::new_static(CredentialKind::SslServerTrust, StaticStrategy::TrustedFailures)
    }

    pub fn ssl_client_cert() -> Self {
        Self::new_static(CredentialKind::SslClientCert, StaticStrategy::ClientCertFile)
    }

    pub fn ssl_client_cert_pw() -> Self {
        Self::new_static(CredentialKind::SslClientCertPw, StaticStrategy::ClientCertPassword)
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Retry limit for prompt providers; `None` for static ones.
    pub fn retry_limit(&self) -> Option<u32> {
        match &self.strategy {
            Strategy::Static(_) => None,
            Strategy::Prompt(adapter) => Some(adapter.retry_limit()),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.strategy, Strategy::Prompt(_))
    }
}

impl CredentialSource for CredentialProvider {
    fn produce(&self, realm: &str, parameters: &AuthParameters) -> Result<Option<Credential>> {
        let produced = match &self.strategy {
            Strategy::Static(strategy) => strategy.produce(realm, parameters)?,
            Strategy::Prompt(adapter) => adapter.produce(realm, parameters)?,
        };
        Ok(produced.filter(|cred| cred.kind() == self.kind && cred.is_complete()))
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Static(strategy) => strategy.name().to_string(),
            Strategy::Prompt(adapter) => format!("prompt(retry_limit={})", adapter.retry_limit),
        };
        f.debug_struct("CredentialProvider")
            .field("kind", &self.kind)
            .field("strategy", &strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AuthParam;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_simple_needs_both_parameters() {
        let mut parameters = AuthParameters::default();
        let provider = CredentialProvider::simple();
        assert!(provider.produce("r", &parameters).unwrap().is_none());

        parameters.set(params::DEFAULT_USERNAME, AuthParam::Text("alice".into()));
        assert!(provider.produce("r", &parameters).unwrap().is_none());

        parameters.set(params::DEFAULT_PASSWORD, AuthParam::Text("pw".into()));
        let cred = provider.produce("r", &parameters).unwrap().unwrap();
        assert_eq!(cred, Credential::simple("alice", "pw"));
    }

    #[test]
    fn no_auth_cache_clears_may_save() {
        let mut parameters = AuthParameters::default();
        parameters.set(params::DEFAULT_USERNAME, AuthParam::Text("bob".into()));
        parameters.set(params::NO_AUTH_CACHE, AuthParam::Flag(true));
        let cred = CredentialProvider::username()
            .produce("r", &parameters)
            .unwrap()
            .unwrap();
        assert!(!cred.may_save());
    }

    #[test]
    fn trusted_failures_cover_challenge() {
        let mut parameters = AuthParameters::default();
        parameters.set(
            params::SSL_SERVER_FAILURES,
            AuthParam::Failures(SslFailures::UNKNOWN_CA | SslFailures::EXPIRED),
        );
        parameters.set(
            params::SSL_TRUSTED_FAILURES,
            AuthParam::Failures(SslFailures::UNKNOWN_CA),
        );
        let provider = CredentialProvider::ssl_server_trust();
        assert!(provider.produce("r", &parameters).unwrap().is_none());

        parameters.set(
            params::SSL_TRUSTED_FAILURES,
            AuthParam::Failures(SslFailures::UNKNOWN_CA | SslFailures::EXPIRED),
        );
        assert!(provider.produce("r", &parameters).unwrap().is_some());
    }

    #[test]
    fn prompt_gives_up_after_retry_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let provider = CredentialProvider::new_prompt(CredentialKind::Username, 1, move |_, ctx| {
            assert_eq!(ctx.prior_failures, seen.fetch_add(1, Ordering::SeqCst));
            Ok(())
        });

        let err = provider
            .produce("realm", &AuthParameters::default())
            .unwrap_err();
        assert!(matches!(err, Error::PromptRetryExceeded { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prompt_sees_server_failures() {
        let mut parameters = AuthParameters::default();
        parameters.set(
            params::SSL_SERVER_FAILURES,
            AuthParam::Failures(SslFailures::CN_MISMATCH),
        );
        let provider = CredentialProvider::new_prompt(CredentialKind::SslServerTrust, 0, |cred, ctx| {
            *cred = Credential::server_trust(ctx.failures);
            Ok(())
        });
        let cred = provider.produce("https://host:443", &parameters).unwrap().unwrap();
        assert_eq!(cred, Credential::server_trust(SslFailures::CN_MISMATCH));
    }

    #[test]
    fn prompt_skipped_when_non_interactive() {
        let mut parameters = AuthParameters::default();
        parameters.set(params::NON_INTERACTIVE, AuthParam::Flag(true));
        let provider = CredentialProvider::new_prompt(CredentialKind::Simple, 3, |_, _| {
            panic!("prompt must not run")
        });
        assert!(provider.produce("r", &parameters).unwrap().is_none());
    }

    #[test]
    fn prompt_returning_wrong_kind_is_rejected() {
        let provider = CredentialProvider::new_prompt(CredentialKind::Simple, 0, |cred, _| {
            *cred = Credential::username("mallory");
            Ok(())
        });
        let err = provider.produce("r", &AuthParameters::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
