//! Authentication registry
//!
//! Holds the ordered provider chain and the shared parameter map. Providers
//! are tried in registration order; the first to produce a credential of the
//! requested kind wins and is cached in the parameters under `(kind, realm)`.
//!
//! Every registration bumps the registry version. An [`AuthToken`] handed out
//! earlier stops being current at that point, so nothing can keep resolving
//! against a stale view of the chain.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::credential::{Credential, CredentialKind, SslFailures};
use crate::error::{Error, Result};
use crate::provider::{CredentialProvider, CredentialSource};

/// Well-known parameter keys.
pub mod params {
    pub const DEFAULT_USERNAME: &str = "svn:auth:username";
    pub const DEFAULT_PASSWORD: &str = "svn:auth:password";
    pub const NO_AUTH_CACHE: &str = "svn:auth:no-auth-cache";
    pub const NON_INTERACTIVE: &str = "svn:auth:non-interactive";
    pub const SSL_SERVER_FAILURES: &str = "svn:auth:ssl:failures";
    pub const SSL_TRUSTED_FAILURES: &str = "svn:auth:ssl:trusted-failures";
    pub const SSL_CLIENT_CERT_FILE: &str = "svn:auth:ssl:client-cert-file";
    pub const SSL_CLIENT_CERT_PASSWORD: &str = "svn:auth:ssl:client-cert-password";

    pub(crate) const CACHE_PREFIX: &str = "svnctx:cache:";
}

/// An opaque parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthParam {
    Text(String),
    Flag(bool),
    Failures(SslFailures),
    Credential(Credential),
}

/// String-keyed parameter map shared by every provider call of one registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParameters {
    values: BTreeMap<String, AuthParam>,
}

impl AuthParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AuthParam> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: AuthParam) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<AuthParam> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(AuthParam::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// A flag parameter; absent or non-flag values read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(AuthParam::Flag(true)))
    }

    pub fn failures(&self, key: &str) -> SslFailures {
        match self.values.get(key) {
            Some(AuthParam::Failures(mask)) => *mask,
            _ => SslFailures::NONE,
        }
    }

    /// Default `may_save` for new credential records.
    pub fn may_save(&self) -> bool {
        !self.flag(params::NO_AUTH_CACHE)
    }

    /// Overlay `other` onto this map; keys in `other` win.
    pub fn merge(&mut self, other: AuthParameters) {
        self.values.extend(other.values);
    }

    pub fn cached(&self, kind: CredentialKind, realm: &str) -> Option<&Credential> {
        match self.values.get(&cache_key(kind, realm)) {
            Some(AuthParam::Credential(cred)) => Some(cred),
            _ => None,
        }
    }

    fn cache(&mut self, realm: &str, cred: Credential) {
        self.values
            .insert(cache_key(cred.kind(), realm), AuthParam::Credential(cred));
    }

    fn uncache(&mut self, kind: CredentialKind, realm: &str) -> bool {
        self.values.remove(&cache_key(kind, realm)).is_some()
    }
}

fn cache_key(kind: CredentialKind, realm: &str) -> String {
    format!("{}{}:{}", params::CACHE_PREFIX, kind.as_str(), realm)
}

/// Snapshot identity of a registry's provider chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    pub version: u64,
    pub providers: usize,
}

/// Ordered provider chain plus parameters.
#[derive(Debug, Default)]
pub struct AuthRegistry {
    providers: Vec<CredentialProvider>,
    parameters: AuthParameters,
    version: u64,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider and rebuild the token.
    pub fn register(&mut self, provider: CredentialProvider) -> AuthToken {
        debug!(kind = %provider.kind(), interactive = provider.is_interactive(), "registering credential provider");
        self.providers.push(provider);
        self.version += 1;
        self.token()
    }

    pub fn providers(&self) -> &[CredentialProvider] {
        &self.providers
    }

    pub fn parameters(&self) -> &AuthParameters {
        &self.parameters
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: AuthParam) {
        self.parameters.set(key, value);
    }

    /// Merge externally supplied parameters without touching provider order.
    pub fn update_parameters(&mut self, parameters: AuthParameters) {
        self.parameters.merge(parameters);
    }

    pub fn token(&self) -> AuthToken {
        AuthToken {
            version: self.version,
            providers: self.providers.len(),
        }
    }

    pub fn is_current(&self, token: &AuthToken) -> bool {
        *token == self.token()
    }

    /// Find a credential of `kind` for `realm`.
    ///
    /// A cached value short-circuits the chain. Otherwise providers of the
    /// matching kind run in registration order until one succeeds; a prompt
    /// provider that exhausts its retries is skipped. Any other provider
    /// error (including cancellation from a prompt) propagates immediately.
    pub fn resolve(&mut self, kind: CredentialKind, realm: &str) -> Result<Credential> {
        if let Some(cred) = self.parameters.cached(kind, realm) {
            trace!(%kind, realm, "credential cache hit");
            return Ok(cred.clone());
        }

        for (index, provider) in self
            .providers
            .iter()
            .enumerate()
            .filter(|(_, provider)| provider.kind() == kind)
        {
            match provider.produce(realm, &self.parameters) {
                Ok(Some(cred)) => {
                    debug!(%kind, realm, index, "credential provider succeeded");
                    if cred.may_save() && self.parameters.may_save() {
                        self.parameters.cache(realm, cred.clone());
                    }
                    return Ok(cred);
                }
                Ok(None) => {
                    trace!(%kind, realm, index, "credential provider had nothing");
                }
                Err(Error::PromptRetryExceeded { attempts, .. }) => {
                    debug!(%kind, realm, index, attempts, "prompt provider exhausted its retries");
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::NoCredentialAvailable {
            kind,
            realm: realm.to_string(),
        })
    }

    /// Drop a cached credential, e.g. after the server rejected it.
    pub fn forget(&mut self, kind: CredentialKind, realm: &str) -> bool {
        self.parameters.uncache(kind, realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recording(
        log: &Arc<Mutex<Vec<usize>>>,
        id: usize,
        succeed: bool,
    ) -> CredentialProvider {
        let log = Arc::clone(log);
        CredentialProvider::from_fn(CredentialKind::Username, move |_, _| {
            log.lock().unwrap().push(id);
            succeed.then(|| Credential::username(format!("user{id}")))
        })
    }

    #[test]
    fn resolve_stops_at_first_success_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AuthRegistry::new();
        registry.register(recording(&log, 0, false));
        registry.register(recording(&log, 1, false));
        registry.register(recording(&log, 2, true));
        registry.register(recording(&log, 3, true));

        let cred = registry.resolve(CredentialKind::Username, "r").unwrap();
        assert_eq!(cred.user(), Some("user2"));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn providers_of_other_kinds_are_not_tried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = AuthRegistry::new();
        registry.register(CredentialProvider::from_fn(CredentialKind::Simple, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(Credential::simple("a", "b"))
        }));

        let err = registry.resolve(CredentialKind::Username, "r").unwrap_err();
        assert!(matches!(err, Error::NoCredentialAvailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_invalidates_previous_token() {
        let mut registry = AuthRegistry::new();
        let first = registry.register(CredentialProvider::username());
        assert!(registry.is_current(&first));

        let second = registry.register(CredentialProvider::simple());
        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));
        assert_eq!(second.providers, 2);
    }

    #[test]
    fn update_parameters_keeps_cache_and_order() {
        let mut registry = AuthRegistry::new();
        registry.register(CredentialProvider::username());
        registry.register(CredentialProvider::simple());
        let token = registry.token();

        let mut defaults = AuthParameters::new();
        defaults.set(params::DEFAULT_USERNAME, AuthParam::Text("carol".into()));
        registry.update_parameters(defaults);

        assert!(registry.is_current(&token));
        assert_eq!(registry.providers()[0].kind(), CredentialKind::Username);
        let cred = registry.resolve(CredentialKind::Username, "r").unwrap();
        assert_eq!(cred.user(), Some("carol"));
    }

    #[test]
    fn forget_forces_the_chain_to_run_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = AuthRegistry::new();
        registry.register(CredentialProvider::from_fn(CredentialKind::Username, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(Credential::username("dave"))
        }));

        registry.resolve(CredentialKind::Username, "r").unwrap();
        registry.resolve(CredentialKind::Username, "r").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(registry.forget(CredentialKind::Username, "r"));
        assert!(!registry.forget(CredentialKind::Username, "r"));
        registry.resolve(CredentialKind::Username, "r").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsaveable_credentials_are_not_cached() {
        let mut registry = AuthRegistry::new();
        registry.set_parameter(params::NO_AUTH_CACHE, AuthParam::Flag(true));
        registry.set_parameter(params::DEFAULT_USERNAME, AuthParam::Text("erin".into()));
        registry.register(CredentialProvider::username());

        registry.resolve(CredentialKind::Username, "r").unwrap();
        assert!(registry.parameters().cached(CredentialKind::Username, "r").is_none());
    }

    #[test]
    fn no_auth_cache_covers_custom_and_replaced_records() {
        let calls = Arc::new(AtomicUsize::new(0));
        let custom_calls = Arc::clone(&calls);
        let prompt_calls = Arc::clone(&calls);

        let mut registry = AuthRegistry::new();
        registry.set_parameter(params::NO_AUTH_CACHE, AuthParam::Flag(true));
        registry.register(CredentialProvider::from_fn(CredentialKind::Simple, move |_, _| {
            custom_calls.fetch_add(1, Ordering::SeqCst);
            Some(Credential::simple("gina", "pw"))
        }));
        registry.register(CredentialProvider::new_prompt(CredentialKind::Username, 0, move |cred, _| {
            prompt_calls.fetch_add(1, Ordering::SeqCst);
            *cred = Credential::username("hal");
            Ok(())
        }));

        for kind in [CredentialKind::Simple, CredentialKind::Username] {
            assert!(!registry.resolve(kind, "r").unwrap().may_save());
            registry.resolve(kind, "r").unwrap();
            assert!(registry.parameters().cached(kind, "r").is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn prompt_error_other_than_retry_propagates() {
        let mut registry = AuthRegistry::new();
        registry.register(CredentialProvider::new_prompt(CredentialKind::Simple, 2, |_, _| {
            Err(Error::OperationCancelled)
        }));
        registry.register(CredentialProvider::from_fn(CredentialKind::Simple, |_, _| {
            Some(Credential::simple("never", "reached"))
        }));

        let err = registry.resolve(CredentialKind::Simple, "r").unwrap_err();
        assert!(err.is_cancelled());
    }
}
