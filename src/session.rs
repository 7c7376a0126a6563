//! Client session: the per-operation-stream context object.
//!
//! A [`ClientSession`] owns one [`AuthRegistry`] and one [`CallbackSlots`].
//! Every command takes it as its capability object. A session may run
//! operations one after another but is not meant for concurrent use; run
//! several sessions for that.

use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::adm::{AdmLockHierarchy, Depth};
use crate::callbacks::{CallbackSlots, CommitItem, Notify};
use crate::config::Config;
use crate::credential::{Credential, CredentialKind};
use crate::error::Result;
use crate::provider::{CredentialProvider, PromptContext};
use crate::registry::{AuthParameters, AuthRegistry, AuthToken};

/// An authentication challenge raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub kind: CredentialKind,
    pub realm: String,
}

impl Challenge {
    pub fn new(kind: CredentialKind, realm: impl Into<String>) -> Self {
        Self {
            kind,
            realm: realm.into(),
        }
    }
}

#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    auth: AuthRegistry,
    callbacks: CallbackSlots,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "client session created");
        Self {
            id,
            auth: AuthRegistry::new(),
            callbacks: CallbackSlots::new(),
        }
    }

    /// New session whose registry starts from the config's auth parameters.
    pub fn with_config(config: &Config) -> Result<Self> {
        let mut session = Self::new();
        session.auth.update_parameters(config.auth_parameters()?);
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn auth(&self) -> &AuthRegistry {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut AuthRegistry {
        &mut self.auth
    }

    pub fn callbacks(&self) -> &CallbackSlots {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackSlots {
        &mut self.callbacks
    }

    // =========================================================================
    // Provider registration
    // =========================================================================

    pub fn add_provider(&mut self, provider: CredentialProvider) -> AuthToken {
        self.auth.register(provider)
    }

    pub fn add_simple_provider(&mut self) -> AuthToken {
        self.add_provider(CredentialProvider::simple())
    }

    pub fn add_username_provider(&mut self) -> AuthToken {
        self.add_provider(CredentialProvider::username())
    }

    pub fn add_ssl_server_trust_provider(&mut self) -> AuthToken {
        self.add_provider(CredentialProvider::ssl_server_trust())
    }

    pub fn add_ssl_client_cert_provider(&mut self) -> AuthToken {
        self.add_provider(CredentialProvider::ssl_client_cert())
    }

    pub fn add_ssl_client_cert_pw_provider(&mut self) -> AuthToken {
        self.add_provider(CredentialProvider::ssl_client_cert_pw())
    }

    pub fn add_simple_prompt_provider<F>(&mut self, retry_limit: u32, prompt: F) -> AuthToken
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_provider(CredentialProvider::new_prompt(
            CredentialKind::Simple,
            retry_limit,
            prompt,
        ))
    }

    pub fn add_username_prompt_provider<F>(&mut self, retry_limit: u32, prompt: F) -> AuthToken
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_provider(CredentialProvider::new_prompt(
            CredentialKind::Username,
            retry_limit,
            prompt,
        ))
    }

    /// Server trust is a single yes/no question, so it never retries.
    pub fn add_ssl_server_trust_prompt_provider<F>(&mut self, prompt: F) -> AuthToken
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_provider(CredentialProvider::new_prompt(
            CredentialKind::SslServerTrust,
            0,
            prompt,
        ))
    }

    pub fn add_ssl_client_cert_prompt_provider<F>(&mut self, retry_limit: u32, prompt: F) -> AuthToken
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_provider(CredentialProvider::new_prompt(
            CredentialKind::SslClientCert,
            retry_limit,
            prompt,
        ))
    }

    pub fn add_ssl_client_cert_pw_prompt_provider<F>(
        &mut self,
        retry_limit: u32,
        prompt: F,
    ) -> AuthToken
    where
        F: Fn(&mut Credential, &PromptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_provider(CredentialProvider::new_prompt(
            CredentialKind::SslClientCertPw,
            retry_limit,
            prompt,
        ))
    }

    pub fn update_auth_parameters(&mut self, parameters: AuthParameters) {
        self.auth.update_parameters(parameters);
    }

    // =========================================================================
    // Callback slots
    // =========================================================================

    pub fn set_log_message<F>(&mut self, handler: F)
    where
        F: Fn(&[CommitItem]) -> Result<Option<String>> + Send + Sync + 'static,
    {
        self.callbacks.set_log_message(Some(Box::new(handler)));
    }

    pub fn set_notification<F>(&mut self, handler: F)
    where
        F: Fn(&Notify) + Send + Sync + 'static,
    {
        self.callbacks.set_notification(Some(Box::new(handler)));
    }

    pub fn set_cancellation<F>(&mut self, handler: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.callbacks.set_cancellation(Some(Box::new(handler)));
    }

    /// Restore the no-op log message hook.
    pub fn clear_log_message(&mut self) {
        self.callbacks.set_log_message(None);
    }

    /// Restore the no-op notification hook.
    pub fn clear_notification(&mut self) {
        self.callbacks.set_notification(None);
    }

    /// Restore the never-cancel hook.
    pub fn clear_cancellation(&mut self) {
        self.callbacks.set_cancellation(None);
    }

    // =========================================================================
    // Operation support
    // =========================================================================

    /// Answer an authentication challenge from the provider chain.
    pub fn resolve(&mut self, challenge: &Challenge) -> Result<Credential> {
        self.auth.resolve(challenge.kind, &challenge.realm)
    }

    pub fn log_message(&self, items: &[CommitItem]) -> Result<Option<String>> {
        self.callbacks.log_message(items)
    }

    pub fn notify(&self, event: &Notify) {
        self.callbacks.notify(event);
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.callbacks.check_cancelled()
    }

    /// Run `op` with `path` probe-opened, closing the hierarchy afterwards.
    ///
    /// The session's cancellation hook is polled while locks are acquired.
    /// The hierarchy is closed on every exit path; an error from `op` wins
    /// over an error from closing.
    pub fn with_locked<T, F>(
        &mut self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: Depth,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Self, &mut AdmLockHierarchy) -> Result<T>,
    {
        let mut hierarchy = AdmLockHierarchy::probe_open(
            path,
            write_lock,
            depth,
            self.callbacks.cancellation_handler(),
        )?;

        let outcome = op(self, &mut hierarchy);
        let closed = if hierarchy.root().is_locked() {
            hierarchy.close()
        } else {
            Ok(())
        };

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(session = %self.id, error = %close_err, "failed to close hierarchy after error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::{params, AuthParam};

    #[test]
    fn sessions_do_not_share_state() {
        let mut first = ClientSession::new();
        let second = ClientSession::new();
        first.add_username_provider();
        first.set_cancellation(|| true);

        assert_ne!(first.id(), second.id());
        assert_eq!(second.auth().providers().len(), 0);
        assert!(first.check_cancelled().is_err());
        assert!(second.check_cancelled().is_ok());
    }

    #[test]
    fn resolve_answers_challenge() {
        let mut session = ClientSession::new();
        session
            .auth_mut()
            .set_parameter(params::DEFAULT_USERNAME, AuthParam::Text("frank".into()));
        session.add_username_provider();

        let cred = session
            .resolve(&Challenge::new(CredentialKind::Username, "svn://host"))
            .unwrap();
        assert_eq!(cred.user(), Some("frank"));

        let err = session
            .resolve(&Challenge::new(CredentialKind::Simple, "svn://host"))
            .unwrap_err();
        assert!(matches!(err, Error::NoCredentialAvailable { .. }));
    }

    #[test]
    fn clearing_notification_restores_default() {
        let mut session = ClientSession::new();
        session.set_notification(|_: &Notify| panic!("cleared handler ran"));
        session.clear_notification();
        session.notify(&Notify::new("a", crate::callbacks::NotifyAction::Add));
    }
}
