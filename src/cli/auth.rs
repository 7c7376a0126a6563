//! svnctx auth command implementation
//!
//! Resolves one credential through the provider chain: config defaults
//! first, then a terminal prompt unless running non-interactively.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::debug;

use crate::config::Config;
use crate::credential::{Credential, CredentialKind};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::provider::PromptContext;
use crate::session::{Challenge, ClientSession};

pub struct AuthOptions {
    pub realm: String,
    pub kind: String,
    pub config: Config,
    pub output: OutputOptions,
}

#[derive(serde::Serialize)]
struct AuthReport {
    realm: String,
    kind: String,
    username: Option<String>,
    cached: bool,
    providers: usize,
}

pub fn run(options: AuthOptions) -> Result<()> {
    let kind: CredentialKind = options.kind.parse()?;
    if !matches!(kind, CredentialKind::Simple | CredentialKind::Username) {
        return Err(Error::InvalidArgument(format!(
            "auth supports simple and username credentials, not {kind}"
        )));
    }

    let mut session = ClientSession::with_config(&options.config)?;
    let retry_limit = options.config.session.retry_limit;
    match kind {
        CredentialKind::Username => {
            session.add_username_provider();
            if !options.config.session.non_interactive {
                session.add_username_prompt_provider(retry_limit, prompt_terminal);
            }
        }
        _ => {
            session.add_simple_provider();
            if !options.config.session.non_interactive {
                session.add_simple_prompt_provider(retry_limit, prompt_terminal);
            }
        }
    }
    let providers = session.auth().providers().len();
    debug!(session = %session.id(), %kind, providers, "resolving credential");

    let credential = session.resolve(&Challenge::new(kind, options.realm.clone()))?;
    let cached = session
        .auth()
        .parameters()
        .cached(kind, &options.realm)
        .is_some();

    let report = AuthReport {
        realm: options.realm,
        kind: kind.to_string(),
        username: credential.user().map(str::to_string),
        cached,
        providers,
    };

    let mut human = HumanOutput::new("svnctx auth: credential resolved");
    human.push_summary("realm", report.realm.clone());
    human.push_summary("kind", report.kind.clone());
    if let Some(username) = &report.username {
        human.push_summary("username", username.clone());
    }
    if !cached {
        human.push_warning("credential not cached (auth.no_auth_cache)");
    }

    emit_success(options.output, "auth", &report, Some(&human))
}

/// Ask on the terminal. End of input leaves the record empty.
fn prompt_terminal(cred: &mut Credential, ctx: &PromptContext<'_>) -> Result<()> {
    if ctx.prior_failures > 0 {
        eprintln!("Authentication failed, try again.");
    }
    eprintln!("Authentication realm: {}", ctx.realm);

    match cred {
        Credential::Simple {
            username, password, ..
        } => {
            let Some(user) = read_answer("Username", ctx.username)? else {
                return Ok(());
            };
            *username = user;
            if let Some(secret) = read_secret(&format!("Password for '{username}'"))? {
                *password = secret;
            }
        }
        Credential::Username { username, .. } => {
            if let Some(user) = read_answer("Username", ctx.username)? {
                *username = user;
            }
        }
        _ => {}
    }
    Ok(())
}

fn read_answer(label: &str, default: Option<&str>) -> Result<Option<String>> {
    let mut stderr = io::stderr();
    match default {
        Some(value) => write!(stderr, "{label} [{value}]: ")?,
        None => write!(stderr, "{label}: ")?,
    }
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim_end_matches(['\r', '\n']);
    if answer.is_empty() {
        return Ok(default.map(str::to_string));
    }
    Ok(Some(answer.to_string()))
}

/// Read a secret without echoing it.
///
/// Piped input carries no terminal to silence, so it is read as a plain line.
fn read_secret(label: &str) -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        return read_answer(label, None);
    }

    let mut stderr = io::stderr();
    write!(stderr, "{label}: ")?;
    stderr.flush()?;

    enable_raw_mode()?;
    let _raw = RawModeGuard;
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => break,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                eprint!("\r\n");
                return Err(Error::OperationCancelled);
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if secret.is_empty() {
                    eprint!("\r\n");
                    return Ok(None);
                }
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
    eprint!("\r\n");
    Ok(Some(secret))
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}
