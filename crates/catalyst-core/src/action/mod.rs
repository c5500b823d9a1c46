//! Action kinds and the runner that executes them.
//!
//! An action is selected by its kind string and configured by free-form JSON
//! data. [`ActionRunner`] is the single entry point used by every trigger:
//! it decodes the data, injects callback credentials for Python scripts and
//! enforces the per-invocation deadline.

pub mod python;
pub mod webhook;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use python::{Python, Sandbox};
pub use webhook::Webhook;

use crate::config::Config;
use crate::error::{CatalystError, Result};
use crate::reaction::{decode_data, Reaction};

/// Environment variable carrying the host application's base URL.
pub const APP_URL_ENV: &str = "CATALYST_APP_URL";
/// Environment variable carrying a bearer token for the host API.
pub const TOKEN_ENV: &str = "CATALYST_TOKEN";

// ---------------------------------------------------------------------------
// ActionKind / Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Python,
    Webhook,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Python => "python",
            ActionKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "python" => Ok(ActionKind::Python),
            "webhook" => Ok(ActionKind::Webhook),
            other => Err(CatalystError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Python(Python),
    Webhook(Webhook),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Python(_) => ActionKind::Python,
            Action::Webhook(_) => ActionKind::Webhook,
        }
    }
}

/// Decode action data for the given kind.
pub fn decode(kind: &str, data: &serde_json::Value) -> Result<Action> {
    match kind.parse::<ActionKind>()? {
        ActionKind::Python => decode_data(kind, data).map(Action::Python),
        ActionKind::Webhook => decode_data(kind, data).map(Action::Webhook),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Issues the API token handed to Python scripts, once per invocation.
pub trait TokenSource: Send + Sync {
    fn issue(&self) -> Result<String>;
}

/// A fixed token, typically from configuration.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn issue(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// ActionRunner
// ---------------------------------------------------------------------------

/// Executes actions. Cheap to share behind an `Arc`; holds no per-call state.
pub struct ActionRunner {
    app_url: String,
    tokens: Arc<dyn TokenSource>,
    http: reqwest::Client,
    sandbox: Sandbox,
    timeout: Option<Duration>,
}

impl ActionRunner {
    pub fn new(app_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            app_url: app_url.into(),
            tokens,
            http: reqwest::Client::new(),
            sandbox: Sandbox::default(),
            timeout: None,
        }
    }

    /// A runner configured from the `app_url`, `python` and
    /// `action_timeout_secs` settings.
    pub fn from_config(config: &Config, tokens: Arc<dyn TokenSource>) -> Self {
        let sandbox = Sandbox {
            interpreters: config.python.interpreters.clone(),
            temp_root: config.python.temp_root.clone(),
            env: Vec::new(),
        };
        Self::new(config.app_url.clone(), tokens)
            .with_sandbox(sandbox)
            .with_timeout(config.action_timeout())
    }

    /// Interpreter candidates and temp root for Python actions. Any `env`
    /// on the given sandbox is replaced by the runner's credentials.
    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Decode `data` as an action of `kind` and run it with `payload`.
    pub async fn run(&self, kind: &str, data: &serde_json::Value, payload: &str) -> Result<Vec<u8>> {
        let action = decode(kind, data)?;
        self.run_action(&action, payload).await
    }

    pub async fn run_reaction(&self, reaction: &Reaction, payload: &str) -> Result<Vec<u8>> {
        let action = reaction.decode_action()?;
        tracing::debug!(
            reaction_id = %reaction.id,
            action = %action.kind(),
            "running reaction action"
        );
        self.run_action(&action, payload).await
    }

    pub async fn run_action(&self, action: &Action, payload: &str) -> Result<Vec<u8>> {
        let execution = self.execute(action, payload);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| CatalystError::Timeout(limit))?,
            None => execution.await,
        }
    }

    async fn execute(&self, action: &Action, payload: &str) -> Result<Vec<u8>> {
        match action {
            Action::Python(python) => {
                let sandbox = self.sandbox.clone().with_env(self.credentials()?);
                python.run(&sandbox, payload).await
            }
            Action::Webhook(webhook) => webhook.run(&self.http, payload).await,
        }
    }

    fn credentials(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            (APP_URL_ENV.to_string(), self.app_url.clone()),
            (TOKEN_ENV.to_string(), self.tokens.issue()?),
        ])
    }
}
