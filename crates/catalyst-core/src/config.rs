use crate::error::{CatalystError, Result};
use crate::pool::{DispatchMode, DEFAULT_QUEUE, DEFAULT_WORKERS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_CONFIG_FILE: &str = "catalyst.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue")]
    pub queue: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue() -> usize {
    DEFAULT_QUEUE
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            workers: default_workers(),
            queue: default_queue(),
        }
    }
}

// ---------------------------------------------------------------------------
// PythonConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    #[serde(default = "default_interpreters")]
    pub interpreters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

fn default_interpreters() -> Vec<String> {
    crate::action::python::DEFAULT_INTERPRETERS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
            temp_root: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL scripts use to call back into the host API.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Reaction database; relative paths resolve against the config file's directory.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// `None` or `0` disables the per-invocation deadline.
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: Option<u64>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub python: PythonConfig,
}

fn default_app_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("catalyst.redb")
}

fn default_action_timeout() -> Option<u64> {
    Some(300)
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            listen: default_listen(),
            database: default_database(),
            api_token: None,
            dispatch: DispatchConfig::default(),
            action_timeout_secs: default_action_timeout(),
            max_body_bytes: default_max_body_bytes(),
            python: PythonConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalystError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CatalystError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// The configured `api_token`, or a random one for this process when it
    /// is unset or blank.
    pub fn api_token_or_ephemeral(&self) -> String {
        match self.api_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("no api_token configured; python actions get an ephemeral token");
                Uuid::new_v4().simple().to_string()
            }
        }
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Resolve the database path for a config file located at `config_path`.
    pub fn database_path(&self, config_path: &Path) -> PathBuf {
        if self.database.is_absolute() {
            return self.database.clone();
        }
        match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(&self.database),
            _ => self.database.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level, message: String| warnings.push(ConfigWarning { level, message });

        if self.python.interpreters.is_empty() {
            push(
                WarnLevel::Error,
                "python.interpreters is empty; python actions cannot run".to_string(),
            );
        }

        if self.dispatch.mode == DispatchMode::Pool {
            if self.dispatch.workers == 0 {
                push(WarnLevel::Error, "dispatch.workers must be at least 1".to_string());
            }
            if self.dispatch.queue == 0 {
                push(WarnLevel::Error, "dispatch.queue must be at least 1".to_string());
            }
        }

        if self.max_body_bytes == 0 {
            push(
                WarnLevel::Error,
                "max_body_bytes is 0; every webhook request body will be rejected".to_string(),
            );
        }

        match url::Url::parse(&self.app_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => push(
                WarnLevel::Warning,
                format!("app_url '{}' uses scheme '{}', expected http or https", self.app_url, parsed.scheme()),
            ),
            Err(e) => push(
                WarnLevel::Warning,
                format!("app_url '{}' is not a valid URL: {e}", self.app_url),
            ),
        }

        if !self.api_token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            push(
                WarnLevel::Warning,
                "api_token is not set; an ephemeral token is generated at startup".to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
