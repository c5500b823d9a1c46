use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalystError {
    #[error("action {0:?} not found")]
    UnknownAction(String),

    #[error("trigger {0:?} not found")]
    UnknownTrigger(String),

    #[error("event {0:?} not found")]
    UnknownEvent(String),

    #[error("failed to decode {kind} data: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("python interpreter not found (tried: {0})")]
    InterpreterNotFound(String),

    #[error("failed to setup python: {0}")]
    PythonSetup(String),

    #[error("failed to install requirements: {0}")]
    RequirementsInstall(String),

    #[error("failed to run script: {0}")]
    ScriptFailed(String),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("reaction not found: {0}")]
    ReactionNotFound(String),

    #[error("reaction already exists: {0}")]
    ReactionExists(String),

    #[error("reaction store error: {0}")]
    Store(String),

    #[error("failed to issue api token: {0}")]
    Token(String),

    #[error("task pool is shut down")]
    PoolClosed,

    #[error("failed to load {} schedule reaction(s): {}", .0.len(), .0.join("; "))]
    ScheduleLoad(Vec<String>),

    #[error("config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalystError>;
