//! Python sandbox action.
//!
//! Every invocation gets a private temporary directory holding a fresh
//! virtual environment, the optional `requirements.txt` and the script. The
//! directory is owned by a [`TempDir`] guard, so it is removed however the
//! run ends: success, error, panic, or the future being dropped on timeout.
//! Child processes are spawned with `kill_on_drop` for the same reason.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;

use crate::error::{CatalystError, Result};

pub const DEFAULT_INTERPRETERS: &[&str] = &["python3", "python"];

const WORKDIR_PREFIX: &str = "catalyst_action";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Python {
    /// pip-style dependency list; blank means no install step.
    #[serde(default, alias = "bootstrap")]
    pub requirements: String,
    pub script: String,
}

/// Where and how a Python action runs.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Interpreter names tried in order; the first one on `PATH` wins.
    pub interpreters: Vec<String>,
    /// Parent for per-invocation directories (OS temp dir when `None`).
    pub temp_root: Option<PathBuf>,
    /// The complete environment of the script process.
    pub env: Vec<(String, String)>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            interpreters: DEFAULT_INTERPRETERS.iter().map(|s| s.to_string()).collect(),
            temp_root: None,
            env: Vec::new(),
        }
    }
}

impl Sandbox {
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    fn workdir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

/// Locate the first available interpreter among `candidates`.
pub fn find_interpreter(candidates: &[String]) -> Result<PathBuf> {
    candidates
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| CatalystError::InterpreterNotFound(candidates.join(", ")))
}

impl Python {
    pub async fn run(&self, sandbox: &Sandbox, payload: &str) -> Result<Vec<u8>> {
        let interpreter = find_interpreter(&sandbox.interpreters)?;
        let workdir = sandbox.workdir()?;
        let venv = workdir.path().join("venv");
        let has_requirements = !self.requirements.trim().is_empty();

        let mut setup = Command::new(&interpreter);
        setup.arg("-m").arg("venv");
        if !has_requirements {
            setup.arg("--without-pip");
        }
        setup.arg(&venv);
        run_step(&mut setup)
            .await
            .map_err(CatalystError::PythonSetup)?;

        if has_requirements {
            let requirements = workdir.path().join("requirements.txt");
            tokio::fs::write(&requirements, &self.requirements).await?;
            let mut install = Command::new(venv_executable(&venv, "pip"));
            install.arg("install").arg("-r").arg(&requirements);
            run_step(&mut install)
                .await
                .map_err(CatalystError::RequirementsInstall)?;
        }

        let script = workdir.path().join("script.py");
        tokio::fs::write(&script, &self.script).await?;

        let mut run = Command::new(venv_executable(&venv, "python"));
        run.arg(&script)
            .arg(payload)
            .current_dir(workdir.path())
            .env_clear()
            .envs(sandbox.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let stdout = run_step(&mut run).await.map_err(CatalystError::ScriptFailed)?;

        drop(workdir);
        Ok(stdout)
    }
}

fn venv_executable(venv: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join(format!("{name}.exe"))
    } else {
        venv.join("bin").join(name)
    }
}

/// Run a command to completion, returning stdout or a failure description
/// with the combined captured output.
async fn run_step(cmd: &mut Command) -> std::result::Result<Vec<u8>, String> {
    let output = cmd
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(describe_failure(&output))
    }
}

fn describe_failure(output: &Output) -> String {
    let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
    captured.push_str(&String::from_utf8_lossy(&output.stderr));
    let captured = captured.trim_end();
    if captured.is_empty() {
        output.status.to_string()
    } else {
        format!("{}: {captured}", output.status)
    }
}
