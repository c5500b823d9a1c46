use super::runtime;
use crate::output::print_json;
use anyhow::Context;
use catalyst_core::action::{ActionRunner, StaticToken};
use catalyst_core::config::Config;
use catalyst_core::schedule::TICK_PAYLOAD;
use clap::Subcommand;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Run one action and print its output
    Run {
        /// Action kind: python or webhook
        #[arg(long)]
        kind: String,
        /// Action data as JSON, e.g. '{"url": "https://example.com/hook"}'
        #[arg(long)]
        data: String,
        /// Payload handed to the action
        #[arg(long, default_value = TICK_PAYLOAD)]
        payload: String,
    },
}

pub fn run(config_path: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ActionSubcommand::Run {
            kind,
            data,
            payload,
        } => run_once(config_path, &kind, &data, &payload, json),
    }
}

fn run_once(config_path: &Path, kind: &str, data: &str, payload: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path).context("failed to load config")?;
    let data: serde_json::Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    let token = config.api_token_or_ephemeral();
    let runner = ActionRunner::from_config(&config, Arc::new(StaticToken::new(token)));

    let rt = runtime()?;
    let output = rt
        .block_on(runner.run(kind, &data, payload))
        .with_context(|| format!("{kind} action failed"))?;

    if json {
        let value = serde_json::json!({
            "output": String::from_utf8_lossy(&output),
        });
        return print_json(&value);
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.flush()?;
    Ok(())
}
