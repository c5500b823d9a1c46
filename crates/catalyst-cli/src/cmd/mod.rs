pub mod action;
pub mod config;
pub mod reaction;
pub mod serve;

use anyhow::Context;
use catalyst_core::bus::{EventContext, User};
use catalyst_core::config::Config;
use catalyst_core::db::ReactionDb;
use catalyst_core::Engine;
use std::path::Path;
use std::sync::Arc;

/// Load the config (defaults when the file is missing) and open its reaction
/// database.
pub fn open_store(config_path: &Path) -> anyhow::Result<(Config, ReactionDb)> {
    let config = Config::load_or_default(config_path).context("failed to load config")?;
    let db_path = config.database_path(config_path);
    let db = ReactionDb::open(&db_path)
        .with_context(|| format!("failed to open reaction database {}", db_path.display()))?;
    Ok((config, db))
}

/// Must be called from within a Tokio runtime.
pub fn open_engine(config_path: &Path) -> anyhow::Result<Arc<Engine>> {
    let (config, db) = open_store(config_path)?;
    Ok(Arc::new(Engine::new(config, Arc::new(db))))
}

/// The acting user for mutations made from the command line.
pub fn cli_context() -> EventContext {
    EventContext::with_user(User {
        id: "cli".to_string(),
        username: "catalyst-cli".to_string(),
        name: "catalyst CLI".to_string(),
        email: None,
    })
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start tokio runtime")
}
