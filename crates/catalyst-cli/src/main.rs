mod cmd;
mod output;

use catalyst_core::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};
use cmd::{action::ActionSubcommand, config::ConfigSubcommand, reaction::ReactionSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "catalyst",
    about = "Reaction engine: run actions on schedules, webhooks and record hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "CATALYST_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server and the scheduler
    Serve {
        /// Bind address (overrides `listen` from the config)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Manage stored reactions
    Reaction {
        #[command(subcommand)]
        subcommand: ReactionSubcommand,
    },

    /// Run a single action outside of any trigger
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Create or inspect the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_path();

    let result = match cli.command {
        Commands::Serve { listen } => cmd::serve::run(config_path, listen),
        Commands::Reaction { subcommand } => cmd::reaction::run(config_path, subcommand, cli.json),
        Commands::Action { subcommand } => cmd::action::run(config_path, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
