use super::{cli_context, open_engine, open_store, runtime};
use crate::output::{print_json, print_table};
use anyhow::Context;
use catalyst_core::reaction::{NewReaction, Reaction};
use catalyst_core::store::ReactionStore;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ReactionSubcommand {
    /// List all reactions, oldest first
    List,

    /// Show one reaction
    Show { id: String },

    /// Create a reaction from a YAML or JSON file
    Add {
        /// File holding `name`, `trigger`, `triggerData`, `action`, `actionData`
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace a reaction's definition from a YAML or JSON file
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a reaction
    Remove { id: String },
}

pub fn run(config_path: &Path, subcmd: ReactionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ReactionSubcommand::List => list(config_path, json),
        ReactionSubcommand::Show { id } => show(config_path, &id, json),
        ReactionSubcommand::Add { file } => add(config_path, &file, json),
        ReactionSubcommand::Update { id, file } => update(config_path, &id, &file, json),
        ReactionSubcommand::Remove { id } => remove(config_path, &id, json),
    }
}

fn read_definition(file: &Path) -> anyhow::Result<NewReaction> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    // JSON documents are valid YAML
    serde_yaml::from_str(&data).with_context(|| format!("invalid reaction definition in {}", file.display()))
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(config_path)?;
    let reactions = store.list()?;

    if json {
        return print_json(&reactions);
    }

    if reactions.is_empty() {
        println!("No reactions.");
        return Ok(());
    }

    let rows = reactions
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.trigger.clone(),
                r.action.clone(),
                r.created.format("%Y-%m-%d %H:%M").to_string(),
                r.name.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "TRIGGER", "ACTION", "CREATED", "NAME"], rows);
    Ok(())
}

fn show(config_path: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(config_path)?;
    let reaction = store.get(id)?;
    print_reaction(&reaction, json)
}

fn print_reaction(reaction: &Reaction, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(reaction);
    }
    println!("ID:       {}", reaction.id);
    println!("Name:     {}", reaction.name);
    println!("Trigger:  {} {}", reaction.trigger, reaction.trigger_data);
    println!("Action:   {} {}", reaction.action, reaction.action_data);
    println!("Created:  {}", reaction.created.to_rfc3339());
    println!("Updated:  {}", reaction.updated.to_rfc3339());
    Ok(())
}

// ---------------------------------------------------------------------------
// add / update / remove
// ---------------------------------------------------------------------------

fn add(config_path: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let new = read_definition(file)?;
    let rt = runtime()?;
    let reaction = rt.block_on(async {
        let engine = open_engine(config_path)?;
        let created = engine.service().create(&cli_context(), new).await;
        engine.shutdown().await;
        anyhow::Ok(created?)
    })?;

    if json {
        print_json(&reaction)
    } else {
        println!("Created reaction {}", reaction.id);
        Ok(())
    }
}

fn update(config_path: &Path, id: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let new = read_definition(file)?;
    let rt = runtime()?;
    let reaction = rt.block_on(async {
        let engine = open_engine(config_path)?;
        let updated = engine.service().update(&cli_context(), id, new).await;
        engine.shutdown().await;
        anyhow::Ok(updated?)
    })?;

    if json {
        print_json(&reaction)
    } else {
        println!("Updated reaction {}", reaction.id);
        Ok(())
    }
}

fn remove(config_path: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let rt = runtime()?;
    let reaction = rt.block_on(async {
        let engine = open_engine(config_path)?;
        let deleted = engine.service().delete(&cli_context(), id).await;
        engine.shutdown().await;
        anyhow::Ok(deleted?)
    })?;

    if json {
        print_json(&reaction)
    } else {
        println!("Removed reaction {}", reaction.id);
        Ok(())
    }
}
