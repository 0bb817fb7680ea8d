//! Project setup and storage commands: `hardpy init`, `hardpy clear`,
//! `hardpy config`.

use anyhow::{Context, Result};
use std::path::Path;

use hardpy::config::{CONFIG_FILE, DEFAULT_CONFIG, HardpyConfig, StorageBackend};
use hardpy::store::{DocumentStore, JsonFileStore, RUN_STORE, STATE_STORE};

use super::super::ConfigCommands;

pub fn cmd_init(project_dir: &Path, force: bool) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(project_dir)
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;
    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let mut config = HardpyConfig::parse(DEFAULT_CONFIG)?;
    config.apply_env_overrides()?;
    let storage_dir = config.storage_dir(project_dir);
    std::fs::create_dir_all(&storage_dir)
        .with_context(|| format!("Failed to create {}", storage_dir.display()))?;

    println!(
        "{} Initialized hardpy project in {}",
        console::style("✓").green(),
        project_dir.display()
    );
    println!("  config:  {}", config_path.display());
    println!("  storage: {}", storage_dir.display());
    Ok(())
}

pub fn cmd_clear(project_dir: &Path, config: &HardpyConfig) -> Result<()> {
    if config.database.backend == StorageBackend::Memory {
        println!("Memory backend configured; nothing is stored.");
        return Ok(());
    }

    let root = config.storage_dir(project_dir);
    for name in [STATE_STORE, RUN_STORE] {
        let store = JsonFileStore::open(&root, name)
            .with_context(|| format!("Failed to open {} store", name))?;
        store
            .delete(&config.database.doc_id)
            .with_context(|| format!("Failed to delete document from {} store", name))?;
    }
    tracing::info!(doc = %config.database.doc_id, "stored run documents deleted");
    println!(
        "{} Cleared run document '{}'",
        console::style("✓").green(),
        config.database.doc_id
    );
    Ok(())
}

pub fn cmd_config(
    project_dir: &Path,
    config: &HardpyConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found; using defaults.", CONFIG_FILE);
            }
            println!();
            print!(
                "{}",
                toml::to_string_pretty(config).context("Failed to render configuration")?
            );
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{} Configuration is valid", console::style("✓").green());
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}
