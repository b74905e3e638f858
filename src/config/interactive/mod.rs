
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, ConfigError};
use crate::database::connection::{ConnectionDescriptor, StoreKind};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Search Provider Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Store Connections").bold().yellow());
    eprintln!("Map a logical connection name to a store connection string.");
    eprintln!();

    configure_connection(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Search Defaults").bold().yellow());
    configure_defaults(&mut config)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Connections:").bold().yellow());
    if config.connections.is_empty() {
        eprintln!("  {}", style("(none configured)").dim());
    }
    for (name, connection_string) in &config.connections {
        match describe_connection(connection_string) {
            Ok(summary) => eprintln!("  {}: {}", style(name).cyan(), summary),
            Err(e) => eprintln!("  {}: {} ({})", style(name).cyan(), style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!(
        "  Default max results: {}",
        style(config.search.max_results).cyan()
    );
    eprintln!(
        "  Request timeout: {}s",
        style(config.store.request_timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to locate config directory")?;
    Config::load(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_connection(config: &mut Config) -> Result<()> {
    let name: String = Input::new()
        .with_prompt("Connection name")
        .default("Documents".to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Connection name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let existing = config.connections.get(&name).cloned().unwrap_or_default();
    let connection_string: String = Input::new()
        .with_prompt("Connection string (e.g. Data Source=https://cluster.kusto.windows.net;Initial Catalog=Docs)")
        .default(existing)
        .validate_with(|input: &String| -> Result<(), String> {
            describe_connection(input).map(|_| ())
        })
        .interact_text()?;

    config.set_connection(name, connection_string)?;
    Ok(())
}

fn configure_defaults(config: &mut Config) -> Result<()> {
    let max_results: u32 = Input::new()
        .with_prompt("Default max results")
        .default(config.search.max_results)
        .validate_with(|input: &u32| -> Result<(), ConfigError> {
            let mut search = config.search.clone();
            search.set_max_results(*input)
        })
        .interact_text()?;

    let timeout: u64 = Input::new()
        .with_prompt("Store request timeout (seconds)")
        .default(config.store.request_timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), ConfigError> {
            let mut store = config.store.clone();
            store.set_request_timeout_seconds(*input)
        })
        .interact_text()?;

    config.search.set_max_results(max_results)?;
    config.store.set_request_timeout_seconds(timeout)?;
    Ok(())
}

/// One-line summary of where a connection string points
fn describe_connection(connection_string: &str) -> Result<String, String> {
    let descriptor = ConnectionDescriptor::parse(connection_string).map_err(|e| e.to_string())?;
    let kind = StoreKind::from_data_source(&descriptor.data_source).map_err(|e| e.to_string())?;
    Ok(format!(
        "{} {} (database {})",
        kind, descriptor.data_source, descriptor.initial_catalog
    ))
}
