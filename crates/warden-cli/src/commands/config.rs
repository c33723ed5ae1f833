//! Configuration management commands.

use anyhow::{Context, Result};
use warden_config::{ConfigLoader, Environment, WardenConfig, config_sources};

/// Loads and validates configuration for `project` under `env`.
pub fn load(project: &str, env: &str) -> Result<WardenConfig> {
    let environment: Environment = env.parse()?;
    ConfigLoader::new()
        .with_project_dir(project)
        .with_environment(environment)
        .load()
        .context("Failed to load configuration")
}

/// Validate configuration and print every error and warning.
pub fn check(project: &str, env: &str) -> Result<()> {
    let environment: Environment = env.parse()?;
    // Merge without the validation step so the full report can be printed.
    let config = ConfigLoader::new()
        .with_project_dir(project)
        .with_environment(environment)
        .load_unvalidated()
        .context("Failed to load configuration")?;

    for path in config_sources(project, true) {
        println!("source: {}", path.display());
    }

    let report = config.validate();
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }

    if !report.is_valid() {
        anyhow::bail!("{} configuration error(s) in {environment}", report.errors.len());
    }
    println!("Configuration valid ({environment}, {} warning(s))", report.warnings.len());
    Ok(())
}

/// Show the effective configuration.
pub fn show(project: &str, env: &str, format: &str) -> Result<()> {
    let config = load(project, env)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", config.to_toml()?),
        other => anyhow::bail!("Unknown format {other:?} (expected toml or json)"),
    }
    Ok(())
}
