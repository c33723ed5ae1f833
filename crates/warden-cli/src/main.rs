//! Warden CLI.
//!
//! Inspect configuration and preview decisions against local JSON fixtures.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate the configuration in the current directory
//! warden config check --env production
//!
//! # Show the search filter a caller would get
//! warden filter --profile caller.json
//!
//! # Decide a full request against a set of candidate records
//! warden decide --request request.json --records hits.json --locations locations.json
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Warden - access control decisions for search.
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that loads configuration.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Project directory holding warden.toml.
    #[arg(short, long, default_value = ".")]
    project: String,

    /// Environment profile (development, staging, production).
    #[arg(short, long, default_value = "staging")]
    env: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Print the search filter built for a caller.
    Filter {
        /// Caller profile JSON file.
        #[arg(long)]
        profile: String,

        /// Evaluation instant (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Check one record for a caller.
    Check {
        /// Caller profile JSON file.
        #[arg(long)]
        profile: String,

        /// Record permission JSON file.
        #[arg(long)]
        record: String,

        /// Evaluation instant (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Run a full decision for a search request.
    Decide {
        /// Decision request JSON file.
        #[arg(long)]
        request: String,

        /// Candidate search hits JSON file.
        #[arg(long)]
        records: String,

        /// Static geolocation table JSON file.
        #[arg(long)]
        locations: Option<String>,

        /// Evaluation instant (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate configuration and list every problem found.
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show the effective configuration.
    Show {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Check { config } => commands::config::check(&config.project, &config.env),
            ConfigCommands::Show { config, format } => {
                commands::config::show(&config.project, &config.env, &format)
            }
        },
        Commands::Filter { profile, at, config } => {
            let loaded = commands::config::load(&config.project, &config.env)?;
            commands::preview::filter(loaded, &profile, at.as_deref())
        }
        Commands::Check {
            profile,
            record,
            at,
            config,
        } => {
            let loaded = commands::config::load(&config.project, &config.env)?;
            commands::preview::check(loaded, &profile, &record, at.as_deref())
        }
        Commands::Decide {
            request,
            records,
            locations,
            at,
            config,
        } => {
            let loaded = commands::config::load(&config.project, &config.env)?;
            commands::decide::run(loaded, &request, &records, locations.as_deref(), at.as_deref())
        }
    }
}
