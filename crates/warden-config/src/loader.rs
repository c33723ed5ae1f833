//! Configuration loader with multi-source merging

use crate::{ConfigError, Environment, WardenConfig, paths};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    environment: Environment,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "WARDEN".to_string(),
            environment: Environment::default(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "WARDEN")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Select the built-in profile the file sources are layered on
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Skip ~/.config/warden/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence, then validate
    pub fn load(self) -> Result<WardenConfig, ConfigError> {
        self.load_unvalidated()?.validated()
    }

    /// Merge every source without validating the result
    pub fn load_unvalidated(self) -> Result<WardenConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults for the selected environment
        let defaults = WardenConfig::for_environment(self.environment);
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User config, project config (warden.toml), local config (warden.local.toml)
        for path in paths::config_sources(&self.project_dir, self.include_user_config) {
            debug!(path = %path.display(), "adding config file");
            builder = builder.add_source(
                config::File::from(path)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (WARDEN_ENGINE__DEFAULT_DENY=false)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
