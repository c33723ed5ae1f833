//! Deployment environment profiles.
//!
//! Every profile starts from the same base ([`WardenConfig::default`]) and
//! applies a small override function, so a setting only diverges between
//! environments where an override names it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_types::{Classification, RoleLevel};

use crate::{ConfigError, WardenConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    /// Relaxed: time and geographic checks off, generous temporary access.
    Development,
    /// The base profile.
    #[default]
    Staging,
    /// Strict: minimal exemption lists, short temporary access.
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    fn apply(self, config: &mut WardenConfig) {
        match self {
            Environment::Development => development_overrides(config),
            Environment::Staging => {}
            Environment::Production => production_overrides(config),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "test" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WardenConfig {
    /// Returns the built-in configuration for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self::default();
        environment.apply(&mut config);
        config
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self::for_environment(Environment::Development)
    }

    /// Create a production configuration
    pub fn production() -> Self {
        Self::for_environment(Environment::Production)
    }
}

fn development_overrides(config: &mut WardenConfig) {
    config.time_restriction.enabled = false;

    let geo = &mut config.geographic_restriction;
    geo.enabled = false;
    geo.allowed_countries = ["JP", "US", "SG", "AU"]
        .iter()
        .map(ToString::to_string)
        .collect();
    geo.vpn_detection.enabled = false;

    let dynamic = &mut config.dynamic_permissions;
    dynamic.refresh_interval_seconds = 60;
    dynamic.temporary_access.default_duration_seconds = 28_800;
    dynamic.temporary_access.max_duration_seconds = 604_800;
    dynamic.temporary_access.auto_approval.max_duration_seconds = 86_400;
    dynamic.temporary_access.auto_approval.allowed_roles =
        vec![RoleLevel::User, RoleLevel::Manager, RoleLevel::Admin];
    dynamic.temporary_access.auto_approval.allowed_classifications = vec![
        Classification::Public,
        Classification::Internal,
        Classification::Confidential,
    ];
}

fn production_overrides(config: &mut WardenConfig) {
    config.engine.admin_bypass = false;

    config.time_restriction.emergency_access_users = vec!["emergency001".to_string()];
    config.time_restriction.after_hours_roles = vec![RoleLevel::Admin];

    let geo = &mut config.geographic_restriction;
    geo.allowed_countries = vec!["JP".to_string()];
    geo.exempt_users = vec!["emergency001".to_string()];
    geo.risk_based_auth.enabled = true;
    geo.risk_based_auth.anomaly_detection = true;
    geo.risk_based_auth.require_additional_auth = true;

    let temporary = &mut config.dynamic_permissions.temporary_access;
    temporary.default_duration_seconds = 3600;
    temporary.max_duration_seconds = 14_400;
    temporary.auto_approval.max_duration_seconds = 1800;
    temporary.auto_approval.allowed_roles = vec![RoleLevel::Admin];
    temporary.auto_approval.allowed_classifications = vec![Classification::Public];
}
