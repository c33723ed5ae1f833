//! Configuration management for Warden
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (WARDEN_* prefix, `__` between nested keys)
//! 2. warden.local.toml (gitignored, local overrides)
//! 3. warden.toml (git-tracked, deployment config)
//! 4. ~/.config/warden/config.toml (user defaults)
//! 5. Built-in defaults for the selected [`Environment`] (lowest precedence)
//!
//! The merged result is validated once by [`WardenConfig::validated`]; hard
//! problems surface as [`ConfigError::ValidationError`] and soft ones are
//! logged as warnings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_types::{Classification, RoleLevel};

mod environment;
mod error;
mod loader;
mod paths;
mod validate;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, config_sources, user_config_file};
pub use validate::ValidationReport;

/// Main Warden configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub performance: PerformanceConfig,
    pub time_restriction: TimeRestrictionConfig,
    pub geographic_restriction: GeographicRestrictionConfig,
    pub dynamic_permissions: DynamicPermissionConfig,
    pub error_handling: ErrorHandlingConfig,
    pub audit: AuditConfig,
}

// ============================================================================
// Engine and Performance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master switch. When false every request is allowed.
    pub enabled: bool,
    /// Require every predicate to pass (otherwise any passing predicate allows).
    pub default_deny: bool,
    /// Let admins skip predicate evaluation.
    pub admin_bypass: bool,
    pub audit_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_deny: true,
            admin_bypass: false,
            audit_logging: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Upper bound on the number of terms in a generated filter.
    pub max_filter_size: usize,
    /// Budget for one whole authorization request.
    pub timeout_ms: u64,
    /// Number of records re-checked per batch.
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_filter_size: 1000,
            timeout_ms: 5000,
            batch_size: 100,
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_entries: usize,
    pub hierarchical: HierarchicalTtls,
    pub invalidation: InvalidationRules,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 10_000,
            hierarchical: HierarchicalTtls::default(),
            invalidation: InvalidationRules::default(),
        }
    }
}

/// Per-kind cache lifetimes, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalTtls {
    pub user_permissions: u64,
    pub project_membership: u64,
    pub geolocation: u64,
    pub organization_hierarchy: u64,
}

impl Default for HierarchicalTtls {
    fn default() -> Self {
        Self {
            user_permissions: 600,
            project_membership: 1800,
            geolocation: 3600,
            organization_hierarchy: 7200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationRules {
    pub on_role_change: bool,
    pub on_membership_change: bool,
    pub on_policy_update: bool,
}

impl Default for InvalidationRules {
    fn default() -> Self {
        Self {
            on_role_change: true,
            on_membership_change: true,
            on_policy_update: true,
        }
    }
}

// ============================================================================
// Time-Based Restriction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRestrictionConfig {
    pub enabled: bool,
    pub business_hours: BusinessHours,
    /// Identities allowed at any time.
    pub emergency_access_users: Vec<String>,
    /// Roles allowed outside business hours.
    pub after_hours_roles: Vec<RoleLevel>,
    pub holidays: HolidayConfig,
}

impl Default for TimeRestrictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            business_hours: BusinessHours::default(),
            emergency_access_users: vec![
                "admin001".to_string(),
                "emergency001".to_string(),
                "security_admin".to_string(),
                "system_admin".to_string(),
            ],
            after_hours_roles: vec![RoleLevel::Admin, RoleLevel::Manager],
            holidays: HolidayConfig::default(),
        }
    }
}

/// Half-open local business window `[start_hour, end_hour)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Weekdays, 0 = Sunday through 6 = Saturday.
    pub business_days: Vec<u32>,
    /// IANA timezone id.
    pub timezone: String,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            business_days: vec![1, 2, 3, 4, 5],
            timezone: "Asia/Tokyo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayConfig {
    /// Local dates in `YYYY-MM-DD` form.
    pub dates: Vec<String>,
    /// Decision returned on a listed date.
    pub allow_access: bool,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            dates: [
                "2025-01-01",
                "2025-01-13",
                "2025-02-11",
                "2025-02-23",
                "2025-03-20",
                "2025-04-29",
                "2025-05-03",
                "2025-05-04",
                "2025-05-05",
                "2025-07-21",
                "2025-08-11",
                "2025-09-15",
                "2025-09-23",
                "2025-10-13",
                "2025-11-03",
                "2025-11-23",
                "2025-12-29",
                "2025-12-30",
                "2025-12-31",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            allow_access: false,
        }
    }
}

// ============================================================================
// Geographic Restriction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicRestrictionConfig {
    pub enabled: bool,
    /// ISO country codes. Empty means any country.
    pub allowed_countries: Vec<String>,
    /// Region names. Empty means any region.
    pub allowed_regions: Vec<String>,
    /// CIDR ranges or exact IPv4 addresses. Empty means any address.
    pub allowed_ip_ranges: Vec<String>,
    /// Bound on one geo-location lookup.
    pub lookup_timeout_ms: u64,
    pub vpn_detection: VpnDetectionConfig,
    /// Identities that skip every geographic check.
    pub exempt_users: Vec<String>,
    pub risk_based_auth: RiskBasedAuthConfig,
}

impl Default for GeographicRestrictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_countries: vec!["JP".to_string()],
            allowed_regions: ["Tokyo", "Osaka", "Nagoya", "Fukuoka", "Sapporo"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_ip_ranges: [
                "203.0.113.0/24",
                "198.51.100.0/24",
                "192.0.2.0/24",
                "10.0.0.0/8",
                "172.16.0.0/12",
                "192.168.0.0/16",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            lookup_timeout_ms: 3000,
            vpn_detection: VpnDetectionConfig::default(),
            exempt_users: vec![
                "emergency001".to_string(),
                "global_admin".to_string(),
                "security_admin".to_string(),
            ],
            risk_based_auth: RiskBasedAuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnDetectionConfig {
    pub enabled: bool,
    pub allowed_vpn_users: Vec<String>,
    /// External detection endpoint. Empty selects the local heuristic.
    pub endpoint: String,
    /// Name of the environment variable holding the detection API key.
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for VpnDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_vpn_users: vec![
                "admin001".to_string(),
                "vpn_user001".to_string(),
                "remote_manager".to_string(),
                "field_engineer".to_string(),
            ],
            endpoint: String::new(),
            api_key_env: "WARDEN_VPN_DETECTION_API_KEY".to_string(),
            timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBasedAuthConfig {
    pub enabled: bool,
    /// Compare the origin country with the caller's access history.
    pub anomaly_detection: bool,
    /// Deny high-risk requests and ask for step-up authentication.
    pub require_additional_auth: bool,
    pub high_risk_countries: Vec<String>,
}

impl Default for RiskBasedAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anomaly_detection: true,
            require_additional_auth: true,
            high_risk_countries: vec!["CN".to_string(), "RU".to_string(), "KP".to_string()],
        }
    }
}

// ============================================================================
// Dynamic Permissions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicPermissionConfig {
    pub enabled: bool,
    pub project_access: ProjectAccessConfig,
    pub org_hierarchy: OrgHierarchyConfig,
    pub temporary_access: TemporaryAccessConfig,
    /// Lifetime of a resolved grant set and period of background refresh.
    pub refresh_interval_seconds: u64,
    pub inheritance: InheritanceRules,
}

impl Default for DynamicPermissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_access: ProjectAccessConfig::default(),
            org_hierarchy: OrgHierarchyConfig::default(),
            temporary_access: TemporaryAccessConfig::default(),
            refresh_interval_seconds: 300,
            inheritance: InheritanceRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectAccessConfig {
    pub enabled: bool,
    /// Project id to the classifications its members may read.
    pub project_permissions: BTreeMap<String, Vec<Classification>>,
    pub membership_api: LookupApiConfig,
    pub auto_grant: bool,
}

impl Default for ProjectAccessConfig {
    fn default() -> Self {
        use Classification::{Confidential, Internal, Public, Restricted};

        let project_permissions = BTreeMap::from([
            (
                "project_alpha".to_string(),
                vec![Confidential, Internal, Public],
            ),
            ("project_beta".to_string(), vec![Internal, Public]),
            (
                "project_gamma".to_string(),
                vec![Restricted, Confidential, Internal, Public],
            ),
            ("project_delta".to_string(), vec![Public]),
            (
                "emergency_response".to_string(),
                vec![Restricted, Confidential, Internal, Public],
            ),
        ]);

        Self {
            enabled: true,
            project_permissions,
            membership_api: LookupApiConfig::default(),
            auto_grant: true,
        }
    }
}

/// External lookup endpoint. The key itself lives in the named env var.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupApiConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub cache_seconds: u64,
    pub timeout_ms: u64,
}

impl Default for LookupApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key_env: "WARDEN_PROJECT_API_KEY".to_string(),
            cache_seconds: 600,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgHierarchyConfig {
    pub enabled: bool,
    /// Parent department to its direct children.
    pub hierarchy: BTreeMap<String, Vec<String>>,
    /// Add the caller's classification hierarchy to the resolved grants.
    pub inherited_permissions: bool,
    pub max_depth: u32,
}

impl Default for OrgHierarchyConfig {
    fn default() -> Self {
        let edges: [(&str, &[&str]); 9] = [
            ("executive", &["technology", "finance", "operations"]),
            ("technology", &["engineering", "it"]),
            ("finance", &["accounting", "financial_planning"]),
            ("operations", &["operations_management", "human_resources"]),
            ("engineering", &["platform", "product_engineering"]),
            ("it", &["system_administration", "security"]),
            ("accounting", &["payables", "receivables"]),
            ("operations_management", &["project_management"]),
            ("human_resources", &["recruiting"]),
        ];

        Self {
            enabled: true,
            hierarchy: edges
                .iter()
                .map(|(parent, children)| {
                    (
                        (*parent).to_string(),
                        children.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
            inherited_permissions: true,
            max_depth: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporaryAccessConfig {
    pub enabled: bool,
    pub default_duration_seconds: u64,
    pub max_duration_seconds: u64,
    pub approvers: Vec<String>,
    pub auto_approval: AutoApprovalRules,
}

impl Default for TemporaryAccessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_duration_seconds: 7200,
            max_duration_seconds: 86_400,
            approvers: vec![
                "admin001".to_string(),
                "security_admin".to_string(),
                "department_manager".to_string(),
            ],
            auto_approval: AutoApprovalRules::default(),
        }
    }
}

/// A request is auto-approved only when all three limits hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApprovalRules {
    pub max_duration_seconds: u64,
    pub allowed_roles: Vec<RoleLevel>,
    pub allowed_classifications: Vec<Classification>,
}

impl Default for AutoApprovalRules {
    fn default() -> Self {
        Self {
            max_duration_seconds: 3600,
            allowed_roles: vec![RoleLevel::Manager, RoleLevel::Admin],
            allowed_classifications: vec![Classification::Public, Classification::Internal],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InheritanceRules {
    pub department: bool,
    pub project: bool,
    pub time_restriction: bool,
}

impl Default for InheritanceRules {
    fn default() -> Self {
        Self {
            department: true,
            project: true,
            time_restriction: false,
        }
    }
}

// ============================================================================
// Error Handling and Audit
// ============================================================================

/// Outcome applied when an upstream lookup keeps failing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackBehavior {
    #[default]
    Deny,
    Allow,
    CacheLastKnown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    pub fallback_behavior: FallbackBehavior,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            exponential_backoff: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub retention_days: u32,
    /// Also write one entry per re-checked record.
    pub record_level: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            record_level: false,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl WardenConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Reads a single TOML file on top of the built-in defaults, without
    /// consulting any other source.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

/// Reads a secret from the environment variable named in configuration.
///
/// Returns `None` when the name is empty or the variable is unset or blank.
pub fn resolve_secret(var_name: &str) -> Option<String> {
    if var_name.is_empty() {
        return None;
    }
    std::env::var(var_name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
