//! Load-time validation.
//!
//! Every section is checked, whether or not it is enabled, and every problem
//! is collected so an operator sees the full list at once.

use std::net::Ipv4Addr;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::warn;

use crate::{ConfigError, FallbackBehavior, WardenConfig, resolve_secret};

/// Hard limit on organizational hierarchy traversal.
pub const MAX_HIERARCHY_DEPTH: u32 = 10;

/// Shortest accepted refresh interval, in seconds.
pub const MIN_REFRESH_INTERVAL_SECONDS: u64 = 60;

/// Longest temporary grant that may be configured: 30 days.
pub const MAX_TEMPORARY_ACCESS_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Outcome of [`WardenConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl WardenConfig {
    /// Checks the configuration and returns every error and warning found.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        self.validate_performance(&mut report);
        self.validate_time(&mut report);
        self.validate_geo(&mut report);
        self.validate_dynamic(&mut report);
        self.validate_error_handling(&mut report);
        report
    }

    /// Validates, logs warnings, and fails on any error.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let report = self.validate();
        for warning in &report.warnings {
            warn!(warning = %warning, "configuration warning");
        }
        if report.is_valid() {
            Ok(self)
        } else {
            Err(ConfigError::ValidationError {
                problems: report.errors,
            })
        }
    }

    fn validate_performance(&self, report: &mut ValidationReport) {
        let perf = &self.performance;
        if perf.batch_size == 0 {
            report.error("performance.batch_size must be at least 1");
        }
        if perf.timeout_ms == 0 {
            report.error("performance.timeout_ms must be at least 1");
        } else if perf.timeout_ms < 1000 {
            report.warning(format!(
                "performance.timeout_ms = {} is short (recommended: 5000 or more)",
                perf.timeout_ms
            ));
        }
        if perf.max_filter_size > 10_000 {
            report.warning(format!(
                "performance.max_filter_size = {} is large (recommended: 1000 or less)",
                perf.max_filter_size
            ));
        }
    }

    fn validate_time(&self, report: &mut ValidationReport) {
        let hours = &self.time_restriction.business_hours;
        if hours.end_hour > 24 {
            report.error(format!(
                "time_restriction.business_hours.end_hour = {} exceeds 24",
                hours.end_hour
            ));
        }
        if hours.start_hour >= hours.end_hour {
            report.error(format!(
                "time_restriction.business_hours.start_hour ({}) must be before end_hour ({})",
                hours.start_hour, hours.end_hour
            ));
        }
        if hours.business_days.is_empty() {
            report.error("time_restriction.business_hours.business_days is empty");
        }
        for day in hours.business_days.iter().filter(|day| **day > 6) {
            report.error(format!(
                "time_restriction.business_hours.business_days contains {day} (expected 0-6, 0 = Sunday)"
            ));
        }
        if hours.timezone.parse::<Tz>().is_err() {
            report.error(format!(
                "time_restriction.business_hours.timezone {:?} is not an IANA timezone",
                hours.timezone
            ));
        }
        for date in &self.time_restriction.holidays.dates {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                report.error(format!(
                    "time_restriction.holidays.dates contains {date:?} (expected YYYY-MM-DD)"
                ));
            }
        }
    }

    fn validate_geo(&self, report: &mut ValidationReport) {
        let geo = &self.geographic_restriction;
        if geo.enabled && geo.allowed_countries.is_empty() {
            report.warning("geographic_restriction.allowed_countries is empty; any country passes");
        }
        // Malformed entries are skipped at evaluation time.
        for range in &geo.allowed_ip_ranges {
            if !is_valid_ip_range(range) {
                report.warning(format!(
                    "geographic_restriction.allowed_ip_ranges contains invalid entry {range:?}; it is ignored"
                ));
            }
        }
        if geo.lookup_timeout_ms == 0 {
            report.error("geographic_restriction.lookup_timeout_ms must be at least 1");
        }
        check_secret(
            "geographic_restriction.vpn_detection",
            &geo.vpn_detection.endpoint,
            &geo.vpn_detection.api_key_env,
            report,
        );
    }

    fn validate_dynamic(&self, report: &mut ValidationReport) {
        let dynamic = &self.dynamic_permissions;
        if dynamic.refresh_interval_seconds < MIN_REFRESH_INTERVAL_SECONDS {
            report.error(format!(
                "dynamic_permissions.refresh_interval_seconds = {} is below {MIN_REFRESH_INTERVAL_SECONDS}",
                dynamic.refresh_interval_seconds
            ));
        }

        let depth = dynamic.org_hierarchy.max_depth;
        if depth == 0 || depth > MAX_HIERARCHY_DEPTH {
            report.error(format!(
                "dynamic_permissions.org_hierarchy.max_depth = {depth} (expected 1-{MAX_HIERARCHY_DEPTH})"
            ));
        }

        let api = &dynamic.project_access.membership_api;
        check_secret(
            "dynamic_permissions.project_access.membership_api",
            &api.endpoint,
            &api.api_key_env,
            report,
        );

        let temporary = &dynamic.temporary_access;
        if temporary.max_duration_seconds > MAX_TEMPORARY_ACCESS_SECONDS {
            report.error(format!(
                "dynamic_permissions.temporary_access.max_duration_seconds = {} exceeds {MAX_TEMPORARY_ACCESS_SECONDS}",
                temporary.max_duration_seconds
            ));
        }
        if temporary.max_duration_seconds < temporary.default_duration_seconds {
            report.error(format!(
                "dynamic_permissions.temporary_access.max_duration_seconds ({}) is shorter than default_duration_seconds ({})",
                temporary.max_duration_seconds, temporary.default_duration_seconds
            ));
        }
        if temporary.auto_approval.max_duration_seconds > temporary.max_duration_seconds {
            report.warning(
                "temporary_access.auto_approval.max_duration_seconds exceeds max_duration_seconds; \
                 requests above the maximum are still rejected",
            );
        }
        if temporary.enabled && temporary.approvers.is_empty() {
            report.warning("temporary_access.approvers is empty; pending requests cannot be approved");
        }
    }

    fn validate_error_handling(&self, report: &mut ValidationReport) {
        if self.error_handling.fallback_behavior == FallbackBehavior::Allow {
            report.warning("error_handling.fallback_behavior = \"allow\" grants profile-only access when lookups fail");
        }
        if self.error_handling.retry.max_retries > 10 {
            report.warning(format!(
                "error_handling.retry.max_retries = {} may exceed the request timeout",
                self.error_handling.retry.max_retries
            ));
        }
    }
}

/// Warns when an external endpoint is configured but its key variable is unset.
fn check_secret(section: &str, endpoint: &str, api_key_env: &str, report: &mut ValidationReport) {
    if !endpoint.is_empty() && resolve_secret(api_key_env).is_none() {
        report.warning(format!(
            "{section}.endpoint is set but {api_key_env:?} is not in the environment"
        ));
    }
}

/// Accepts `a.b.c.d` or `a.b.c.d/prefix` with a prefix of 0-32.
fn is_valid_ip_range(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((network, prefix)) => {
            network.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
        }
        None => entry.parse::<Ipv4Addr>().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        let report = WardenConfig::default().validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_collects_every_problem() {
        let mut config = WardenConfig::default();
        config.time_restriction.business_hours.start_hour = 18;
        config.time_restriction.business_hours.end_hour = 9;
        config.time_restriction.business_hours.business_days.clear();
        config.dynamic_permissions.temporary_access.max_duration_seconds = 60;

        let report = config.validate();
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    }

    #[test]
    fn test_endpoint_without_key_warns() {
        let mut config = WardenConfig::default();
        config.geographic_restriction.vpn_detection.endpoint = "https://vpn.example.net/check".to_string();
        config.geographic_restriction.vpn_detection.api_key_env = "WARDEN_TEST_VPN_KEY_NEVER_SET".to_string();

        let report = config.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("WARDEN_TEST_VPN_KEY_NEVER_SET"));
    }

    #[test]
    fn test_validated_returns_validation_error() {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.refresh_interval_seconds = 30;

        let err = config.validated().unwrap_err();
        match err {
            ConfigError::ValidationError { problems } => {
                assert_eq!(problems.len(), 1);
                assert!(problems[0].contains("refresh_interval_seconds"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_timezone_and_holiday() {
        let mut config = WardenConfig::default();
        config.time_restriction.business_hours.timezone = "Mars/Olympus".to_string();
        config.time_restriction.holidays.dates.push("2025-13-40".to_string());
        config.time_restriction.business_hours.business_days.push(7);

        let report = config.validate();
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    }

    #[test]
    fn test_soft_limits_are_warnings() {
        let mut config = WardenConfig::default();
        config.performance.timeout_ms = 500;
        config.performance.max_filter_size = 20_000;
        config.error_handling.fallback_behavior = FallbackBehavior::Allow;

        let report = config.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 3, "{:?}", report.warnings);
    }

    #[test]
    fn test_malformed_ip_range_is_a_warning() {
        let mut config = WardenConfig::default();
        config.geographic_restriction.allowed_ip_ranges =
            vec!["10.0.0.0/99".to_string(), "203.0.113.0/24".to_string()];

        let report = config.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("10.0.0.0/99"));
        assert!(config.validated().is_ok());
    }

    #[test_case(MAX_TEMPORARY_ACCESS_SECONDS, true)]
    #[test_case(MAX_TEMPORARY_ACCESS_SECONDS + 1, false)]
    #[test_case(u64::MAX, false)]
    fn test_temporary_duration_cap(max: u64, valid: bool) {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.temporary_access.max_duration_seconds = max;
        assert_eq!(config.validate().is_valid(), valid);
    }

    #[test_case(0, false)]
    #[test_case(1, true)]
    #[test_case(10, true)]
    #[test_case(11, false)]
    fn test_hierarchy_depth_bounds(depth: u32, valid: bool) {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.org_hierarchy.max_depth = depth;
        assert_eq!(config.validate().is_valid(), valid);
    }

    #[test_case("10.0.0.0/8", true)]
    #[test_case("192.168.1.7", true)]
    #[test_case("0.0.0.0/0", true)]
    #[test_case("10.0.0.0/33", false)]
    #[test_case("10.0.0/8", false)]
    #[test_case("not-an-address", false)]
    #[test_case("256.1.1.1", false)]
    fn test_ip_range_syntax(entry: &str, valid: bool) {
        assert_eq!(is_valid_ip_range(entry), valid);
    }
}
