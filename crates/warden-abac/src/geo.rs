//! Geographic and network-origin evaluation.
//!
//! Check order:
//! 1. restriction disabled
//! 2. exempt identity
//! 3. resolve the origin (deny when the lookup fails)
//! 4. VPN detection (a detector failure counts as VPN)
//! 5. allowed countries, then allowed regions
//! 6. allowed IP ranges
//! 7. location risk (high risk denies)

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use warden_config::GeographicRestrictionConfig;
use warden_types::GeoLocation;

use crate::cidr::{IpRange, origin_in_ranges, parse_ranges};
use crate::lookup::{
    AccessHistory, GeoLocator, LookupError, NoHistory, PrivateRangeHeuristic, VpnDetector,
    with_timeout,
};
use crate::risk::{self, HISTORY_WINDOW, RiskAssessment, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoAccessType {
    Disabled,
    Exempt,
    LookupFailed,
    VpnBlocked,
    CountryBlocked,
    RegionBlocked,
    IpBlocked,
    HighRiskLocation,
    Allowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoDecision {
    pub allowed: bool,
    pub access_type: GeoAccessType,
    pub reason: String,
    pub location: Option<GeoLocation>,
    pub is_vpn: bool,
    pub risk: Option<RiskAssessment>,
    /// Set on high-risk denials when step-up authentication is configured.
    pub require_additional_auth: bool,
}

impl GeoDecision {
    fn new(allowed: bool, access_type: GeoAccessType, reason: impl Into<String>) -> Self {
        Self {
            allowed,
            access_type,
            reason: reason.into(),
            location: None,
            is_vpn: false,
            risk: None,
            require_additional_auth: false,
        }
    }

    fn located(mut self, location: &GeoLocation, is_vpn: bool) -> Self {
        self.location = Some(location.clone());
        self.is_vpn = is_vpn;
        self
    }

    /// Whether the origin looked suspicious (VPN, or medium/high risk).
    pub fn is_suspicious(&self) -> bool {
        self.is_vpn || self.risk.as_ref().is_some_and(RiskAssessment::is_suspicious)
    }
}

pub struct GeographicRestrictionEvaluator {
    config: GeographicRestrictionConfig,
    ranges: Vec<IpRange>,
    locator: Arc<dyn GeoLocator>,
    vpn_detector: Arc<dyn VpnDetector>,
    history: Arc<dyn AccessHistory>,
}

impl GeographicRestrictionEvaluator {
    /// Creates an evaluator using the private-range VPN heuristic and no history.
    pub fn new(config: GeographicRestrictionConfig, locator: Arc<dyn GeoLocator>) -> Self {
        let ranges = parse_ranges(&config.allowed_ip_ranges);
        Self {
            config,
            ranges,
            locator,
            vpn_detector: Arc::new(PrivateRangeHeuristic),
            history: Arc::new(NoHistory),
        }
    }

    pub fn with_vpn_detector(mut self, detector: Arc<dyn VpnDetector>) -> Self {
        self.vpn_detector = detector;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn AccessHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &GeographicRestrictionConfig {
        &self.config
    }

    pub async fn evaluate(&self, caller_id: &str, origin: &str) -> GeoDecision {
        let config = &self.config;

        if !config.enabled {
            return GeoDecision::new(true, GeoAccessType::Disabled, "geographic restriction disabled");
        }

        if config.exempt_users.iter().any(|user| user == caller_id) {
            return GeoDecision::new(true, GeoAccessType::Exempt, "geographic exemption");
        }

        let lookup_timeout = Duration::from_millis(config.lookup_timeout_ms);
        let location = match with_timeout("geolocation", lookup_timeout, self.locator.locate(origin)).await {
            Ok(location) => location,
            Err(e) => {
                warn!(caller_id, origin, error = %e, "geolocation lookup failed");
                return GeoDecision::new(false, GeoAccessType::LookupFailed, "lookup failed");
            }
        };

        let mut is_vpn = false;
        if config.vpn_detection.enabled {
            let vpn_timeout = Duration::from_millis(config.vpn_detection.timeout_ms);
            is_vpn = match with_timeout("vpn detection", vpn_timeout, self.vpn_detector.is_vpn(origin)).await {
                Ok(is_vpn) => is_vpn,
                Err(e) => {
                    warn!(caller_id, origin, error = %e, "VPN detection failed; treating origin as VPN");
                    true
                }
            };
            if is_vpn
                && !config
                    .vpn_detection
                    .allowed_vpn_users
                    .iter()
                    .any(|user| user == caller_id)
            {
                return GeoDecision::new(false, GeoAccessType::VpnBlocked, "VPN access is not permitted")
                    .located(&location, is_vpn);
            }
        }

        if !config.allowed_countries.is_empty()
            && !config
                .allowed_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&location.country_code))
        {
            return GeoDecision::new(
                false,
                GeoAccessType::CountryBlocked,
                format!("country {} is not allowed", location.country_code),
            )
            .located(&location, is_vpn);
        }

        if !config.allowed_regions.is_empty()
            && !config
                .allowed_regions
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&location.region))
        {
            return GeoDecision::new(
                false,
                GeoAccessType::RegionBlocked,
                format!("region {} is not allowed", location.region),
            )
            .located(&location, is_vpn);
        }

        if !config.allowed_ip_ranges.is_empty() && !origin_in_ranges(origin, &self.ranges) {
            return GeoDecision::new(
                false,
                GeoAccessType::IpBlocked,
                format!("origin {origin} is outside the allowed IP ranges"),
            )
            .located(&location, is_vpn);
        }

        let mut risk = None;
        if config.risk_based_auth.enabled {
            let history = self.recent_countries(caller_id).await;
            let assessment = risk::assess(&location.country_code, history, &config.risk_based_auth);
            debug!(caller_id, level = ?assessment.level, score = assessment.score, "location risk assessed");

            if assessment.level == RiskLevel::High {
                let mut decision = GeoDecision::new(
                    false,
                    GeoAccessType::HighRiskLocation,
                    "high-risk location",
                )
                .located(&location, is_vpn);
                decision.require_additional_auth = config.risk_based_auth.require_additional_auth;
                decision.risk = Some(assessment);
                return decision;
            }
            risk = Some(assessment);
        }

        let mut decision =
            GeoDecision::new(true, GeoAccessType::Allowed, "geographic checks passed").located(&location, is_vpn);
        decision.risk = risk;
        decision
    }

    async fn recent_countries(&self, caller_id: &str) -> Result<Vec<String>, LookupError> {
        let timeout = Duration::from_millis(self.config.lookup_timeout_ms);
        let result = with_timeout(
            "access history",
            timeout,
            self.history.recent_countries(caller_id, HISTORY_WINDOW),
        )
        .await;
        if let Err(e) = &result {
            warn!(caller_id, error = %e, "access history unavailable");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::StaticGeoLocator;
    use async_trait::async_trait;

    struct FixedHistory(Vec<String>);

    #[async_trait]
    impl AccessHistory for FixedHistory {
        async fn recent_countries(&self, _caller_id: &str, limit: usize) -> Result<Vec<String>, LookupError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenDetector;

    #[async_trait]
    impl VpnDetector for BrokenDetector {
        async fn is_vpn(&self, _origin: &str) -> Result<bool, LookupError> {
            Err(LookupError::failed("vpn detection", "503"))
        }
    }

    struct StalledLocator;

    #[async_trait]
    impl GeoLocator for StalledLocator {
        async fn locate(&self, _origin: &str) -> Result<GeoLocation, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GeoLocation::new("JP", "Tokyo"))
        }
    }

    fn locator() -> Arc<dyn GeoLocator> {
        Arc::new(
            StaticGeoLocator::new()
                .with_range("203.0.113.0/24".parse().unwrap(), GeoLocation::new("JP", "Tokyo"))
                .with_range("198.18.0.0/15".parse().unwrap(), GeoLocation::new("JP", "Kyoto"))
                .with_range("10.0.0.0/8".parse().unwrap(), GeoLocation::new("JP", "Tokyo"))
                .with_range("192.0.2.0/24".parse().unwrap(), GeoLocation::new("CN", "Beijing"))
                .with_range("100.64.0.0/10".parse().unwrap(), GeoLocation::new("JP", "Osaka")),
        )
    }

    fn settled_history() -> Arc<dyn AccessHistory> {
        Arc::new(FixedHistory(vec!["JP".to_string(); 5]))
    }

    fn evaluator(config: GeographicRestrictionConfig) -> GeographicRestrictionEvaluator {
        GeographicRestrictionEvaluator::new(config, locator()).with_history(settled_history())
    }

    #[tokio::test]
    async fn test_office_origin_is_allowed() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("u-1", "203.0.113.10")
            .await;
        assert!(decision.allowed, "{}", decision.reason);
        assert_eq!(decision.access_type, GeoAccessType::Allowed);
        assert_eq!(decision.risk.as_ref().map(|r| r.level), Some(RiskLevel::Low));
    }

    #[tokio::test]
    async fn test_exempt_user_skips_country_check() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("emergency001", "192.0.2.10")
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.access_type, GeoAccessType::Exempt);
    }

    #[tokio::test]
    async fn test_disallowed_country() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("u-1", "192.0.2.10")
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.access_type, GeoAccessType::CountryBlocked);
    }

    #[tokio::test]
    async fn test_disallowed_region() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("u-1", "198.18.0.5")
            .await;
        assert_eq!(decision.access_type, GeoAccessType::RegionBlocked);
    }

    #[tokio::test]
    async fn test_malformed_range_is_skipped() {
        let mut config = warden_config::WardenConfig::default();
        config.geographic_restriction.allowed_ip_ranges =
            vec!["10.0.0.0/99".to_string(), "203.0.113.0/24".to_string()];
        let config = config.validated().unwrap().geographic_restriction;
        let evaluator = evaluator(config);

        let office = evaluator.evaluate("u-1", "203.0.113.10").await;
        assert!(office.allowed, "{}", office.reason);

        let dropped = evaluator.evaluate("u-1", "10.1.2.3").await;
        assert_eq!(dropped.access_type, GeoAccessType::IpBlocked);
    }

    #[tokio::test]
    async fn test_origin_outside_ranges() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("u-1", "100.64.0.1")
            .await;
        assert_eq!(decision.access_type, GeoAccessType::IpBlocked);
    }

    #[tokio::test]
    async fn test_vpn_requires_allowlist() {
        let eval = evaluator(GeographicRestrictionConfig::default());

        let blocked = eval.evaluate("u-1", "10.1.2.3").await;
        assert_eq!(blocked.access_type, GeoAccessType::VpnBlocked);
        assert!(blocked.is_vpn);

        let allowed = eval.evaluate("vpn_user001", "10.1.2.3").await;
        assert!(allowed.allowed, "{}", allowed.reason);
        assert!(allowed.is_suspicious());
    }

    #[tokio::test]
    async fn test_detector_failure_counts_as_vpn() {
        let eval = evaluator(GeographicRestrictionConfig::default())
            .with_vpn_detector(Arc::new(BrokenDetector));
        let decision = eval.evaluate("u-1", "203.0.113.10").await;
        assert_eq!(decision.access_type, GeoAccessType::VpnBlocked);
    }

    #[tokio::test]
    async fn test_lookup_failure_denies() {
        let decision = evaluator(GeographicRestrictionConfig::default())
            .evaluate("u-1", "8.8.8.8")
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.access_type, GeoAccessType::LookupFailed);
        assert_eq!(decision.reason, "lookup failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_denies() {
        let eval = GeographicRestrictionEvaluator::new(
            GeographicRestrictionConfig::default(),
            Arc::new(StalledLocator),
        );
        let decision = eval.evaluate("u-1", "203.0.113.10").await;
        assert_eq!(decision.access_type, GeoAccessType::LookupFailed);
    }

    #[tokio::test]
    async fn test_high_risk_country_requires_step_up() {
        let mut config = GeographicRestrictionConfig::default();
        config.allowed_countries.clear();
        config.allowed_regions.clear();
        config.allowed_ip_ranges.clear();

        let decision = evaluator(config).evaluate("u-1", "192.0.2.10").await;
        assert!(!decision.allowed);
        assert_eq!(decision.access_type, GeoAccessType::HighRiskLocation);
        assert!(decision.require_additional_auth);
    }

    #[tokio::test]
    async fn test_disabled_allows_anything() {
        let config = GeographicRestrictionConfig {
            enabled: false,
            ..GeographicRestrictionConfig::default()
        };
        let decision = evaluator(config).evaluate("u-1", "not an address").await;
        assert!(decision.allowed);
        assert_eq!(decision.access_type, GeoAccessType::Disabled);
    }
}
