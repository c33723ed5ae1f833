//! Location risk assessment.

use std::collections::BTreeSet;

use serde::Serialize;
use warden_config::RiskBasedAuthConfig;

use crate::lookup::LookupError;

/// How many recent accesses are compared against.
pub const HISTORY_WINDOW: usize = 10;

/// Fewer samples than this count as limited history.
pub const MIN_HISTORY_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    NewCountry,
    LimitedHistory,
    HighRiskCountry,
    AssessmentError,
}

impl RiskFactor {
    fn weight(self) -> u8 {
        match self {
            RiskFactor::NewCountry => 3,
            RiskFactor::LimitedHistory => 2,
            RiskFactor::HighRiskCountry => 7,
            RiskFactor::AssessmentError => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    /// Distinct countries seen in the history window.
    pub usual_countries: BTreeSet<String>,
    /// 0-10.
    pub score: u8,
}

impl RiskAssessment {
    fn from_factors(factors: Vec<RiskFactor>, usual_countries: BTreeSet<String>) -> Self {
        let level = if factors.contains(&RiskFactor::HighRiskCountry) {
            RiskLevel::High
        } else if factors.is_empty() {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };
        let score = factors
            .iter()
            .map(|f| f.weight())
            .fold(0u8, u8::saturating_add)
            .min(10);
        Self {
            level,
            factors,
            usual_countries,
            score,
        }
    }

    /// Medium or high risk.
    pub fn is_suspicious(&self) -> bool {
        self.level >= RiskLevel::Medium
    }
}

/// Scores a request from `country` given the caller's recent history.
///
/// With anomaly detection off only the high-risk list is consulted. A failed
/// history lookup yields medium risk.
pub fn assess(
    country: &str,
    history: Result<Vec<String>, LookupError>,
    config: &RiskBasedAuthConfig,
) -> RiskAssessment {
    let mut factors = Vec::new();
    let mut usual = BTreeSet::new();

    if config.anomaly_detection {
        match history {
            Ok(samples) => {
                usual = samples.iter().cloned().collect();
                if !usual.contains(country) {
                    factors.push(RiskFactor::NewCountry);
                }
                if samples.len() < MIN_HISTORY_SAMPLES {
                    factors.push(RiskFactor::LimitedHistory);
                }
            }
            Err(_) => factors.push(RiskFactor::AssessmentError),
        }
    }

    if config
        .high_risk_countries
        .iter()
        .any(|c| c.eq_ignore_ascii_case(country))
    {
        factors.push(RiskFactor::HighRiskCountry);
    }

    RiskAssessment::from_factors(factors, usual)
}
