//! Business-hours and holiday evaluation.
//!
//! Check order:
//! 1. restriction disabled
//! 2. emergency identity
//! 3. after-hours role
//! 4. holiday (returns the configured holiday decision)
//! 5. business day
//! 6. business hour, half-open `[start_hour, end_hour)`
//!
//! Local date, weekday and hour are computed in the configured IANA
//! timezone. An unknown timezone or an unparsable instant denies.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;
use warden_config::TimeRestrictionConfig;
use warden_types::{RoleLevel, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAccessType {
    Disabled,
    Emergency,
    AfterHoursRole,
    Holiday,
    NonBusinessDay,
    OutsideBusinessHours,
    BusinessHours,
    InvalidInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeDecision {
    pub allowed: bool,
    pub access_type: TimeAccessType,
    pub reason: String,
    /// Local wall-clock time the decision was made at, when it was computed.
    pub local_time: Option<String>,
}

impl TimeDecision {
    fn allow(access_type: TimeAccessType, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            access_type,
            reason: reason.into(),
            local_time: None,
        }
    }

    fn deny(access_type: TimeAccessType, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            access_type,
            reason: reason.into(),
            local_time: None,
        }
    }

    fn at(mut self, local: &DateTime<Tz>) -> Self {
        self.local_time = Some(local.format("%Y-%m-%d %H:%M %Z").to_string());
        self
    }
}

pub struct TimeRestrictionEvaluator {
    config: TimeRestrictionConfig,
    timezone: Option<Tz>,
    holidays: BTreeSet<NaiveDate>,
}

impl TimeRestrictionEvaluator {
    pub fn new(config: TimeRestrictionConfig) -> Self {
        let timezone = match config.business_hours.timezone.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!(
                    timezone = %config.business_hours.timezone,
                    "unknown business timezone; time-restricted requests will be denied"
                );
                None
            }
        };

        let holidays = config
            .holidays
            .dates
            .iter()
            .filter_map(|date| match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!(date = %date, "skipping malformed holiday date");
                    None
                }
            })
            .collect();

        Self {
            config,
            timezone,
            holidays,
        }
    }

    /// The configured business timezone, if it resolved.
    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    pub fn evaluate(&self, caller_id: &str, role: RoleLevel, now: DateTime<Utc>) -> TimeDecision {
        if !self.config.enabled {
            return TimeDecision::allow(TimeAccessType::Disabled, "time restriction disabled");
        }

        if self
            .config
            .emergency_access_users
            .iter()
            .any(|user| user == caller_id)
        {
            return TimeDecision::allow(TimeAccessType::Emergency, "emergency access user");
        }

        if self.config.after_hours_roles.contains(&role) {
            return TimeDecision::allow(
                TimeAccessType::AfterHoursRole,
                format!("after-hours role {role}"),
            );
        }

        let Some(tz) = self.timezone else {
            return TimeDecision::deny(
                TimeAccessType::InvalidInput,
                format!(
                    "cannot resolve timezone {:?}",
                    self.config.business_hours.timezone
                ),
            );
        };

        let local = now.with_timezone(&tz);

        if self.holidays.contains(&local.date_naive()) {
            let allowed = self.config.holidays.allow_access;
            let decision = if allowed {
                TimeDecision::allow(TimeAccessType::Holiday, "holiday access permitted")
            } else {
                TimeDecision::deny(TimeAccessType::Holiday, "access is not permitted on holidays")
            };
            return decision.at(&local);
        }

        let hours = &self.config.business_hours;
        let weekday = local.weekday().num_days_from_sunday();
        if !hours.business_days.contains(&weekday) {
            return TimeDecision::deny(
                TimeAccessType::NonBusinessDay,
                format!("weekday {weekday} is not a business day"),
            )
            .at(&local);
        }

        let hour = local.hour();
        if hour < hours.start_hour || hour >= hours.end_hour {
            return TimeDecision::deny(
                TimeAccessType::OutsideBusinessHours,
                format!(
                    "outside business hours ({:02}:00-{:02}:00)",
                    hours.start_hour, hours.end_hour
                ),
            )
            .at(&local);
        }

        TimeDecision::allow(TimeAccessType::BusinessHours, "within business hours").at(&local)
    }

    /// Evaluates an instant supplied as RFC 3339 text.
    ///
    /// A missing or unparsable instant denies.
    pub fn evaluate_rfc3339(
        &self,
        caller_id: &str,
        role: RoleLevel,
        instant: Option<&str>,
    ) -> TimeDecision {
        match instant.map(DateTime::parse_from_rfc3339) {
            Some(Ok(parsed)) => self.evaluate(caller_id, role, parsed.with_timezone(&Utc)),
            Some(Err(e)) => {
                warn!(caller_id, error = %e, "rejecting unparsable request instant");
                TimeDecision::deny(TimeAccessType::InvalidInput, "invalid request instant")
            }
            None => TimeDecision::deny(TimeAccessType::InvalidInput, "missing request instant"),
        }
    }
}

/// Returns whether a record's validity window admits `now`.
///
/// Allowed hours and days are read in `tz`. Weekdays use 0 = Sunday.
pub fn window_admits(window: &TimeWindow, now: DateTime<Utc>, tz: Tz) -> bool {
    if !window.contains_instant(now) {
        return false;
    }
    let local = now.with_timezone(&tz);
    if let Some(hours) = &window.allowed_hours {
        let hour = local.hour();
        if !hours.iter().any(|h| u32::from(*h) == hour) {
            return false;
        }
    }
    if let Some(days) = &window.allowed_days {
        let weekday = local.weekday().num_days_from_sunday();
        if !days.iter().any(|d| u32::from(*d) == weekday) {
            return false;
        }
    }
    true
}
