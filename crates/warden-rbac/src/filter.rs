//! Search pre-filters.
//!
//! [`build_filter`] turns a [`Subject`] into a boolean expression the search
//! collaborator applies before returning candidates. The filter is coarse:
//! every record the per-record check would allow also matches it, but not the
//! other way round (allowed hours and weekdays of a validity window are only
//! checked per record).
//!
//! Department terms are emitted lowercased, so the index must store
//! `allowed_departments` the same way (a lowercase keyword normalizer).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;
use warden_config::WardenConfig;
use warden_types::{RecordPermission, WILDCARD_MARKERS, department_key};

use crate::subject::Subject;

/// Index field names of record permission metadata.
pub mod fields {
    pub const ALLOWED_USERS: &str = "allowed_users";
    pub const OWNER: &str = "owner";
    pub const ALLOWED_ORGANIZATIONS: &str = "allowed_organizations";
    pub const ALLOWED_DEPARTMENTS: &str = "allowed_departments";
    pub const REQUIRED_ROLE: &str = "required_role";
    pub const CLASSIFICATION: &str = "classification";
    pub const TAGS: &str = "tags";
    pub const PROJECTS: &str = "projects";
    pub const GEO_RESTRICTIONS: &str = "geo_restrictions";
    pub const TIME_WINDOW: &str = "time_window";
    pub const VALID_FROM: &str = "time_window.valid_from";
    pub const VALID_UNTIL: &str = "time_window.valid_until";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter has {size} terms, more than the limit of {max}")]
    TooLarge { size: usize, max: usize },
}

/// Boolean filter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    MatchAll,
    And(Vec<FilterExpr>),
    /// At least one branch must match.
    Or(Vec<FilterExpr>),
    Terms {
        field: &'static str,
        values: Vec<String>,
    },
    /// Field absent or empty.
    Missing { field: &'static str },
    Range {
        field: &'static str,
        gte: Option<DateTime<Utc>>,
        lte: Option<DateTime<Utc>>,
    },
}

impl FilterExpr {
    fn terms<I, S>(field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterExpr::Terms {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, FilterExpr::MatchAll)
    }

    /// Number of leaf terms; what `max_filter_size` limits.
    pub fn size(&self) -> usize {
        match self {
            FilterExpr::MatchAll => 0,
            FilterExpr::And(children) | FilterExpr::Or(children) => children.iter().map(FilterExpr::size).sum(),
            FilterExpr::Terms { values, .. } => values.len(),
            FilterExpr::Missing { .. } | FilterExpr::Range { .. } => 1,
        }
    }

    /// OpenSearch query DSL.
    pub fn to_json(&self) -> Value {
        match self {
            FilterExpr::MatchAll => json!({ "match_all": {} }),
            FilterExpr::And(children) => {
                let must: Vec<Value> = children.iter().map(FilterExpr::to_json).collect();
                json!({ "bool": { "must": must } })
            }
            FilterExpr::Or(children) => {
                let should: Vec<Value> = children.iter().map(FilterExpr::to_json).collect();
                json!({ "bool": { "should": should, "minimum_should_match": 1 } })
            }
            FilterExpr::Terms { field, values } => json!({ "terms": { *field: values } }),
            FilterExpr::Missing { field } => {
                json!({ "bool": { "must_not": { "exists": { "field": field } } } })
            }
            FilterExpr::Range { field, gte, lte } => {
                let mut bounds = serde_json::Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), Value::String(gte.to_rfc3339()));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), Value::String(lte.to_rfc3339()));
                }
                json!({ "range": { *field: bounds } })
            }
        }
    }

    /// Evaluates the filter against a record's metadata locally.
    pub fn matches(&self, record: &RecordPermission) -> bool {
        match self {
            FilterExpr::MatchAll => true,
            FilterExpr::And(children) => children.iter().all(|c| c.matches(record)),
            FilterExpr::Or(children) => children.iter().any(|c| c.matches(record)),
            FilterExpr::Terms { field, values } => match field_of(record, field) {
                Field::Values(present) => present.iter().any(|v| values.contains(v)),
                _ => false,
            },
            FilterExpr::Missing { field } => matches!(field_of(record, field), Field::Absent),
            FilterExpr::Range { field, gte, lte } => match field_of(record, field) {
                Field::Instant(at) => gte.is_none_or(|g| at >= g) && lte.is_none_or(|l| at <= l),
                _ => false,
            },
        }
    }
}

impl Serialize for FilterExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

enum Field {
    Absent,
    Present,
    Values(Vec<String>),
    Instant(DateTime<Utc>),
}

fn list(values: &[String]) -> Field {
    if values.is_empty() {
        Field::Absent
    } else {
        Field::Values(values.to_vec())
    }
}

fn field_of(record: &RecordPermission, field: &str) -> Field {
    match field {
        fields::ALLOWED_USERS => list(&record.allowed_users),
        fields::OWNER => record
            .owner
            .as_ref()
            .map_or(Field::Absent, |o| Field::Values(vec![o.clone()])),
        fields::ALLOWED_ORGANIZATIONS => list(&record.allowed_organizations),
        fields::ALLOWED_DEPARTMENTS => {
            let departments: Vec<String> = record.allowed_departments.iter().map(|d| department_key(d)).collect();
            list(&departments)
        }
        fields::REQUIRED_ROLE => Field::Values(vec![record.required_role.as_str().to_string()]),
        fields::CLASSIFICATION => Field::Values(vec![record.classification.as_str().to_string()]),
        fields::TAGS => list(&record.tags),
        fields::PROJECTS => list(&record.projects),
        fields::GEO_RESTRICTIONS => list(&record.geo_restrictions),
        fields::TIME_WINDOW => record.time_window.as_ref().map_or(Field::Absent, |_| Field::Present),
        fields::VALID_FROM => record
            .time_window
            .as_ref()
            .and_then(|w| w.valid_from)
            .map_or(Field::Absent, Field::Instant),
        fields::VALID_UNTIL => record
            .time_window
            .as_ref()
            .and_then(|w| w.valid_until)
            .map_or(Field::Absent, Field::Instant),
        _ => Field::Absent,
    }
}

// ============================================================================
// Construction
// ============================================================================

fn with_wildcards<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    values
        .into_iter()
        .cloned()
        .chain(WILDCARD_MARKERS.iter().map(ToString::to_string))
        .collect()
}

/// Matches records whose list intersects `values` or that carry no list.
fn intersect_or_missing(field: &'static str, values: &[String]) -> FilterExpr {
    if values.is_empty() {
        FilterExpr::Missing { field }
    } else {
        FilterExpr::Or(vec![
            FilterExpr::terms(field, values.iter().cloned()),
            FilterExpr::Missing { field },
        ])
    }
}

fn time_window_clause(now: DateTime<Utc>) -> FilterExpr {
    let from = FilterExpr::Or(vec![
        FilterExpr::Range {
            field: fields::VALID_FROM,
            gte: None,
            lte: Some(now),
        },
        FilterExpr::Missing {
            field: fields::VALID_FROM,
        },
    ]);
    let until = FilterExpr::Or(vec![
        FilterExpr::Range {
            field: fields::VALID_UNTIL,
            gte: Some(now),
            lte: None,
        },
        FilterExpr::Missing {
            field: fields::VALID_UNTIL,
        },
    ]);
    FilterExpr::Or(vec![
        FilterExpr::And(vec![from, until]),
        FilterExpr::Missing {
            field: fields::TIME_WINDOW,
        },
    ])
}

/// Builds the pre-filter for `subject`.
///
/// Returns [`FilterExpr::MatchAll`] when checking is disabled or an admin
/// bypasses it. Fails when the filter exceeds `performance.max_filter_size`.
pub fn build_filter(subject: &Subject, config: &WardenConfig, now: DateTime<Utc>) -> Result<FilterExpr, FilterError> {
    let engine = &config.engine;
    if !engine.enabled || (engine.admin_bypass && subject.is_admin()) {
        return Ok(FilterExpr::MatchAll);
    }

    let mut clauses = Vec::with_capacity(9);

    clauses.push(FilterExpr::Or(vec![
        FilterExpr::terms(fields::ALLOWED_USERS, with_wildcards([&subject.caller_id])),
        FilterExpr::terms(fields::OWNER, [subject.caller_id.clone()]),
    ]));
    clauses.push(FilterExpr::terms(
        fields::ALLOWED_ORGANIZATIONS,
        with_wildcards(&subject.organizations),
    ));
    clauses.push(FilterExpr::terms(
        fields::ALLOWED_DEPARTMENTS,
        with_wildcards(&subject.departments),
    ));
    clauses.push(FilterExpr::terms(
        fields::REQUIRED_ROLE,
        subject.role.accessible_levels().iter().map(|r| r.as_str()),
    ));
    clauses.push(FilterExpr::terms(
        fields::CLASSIFICATION,
        subject.clearance.accessible_levels().iter().map(|c| c.as_str()),
    ));

    let tags: Vec<String> = subject.tags.iter().cloned().collect();
    clauses.push(intersect_or_missing(fields::TAGS, &tags));
    let projects: Vec<String> = subject.projects.iter().cloned().collect();
    clauses.push(intersect_or_missing(fields::PROJECTS, &projects));

    if let Some(geo) = &subject.geo_restrictions {
        clauses.push(FilterExpr::Or(vec![
            FilterExpr::terms(fields::GEO_RESTRICTIONS, geo.iter().cloned()),
            FilterExpr::Missing {
                field: fields::GEO_RESTRICTIONS,
            },
        ]));
    }

    clauses.push(time_window_clause(now));

    let filter = FilterExpr::And(clauses);
    let size = filter.size();
    let max = config.performance.max_filter_size;
    if size > max {
        warn!(caller_id = %subject.caller_id, size, max, "search filter too large");
        return Err(FilterError::TooLarge { size, max });
    }
    Ok(filter)
}
