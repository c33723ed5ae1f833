//! End-to-end decisions through the public engine API.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use warden::{
    AccessDecisionEngine, AuditAction, AuditQuery, AuditResult, CallerProfile, Classification, DecisionRequest,
    GeoLocation, GrantSource, InMemorySearchBackend, PipelineState, RecordPermission, RoleLevel, SearchHit,
    StaticGeoLocator, TemporaryAccessOutcome, TemporaryAccessRequest, WardenConfig,
};

const TOKYO_ORIGIN: &str = "203.0.113.10";
const BEIJING_ORIGIN: &str = "192.0.2.44";

/// Tuesday 2025-06-10 at `hour`:00 Tokyo time.
fn tokyo(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap() + Duration::hours(i64::from(hour) - 9)
}

fn locator() -> Arc<StaticGeoLocator> {
    Arc::new(
        StaticGeoLocator::new()
            .with_range("203.0.113.0/24".parse().unwrap(), GeoLocation::new("JP", "Tokyo"))
            .with_range("192.0.2.0/24".parse().unwrap(), GeoLocation::new("CN", "Beijing")),
    )
}

fn corpus() -> Vec<SearchHit> {
    vec![
        SearchHit::new(
            RecordPermission::public("handbook").requiring_role(RoleLevel::Guest),
            json!({ "title": "Employee Handbook" }),
        ),
        SearchHit::new(
            RecordPermission::public("salaries")
                .classified(Classification::Restricted)
                .for_departments(&["hr"]),
            json!({ "title": "Salary Bands" }),
        ),
        SearchHit::new(
            RecordPermission::public("beta-design")
                .classified(Classification::Internal)
                .in_projects(&["project_beta"]),
            json!({ "title": "Beta Design" }),
        ),
    ]
}

fn engine(config: WardenConfig) -> AccessDecisionEngine {
    AccessDecisionEngine::builder(config)
        .with_geo_locator(locator())
        .with_search_backend(Arc::new(InMemorySearchBackend::new(corpus())))
        .build()
}

fn caller(id: &str) -> CallerProfile {
    CallerProfile::new(id, "acme", RoleLevel::User, Classification::Internal).with_department("engineering")
}

fn request(id: &str, origin: &str) -> DecisionRequest {
    DecisionRequest::new(caller(id), "*", origin, "session-1").with_user_agent("warden-tests")
}

#[tokio::test]
async fn test_business_hours_search_allowed() {
    let engine = engine(WardenConfig::default());

    let decision = engine.authorize_at(request("user001", TOKYO_ORIGIN), tokyo(10)).await;

    assert!(decision.allowed());
    let visible: Vec<&str> = decision.results.iter().map(SearchHit::record_id).collect();
    assert_eq!(visible, vec!["handbook"]);
    assert_eq!(decision.response.applied_rules.len(), 9);
    assert_eq!(decision.response.filtered_result_count, Some(1));
    assert_eq!(decision.grant_source, Some(GrantSource::Fresh));
    assert_eq!(
        decision.states,
        vec![
            PipelineState::Received,
            PipelineState::TimeChecked,
            PipelineState::GeoChecked,
            PipelineState::PermissionsResolved,
            PipelineState::FilterBuilt,
            PipelineState::ResultsChecked,
            PipelineState::Allowed,
            PipelineState::Logged,
        ]
    );
}

#[tokio::test]
async fn test_after_hours_user_denied() {
    let engine = engine(WardenConfig::default());

    let decision = engine.authorize_at(request("user001", TOKYO_ORIGIN), tokyo(20)).await;

    assert!(!decision.allowed());
    assert!(decision.response.reason.contains("time restriction"));
    assert!(decision.results.is_empty());
    assert!(decision.response.applied_rules.is_empty());

    engine.audit().flush().await;
    let denials = engine
        .audit()
        .query(&AuditQuery::default().with_result(AuditResult::Deny))
        .await
        .unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].action, AuditAction::PermissionFilterRequest);
}

async fn assert_exempt_from_beijing(caller_id: &str, hour: u32) {
    let engine = engine(WardenConfig::default());

    let decision = engine.authorize_at(request(caller_id, BEIJING_ORIGIN), tokyo(hour)).await;

    assert!(decision.allowed(), "{}", decision.response.reason);
    assert!(!decision.require_additional_auth);
}

#[tokio::test]
async fn test_emergency_user_after_hours_from_high_risk_country() {
    assert_exempt_from_beijing("emergency001", 20).await;
}

#[tokio::test]
async fn test_geo_exempt_user_from_high_risk_country() {
    assert_exempt_from_beijing("global_admin", 10).await;
}

#[tokio::test]
async fn test_unexempt_caller_from_high_risk_country_denied() {
    let engine = engine(WardenConfig::default());

    let decision = engine.authorize_at(request("user001", BEIJING_ORIGIN), tokyo(10)).await;

    assert!(!decision.allowed());
    assert!(decision.response.reason.contains("geographic restriction"));
    assert_eq!(decision.response.applied_rules, vec!["time_restriction"]);
}

fn manager(id: &str) -> CallerProfile {
    CallerProfile::new(id, "acme", RoleLevel::Manager, Classification::Internal).with_department("engineering")
}

#[tokio::test]
async fn test_temporary_access_opens_project_record() {
    let engine = engine(WardenConfig::default());
    let now = tokyo(10);
    let search = || DecisionRequest::new(manager("manager001"), "*", TOKYO_ORIGIN, "session-2");

    let before = engine.authorize_at(search(), now).await;
    assert!(before.results.iter().all(|hit| hit.record_id() != "beta-design"));

    let outcome = engine
        .request_temporary_access(
            &manager("manager001"),
            TemporaryAccessRequest::new("project_beta", Classification::Internal)
                .for_seconds(1800)
                .because("release review"),
            now,
        )
        .await
        .unwrap();
    let TemporaryAccessOutcome::AutoApproved(grant) = outcome else {
        panic!("expected auto-approval");
    };
    assert_eq!(grant.caller_id, "manager001");
    assert_eq!(grant.expires_at, now + Duration::seconds(1800));

    let later = now + Duration::minutes(5);
    let during = engine.authorize_at(search(), later).await;
    assert!(during.results.iter().any(|hit| hit.record_id() == "beta-design"));
}

#[tokio::test]
async fn test_claimed_role_does_not_auto_approve() {
    let engine = engine(WardenConfig::default());
    let now = tokyo(10);

    let payload = json!({
        "resource": "project_beta",
        "classification": "internal",
        "durationSeconds": 1800,
        "role": "manager"
    });
    let temp_request: TemporaryAccessRequest = serde_json::from_value(payload).unwrap();
    let outcome = engine
        .request_temporary_access(&caller("user001"), temp_request, now)
        .await
        .unwrap();
    assert!(matches!(outcome, TemporaryAccessOutcome::PendingApproval { .. }));

    let later = now + Duration::minutes(5);
    let decision = engine.authorize_at(request("user001", TOKYO_ORIGIN), later).await;
    assert!(decision.allowed());
    assert!(decision.results.iter().all(|hit| hit.record_id() != "beta-design"));
}

#[tokio::test]
async fn test_long_temporary_access_waits_for_approver() {
    let engine = engine(WardenConfig::default());
    let now = tokyo(10);

    let outcome = engine
        .request_temporary_access(
            &caller("user001"),
            TemporaryAccessRequest::new("project_beta", Classification::Confidential).for_seconds(7200),
            now,
        )
        .await
        .unwrap();
    let TemporaryAccessOutcome::PendingApproval { request_id, approvers } = outcome else {
        panic!("expected pending approval");
    };
    assert!(approvers.iter().any(|a| a == "security_admin"));

    assert!(
        engine
            .approve_temporary_access(request_id, "user002", now)
            .await
            .is_err()
    );
    let grant = engine
        .approve_temporary_access(request_id, "security_admin", now)
        .await
        .unwrap();
    assert_eq!(grant.granted_by, "security_admin");
    assert_eq!(grant.caller_id, "user001");
}

#[tokio::test]
async fn test_disabled_engine_returns_every_candidate() {
    let mut config = WardenConfig::default();
    config.engine.enabled = false;
    let engine = engine(config);

    let decision = engine.authorize_at(request("user001", TOKYO_ORIGIN), tokyo(10)).await;

    assert!(decision.allowed());
    assert_eq!(decision.results.len(), 3);
    assert_eq!(decision.response.applied_rules, vec!["disabled"]);
}
