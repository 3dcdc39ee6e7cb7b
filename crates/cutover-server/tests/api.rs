//! Operator API over a fully wired in-memory system.
//!
//! Guarantees exercised here:
//! - Admin endpoints require the bearer token, the schedule endpoint the
//!   shared-secret header; refusals are 401 with a JSON body.
//! - Unknown alert types are 400, illegal phase moves are 409.
//! - The schedule endpoint runs a cycle and returns its report.

use cutover_core::CycleReport;
use cutover_server::{routes, ApiState, Credentials};
use cutover_store::{MigrationPhase, PhaseChange};
use cutover_test_utils::{key, TestHarness};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{json, Value};
use warp::http::StatusCode;

const ADMIN: &str = "Bearer test-admin";

fn state(h: &TestHarness) -> ApiState {
    ApiState::new(
        h.system.clone(),
        Credentials::new(
            Some(SecretString::from("test-admin".to_string())),
            Some(SecretString::from("test-cron".to_string())),
            "x-cron-secret",
        ),
    )
}

fn body(resp: &[u8]) -> Value {
    serde_json::from_slice(resp).unwrap()
}

/// Tenet: administrator endpoints refuse missing or wrong tokens.
#[tokio::test]
async fn dashboard_requires_admin_token() {
    let h = TestHarness::default();
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/dashboard")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body(resp.body())["error"].is_string());

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/dashboard")
        .header("authorization", "Bearer wrong")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/dashboard")
        .header("authorization", ADMIN)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(resp.body())["currentPhase"], "LEGACY_ONLY");
}

/// Tenet: recovery answers with the action taken.
#[tokio::test]
async fn recover_runs_mapped_action() {
    let h = TestHarness::default();
    h.advance_to(MigrationPhase::DualWrite).await;
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/recover")
        .header("authorization", ADMIN)
        .json(&json!({ "alertType": "RECONCILIATION_BACKLOG" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body(resp.body()),
        json!({ "success": true, "alertType": "RECONCILIATION_BACKLOG", "action": "sync_backlog" })
    );
}

/// Tenet: an unknown alert type is a client error.
#[tokio::test]
async fn recover_rejects_unknown_alert_type() {
    let h = TestHarness::default();
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/recover")
        .header("authorization", ADMIN)
        .json(&json!({ "alertType": "DISK_ON_FIRE" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body(resp.body())["error"]
        .as_str()
        .unwrap()
        .contains("DISK_ON_FIRE"));
}

/// Tenet: operators advance one step at a time; skipping is a conflict.
#[tokio::test]
async fn phase_endpoint_enforces_transitions() {
    let h = TestHarness::default();
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/phase")
        .header("authorization", ADMIN)
        .json(&json!({ "target": "NEW_ONLY", "reason": "skip ahead" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(h.phase().await, MigrationPhase::LegacyOnly);

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/phase")
        .header("authorization", ADMIN)
        .json(&json!({ "target": "DUAL_WRITE", "reason": "start dual writes" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let change: PhaseChange = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(change.from, MigrationPhase::LegacyOnly);
    assert_eq!(change.to, MigrationPhase::DualWrite);
    assert_eq!(h.phase().await, MigrationPhase::DualWrite);
}

/// Tenet: manual rollback defaults to the safe fallback phase.
#[tokio::test]
async fn rollback_endpoint_defaults_to_dual_write() {
    let h = TestHarness::default();
    h.advance_to(MigrationPhase::NewOnly).await;
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/rollback")
        .header("authorization", ADMIN)
        .json(&json!({ "reason": "customer reports" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.phase().await, MigrationPhase::DualWrite);

    // Already at the fallback; rolling back to it again is not a move back
    let resp = warp::test::request()
        .method("POST")
        .path("/migration/rollback")
        .header("authorization", ADMIN)
        .json(&json!({ "reason": "again" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

/// Tenet: the scheduler endpoint needs the shared secret and runs a cycle.
#[tokio::test]
async fn schedule_runs_cycle() {
    let h = TestHarness::default();
    h.advance_to(MigrationPhase::DualWrite).await;
    h.legacy.seed(key("a"), json!({ "x": 1 }));
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/schedule")
        .header("authorization", ADMIN)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/schedule")
        .header("x-cron-secret", "test-cron")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let report: CycleReport = serde_json::from_slice(resp.body()).unwrap();
    assert!(!report.skipped);
    assert_eq!(report.discrepancies_found, 1);
    assert_eq!(report.sync.map(|s| s.corrected), Some(1));
    assert_eq!(h.target.snapshot(&key("a")), Some(json!({ "x": 1 })));
}

/// Tenet: malformed bodies and unknown paths get JSON errors.
#[tokio::test]
async fn malformed_requests_are_json_errors() {
    let h = TestHarness::default();
    let api = routes(state(&h));

    let resp = warp::test::request()
        .method("POST")
        .path("/migration/phase")
        .header("authorization", ADMIN)
        .json(&json!({ "target": "SIDEWAYS", "reason": "x" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = warp::test::request()
        .method("GET")
        .path("/migration/nowhere")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body(resp.body())["error"].is_string());
}
