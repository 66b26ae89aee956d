//! End-to-end tests across `release-core` and `release-web`: a
//! release driven from creation through approval quorum, and through
//! the Event Intake HTTP surface.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use release_core::{Database, NewRelease, ReleaseStatus, ReleaseUpdate};
use release_web::{create_intake_router, AppState};
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

async fn test_engine() -> release_web::ReleaseEngine {
    release_web::ReleaseEngine::new(
        Database::in_memory().await.unwrap(),
        release_ci::CiTriggerClient::new(
            release_ci::CiTriggerConfig::default(),
            secrecy::SecretString::new("token".into()),
        )
        .unwrap(),
        release_web::CiDispatchTarget { repo: "checkout".into() },
        release_rollback::RollbackExecutor::new(
            release_rollback::ProductionHost::default(),
            secrecy::SecretString::new("password".into()),
            "http://localhost".into(),
        ),
        HashMap::new(),
        release_web::ApprovalPolicy::new(
            ["alice".to_string(), "bob".to_string()].into_iter().collect(),
            ["alice".to_string()].into_iter().collect(),
        ),
    )
}

async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn a_release_walks_through_the_approval_quorum_to_a_failed_ci_dispatch() {
    let engine = test_engine().await;

    let release = engine
        .create(NewRelease {
            service_name: "checkout".into(),
            release_tag: "v2.0.0".into(),
            initiated_by: "ci-bot".into(),
            github_run_id: Some("100".into()),
            github_action_link: None,
            github_ref: None,
        })
        .await
        .unwrap();
    assert_eq!(release.status, ReleaseStatus::Initiated);

    engine
        .update(
            release.id,
            ReleaseUpdate { status: Some(ReleaseStatus::StageBuilding), ..Default::default() },
        )
        .await
        .unwrap();
    engine
        .update(
            release.id,
            ReleaseUpdate { status: Some(ReleaseStatus::StageTestRollback), ..Default::default() },
        )
        .await
        .unwrap();
    let awaiting = engine
        .update(
            release.id,
            ReleaseUpdate { status: Some(ReleaseStatus::ManualTesting), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(awaiting.status, ReleaseStatus::ManualTesting);

    let outcome = engine.approve(release.id, "bob").await.unwrap();
    assert_eq!(outcome, release_web::ApprovalOutcome::AcceptedNotFinal);

    // alice closes the quorum; the configured CI endpoint is unreachable
    // in this test environment, so the dispatch fails but the approval
    // write (quorum closed -> ManualTestPassed) has already committed.
    let err = engine.approve(release.id, "alice").await.unwrap_err();
    assert!(matches!(err, release_web::EngineError::CiDispatch(_)));

    let reloaded = engine.get(release.id).await.unwrap();
    assert_eq!(reloaded.status, ReleaseStatus::ManualTestPassed);
    assert_eq!(reloaded.approved_list, vec!["bob".to_string(), "alice".to_string()]);
}

#[tokio::test]
async fn event_intake_creates_and_patches_a_release_over_http() {
    let engine = Arc::new(test_engine().await);
    let state = Arc::new(AppState::new(engine, Some("shared-secret".to_string())));
    let app = create_intake_router("/intake", state);

    let create_body = serde_json::json!({
        "service_name": "checkout",
        "release_tag": "v2.0.0",
        "initiated_by": "ci-bot",
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/intake/release")
                .header("content-type", "application/json")
                .header("x-intake-token", "shared-secret")
                .body(Body::from(create_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let parsed: serde_json::Value =
        serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
    let release_id = parsed["release_id"].as_i64().unwrap();

    let patch_body = serde_json::json!({
        "release_id": release_id,
        "status": "stage_building",
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/intake/release")
                .header("content-type", "application/json")
                .header("x-intake-token", "shared-secret")
                .body(Body::from(patch_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = app
        .oneshot(
            Request::builder()
                .uri("/intake/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}
