//! Event Intake HTTP surface (spec.md §4.5/§6.1), consumed by CI and
//! by the rollback plan's PATCH callbacks.
//!
//! Router/state/auth-middleware shape ported from
//! `orchestrate-web/src/api.rs`'s `AppState`/`ApiError`/
//! `auth_middleware` (shared-secret header, `ApiError` mapping to
//! HTTP status by a `code` discriminant) and generalized to the
//! release domain: CI posts/patches `releases`, a shared secret
//! header replaces the original's per-deployment API key check.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use release_core::{NewRelease, ReleaseUpdate};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{EngineError, ReleaseEngine};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "invalid_transition" | "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            error: "missing or invalid shared-secret header".to_string(),
            code: "unauthorized".to_string(),
        }
    }
}

/// spec.md §6.1: `PATCH /release` returns "400 on `InvalidTransition`
/// or unknown `release_id`" — both are caller mistakes about the same
/// request, not a lookup failure, so an unknown `release_id` maps to
/// `bad_request` here rather than a 404.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Store(release_core::Error::ReleaseNotFound(id)) => Self {
                error: format!("release {id} not found"),
                code: "bad_request".to_string(),
            },
            EngineError::Store(release_core::Error::InvalidStateTransition(_, _)) => Self {
                error: err.to_string(),
                code: "invalid_transition".to_string(),
            },
            _ => Self {
                error: err.to_string(),
                code: "internal_error".to_string(),
            },
        }
    }
}

/// Shared application state for the Event Intake routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReleaseEngine>,
    /// Shared secret expected in the `X-Intake-Token` header. `None`
    /// disables auth (local/dev use only — spec.md §4.5 notes
    /// authentication is out of scope for the spec itself and left to
    /// deployment configuration).
    pub shared_secret: Option<SecretString>,
}

impl AppState {
    pub fn new(engine: Arc<ReleaseEngine>, shared_secret: Option<String>) -> Self {
        Self {
            engine,
            shared_secret: shared_secret.map(SecretString::new),
        }
    }
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ref expected) = state.shared_secret else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get("x-intake-token")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token == expected.expose_secret() => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized()),
    }
}

/// Builds the Event Intake router under `prefix` (spec.md §6.1: all
/// routes are relative to a configurable `{prefix}`).
pub fn create_intake_router(prefix: &str, state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/release", post(create_release).patch(update_release))
        .route("/table/create", get(create_table))
        .route("/table/drop", get(drop_table))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public = Router::new().route("/health", get(health_check));
    let routes = protected.merge(public);

    // axum's `Router::nest` requires a path starting with `/`; an empty
    // prefix (as used by this module's own tests) mounts the routes at
    // the root instead of nesting them under one.
    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    };

    router.with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CreateReleaseRequest {
    service_name: String,
    release_tag: String,
    initiated_by: String,
    #[serde(default)]
    ci_run_id: Option<String>,
    #[serde(default)]
    ci_action_link: Option<String>,
    #[serde(default)]
    ci_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateReleaseResponse {
    release_id: i64,
}

async fn create_release(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateReleaseRequest>,
) -> Result<(StatusCode, Json<CreateReleaseResponse>), ApiError> {
    info!(service = %body.service_name, tag = %body.release_tag, "intake: create_release");
    let release = state
        .engine
        .create(NewRelease {
            service_name: body.service_name,
            release_tag: body.release_tag,
            initiated_by: body.initiated_by,
            github_run_id: body.ci_run_id,
            github_action_link: body.ci_action_link,
            github_ref: body.ci_ref,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateReleaseResponse { release_id: release.id }),
    ))
}

#[derive(Debug, Deserialize)]
struct PatchReleaseRequest {
    release_id: i64,
    #[serde(default)]
    status: Option<release_core::ReleaseStatus>,
    #[serde(default)]
    ci_run_id: Option<String>,
    #[serde(default)]
    ci_action_link: Option<String>,
    #[serde(default)]
    rollback_to_tag: Option<String>,
}

async fn update_release(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PatchReleaseRequest>,
) -> Result<StatusCode, ApiError> {
    let release_id = body.release_id;
    let result = state
        .engine
        .update(
            release_id,
            ReleaseUpdate {
                status: body.status,
                rollback_to_tag: body.rollback_to_tag,
                github_run_id: body.ci_run_id,
                github_action_link: body.ci_action_link,
                ..Default::default()
            },
        )
        .await;

    match result {
        Ok(release) => {
            info!(release_id, status = release.status.as_str(), "intake: update_release");
            Ok(StatusCode::OK)
        }
        Err(err) => {
            warn!(release_id, error = %err, "intake: update_release rejected");
            Err(err.into())
        }
    }
}

async fn create_table(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.engine.database().create_table().await.map_err(EngineError::from)?;
    Ok(StatusCode::OK)
}

async fn drop_table(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.engine.database().drop_table().await.map_err(EngineError::from)?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use release_ci::{CiTriggerClient, CiTriggerConfig};
    use release_core::Database;
    use release_rollback::{ProductionHost, RollbackExecutor};
    use secrecy::SecretString;
    use std::collections::{HashMap, HashSet};
    use tower::ServiceExt;

    async fn test_engine() -> Arc<ReleaseEngine> {
        let db = Database::in_memory().await.unwrap();
        let ci = CiTriggerClient::new(CiTriggerConfig::default(), SecretString::new("t".into())).unwrap();
        let rollback = RollbackExecutor::new(
            ProductionHost::default(),
            SecretString::new("p".into()),
            "http://localhost".into(),
        );
        let policy = crate::engine::ApprovalPolicy::new(
            HashSet::from(["alice".to_string(), "bob".to_string()]),
            HashSet::from(["alice".to_string()]),
        );
        Arc::new(ReleaseEngine::new(
            db,
            ci,
            crate::engine::CiDispatchTarget { repo: "svc".into() },
            rollback,
            HashMap::new(),
            policy,
        ))
    }

    #[tokio::test]
    async fn create_release_returns_201_with_an_id() {
        let engine = test_engine().await;
        let state = Arc::new(AppState::new(engine, None));
        let app = create_intake_router("", state);

        let body = serde_json::json!({
            "service_name": "checkout",
            "release_tag": "v1.2.3",
            "initiated_by": "ci-bot",
            "ci_run_id": "42",
        });
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/release")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: CreateReleaseResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.release_id, 1);
    }

    #[tokio::test]
    async fn patch_with_illegal_transition_returns_400() {
        let engine = test_engine().await;
        let release = engine
            .create(NewRelease {
                service_name: "checkout".into(),
                release_tag: "v1".into(),
                initiated_by: "ci-bot".into(),
                github_run_id: None,
                github_action_link: None,
                github_ref: None,
            })
            .await
            .unwrap();
        let state = Arc::new(AppState::new(engine, None));
        let app = create_intake_router("", state);

        let body = serde_json::json!({ "release_id": release.id, "status": "deployed" });
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("PATCH")
                    .uri("/release")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_with_unknown_release_id_returns_400_not_404() {
        let engine = test_engine().await;
        let state = Arc::new(AppState::new(engine, None));
        let app = create_intake_router("", state);

        let body = serde_json::json!({ "release_id": 999, "status": "stage_building" });
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("PATCH")
                    .uri("/release")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_check_is_not_gated_by_auth() {
        let engine = test_engine().await;
        let state = Arc::new(AppState::new(engine, Some("secret".into())));
        let app = create_intake_router("", state);
        let response = app
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn release_routes_reject_missing_shared_secret() {
        let engine = test_engine().await;
        let state = Arc::new(AppState::new(engine, Some("secret".into())));
        let app = create_intake_router("", state);
        let body = serde_json::json!({
            "service_name": "checkout", "release_tag": "v1", "initiated_by": "ci-bot",
        });
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/release")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
