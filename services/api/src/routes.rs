use crate::infra::AppState;
use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::Utc;
use dossier_desk::error::AppError;
use dossier_desk::workflows::requests::{
    parse_timestamp, request_router, ApplicationRecord, IdentityVerifier, PriorityEngine,
    RankingOutcome, RankingScope, RequestQueueService, RequestStore,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Stateless ranking request: a batch of store rows and an optional evaluation instant.
#[derive(Debug, Deserialize)]
pub(crate) struct RankBatchRequest {
    #[serde(default)]
    pub(crate) now: Option<String>,
    #[serde(default)]
    pub(crate) include_inactive: bool,
    pub(crate) applications: Vec<ApplicationRecord>,
}

pub(crate) fn with_request_routes<S, V>(service: Arc<RequestQueueService<S, V>>) -> axum::Router
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let engine = service.engine();
    request_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/priority/rank",
            axum::routing::post(rank_batch_endpoint).layer(Extension(engine)),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn rank_batch_endpoint(
    Extension(engine): Extension<Arc<PriorityEngine>>,
    body: Bytes,
) -> Result<Json<RankingOutcome>, AppError> {
    // Syntax and shape errors both map to 400 via `AppError::Batch`.
    let payload: RankBatchRequest = serde_json::from_slice(&body)?;
    let RankBatchRequest {
        now,
        include_inactive,
        applications,
    } = payload;

    let now = match now {
        Some(raw) => parse_timestamp(&raw).ok_or(AppError::Timestamp(raw))?,
        None => Utc::now(),
    };
    let scope = if include_inactive {
        RankingScope::IncludeInactive
    } else {
        RankingScope::ActiveOnly
    };

    Ok(Json(engine.rank_with_scope(&applications, now, scope)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InMemoryRequestStore, StaticTokenVerifier};
    use axum::body::Body;
    use axum::http::Request;
    use dossier_desk::config::StaticToken;
    use dossier_desk::workflows::requests::{DeadlineRegistry, PriorityPolicy, Role};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn engine() -> Arc<PriorityEngine> {
        Arc::new(PriorityEngine::new(
            Arc::new(DeadlineRegistry::standard()),
            PriorityPolicy::default(),
        ))
    }

    fn row(id: &str, flow_type: &str, due: Option<&str>, status: &str) -> ApplicationRecord {
        ApplicationRecord {
            id: id.to_string(),
            flow_type: Some(flow_type.to_string()),
            submitted_at: Some("2025-06-01T08:00:00Z".to_string()),
            legal_due_date: due.map(str::to_string),
            status: status.to_string(),
            citizen_id: None,
            assigned_clerk_id: None,
        }
    }

    fn app(ready: bool) -> axum::Router {
        let service = Arc::new(RequestQueueService::new(
            Arc::new(InMemoryRequestStore::default()),
            Arc::new(StaticTokenVerifier::from_tokens(&[StaticToken {
                token: "clerk-token".to_string(),
                user_id: "clerk-1".to_string(),
                role: Role::Clerk,
            }])),
            PriorityEngine::new(
                Arc::new(DeadlineRegistry::standard()),
                PriorityPolicy::default(),
            ),
        ));
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        };
        with_request_routes(service).layer(Extension(state))
    }

    #[tokio::test]
    async fn rank_batch_endpoint_orders_by_deadline() {
        let request = json!({
            "now": "2025-06-02T00:00:00Z",
            "applications": [
                row("late", "informare_urbanism", Some("2025-06-20T00:00:00Z"), "pending_validation"),
                row("soon", "informare_urbanism", Some("2025-06-04T00:00:00Z"), "in_review"),
                row("done", "informare_urbanism", Some("2025-06-03T00:00:00Z"), "approved"),
            ],
        });

        let Json(outcome) = rank_batch_endpoint(Extension(engine()), Bytes::from(request.to_string()))
            .await
            .expect("ranking succeeds");

        let ids: Vec<_> = outcome.ranked.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "late"]);
        assert_eq!(outcome.ranked[0].days_left, Some(2));
        assert_eq!(outcome.ranked[0].backlog_in_category, 2);
        assert_eq!(outcome.excluded_inactive, 1);
    }

    #[tokio::test]
    async fn rank_batch_endpoint_rejects_bad_now() {
        let request = json!({
            "now": "next week",
            "include_inactive": true,
            "applications": [],
        });

        let err = rank_batch_endpoint(Extension(engine()), Bytes::from(request.to_string()))
            .await
            .expect_err("invalid timestamp");
        assert!(matches!(err, AppError::Timestamp(ref raw) if raw == "next week"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rank_route_rejects_wrongly_shaped_batches_as_bad_request() {
        for body in [r#"{"now":"2025-06-02T00:00:00Z"}"#, r#"{"applications":"#] {
            let response = app(true)
                .oneshot(
                    Request::post("/api/v1/priority/rank")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body))
                        .expect("request"),
                )
                .await
                .expect("router response");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn rank_route_is_mounted_next_to_workflow_routes() {
        let body = json!({
            "now": "2025-06-02T00:00:00Z",
            "applications": [
                { "id": "a", "flow_type": "certificat_urbanism", "submitted_at": "2025-05-30T10:00:00", "status": "pending_validation" },
                { "id": "", "flow_type": "certificat_urbanism", "submitted_at": "2025-05-30T10:00:00", "status": "pending_validation" }
            ]
        });

        let response = app(true)
            .oneshot(
                Request::post("/api/v1/priority/rank")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["ranked"][0]["id"], "a");
        assert_eq!(payload["ranked"][0]["days_left"], serde_json::Value::Null);
        assert_eq!(payload["skipped"][0]["error"]["kind"], "missing_id");
    }

    #[tokio::test]
    async fn readiness_reflects_startup_state() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn clerk_routes_use_static_tokens() {
        let response = app(true)
            .oneshot(
                Request::get("/api/v1/clerk/queue")
                    .header(header::AUTHORIZATION, "Bearer clerk-token")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(true)
            .oneshot(
                Request::get("/api/v1/clerk/queue")
                    .header(header::AUTHORIZATION, "Bearer stolen")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn healthcheck_is_static() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }
}
