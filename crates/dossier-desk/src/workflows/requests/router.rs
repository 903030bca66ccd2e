use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::ApplicationId;
use super::gate::{AuthError, Identity, IdentityVerifier};
use super::priority::RankingScope;
use super::service::{
    NewRequest, QueueServiceError, RequestQueueService, StatisticsWindow, DEFAULT_URGENT_DAYS,
};
use super::store::{RequestStore, StoreError};

/// Router builder exposing filing, ranking, and clerk dashboard endpoints.
pub fn request_router<S, V>(service: Arc<RequestQueueService<S, V>>) -> Router
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    Router::new()
        .route("/api/v1/requests", post(file_handler::<S, V>))
        .route("/api/v1/requests/ranking", get(ranking_handler::<S, V>))
        .route("/api/v1/requests/:request_id", get(request_handler::<S, V>))
        .route("/api/v1/clerk/queue", get(queue_handler::<S, V>))
        .route("/api/v1/clerk/urgent", get(urgent_handler::<S, V>))
        .route("/api/v1/clerk/statistics", get(statistics_handler::<S, V>))
        .route("/api/v1/deadlines", get(deadlines_handler::<S, V>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueueParams {
    #[serde(default)]
    pub(crate) include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UrgentParams {
    pub(crate) days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatisticsParams {
    pub(crate) timeframe: Option<String>,
}

pub(crate) async fn file_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
    Json(request): Json<NewRequest>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let result = authenticate(&service, &headers)
        .and_then(|identity| service.file_request(&identity, request));

    match result {
        Ok(filed) => (StatusCode::CREATED, Json(filed)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn request_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let id = ApplicationId(request_id);
    match authenticate(&service, &headers).and_then(|identity| service.get(&identity, &id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn ranking_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    match authenticate(&service, &headers).and_then(|identity| service.rank_for_citizen(&identity))
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn queue_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
    Query(params): Query<QueueParams>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let scope = if params.include_inactive {
        RankingScope::IncludeInactive
    } else {
        RankingScope::ActiveOnly
    };

    match authenticate(&service, &headers).and_then(|identity| service.clerk_queue(&identity, scope))
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn urgent_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
    Query(params): Query<UrgentParams>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let days = params.days.unwrap_or(DEFAULT_URGENT_DAYS);
    match authenticate(&service, &headers).and_then(|identity| service.urgent(&identity, days)) {
        Ok(urgent) => (
            StatusCode::OK,
            Json(json!({ "threshold_days": days, "data": urgent })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn statistics_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
    headers: HeaderMap,
    Query(params): Query<StatisticsParams>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let window = params
        .timeframe
        .as_deref()
        .and_then(StatisticsWindow::parse)
        .unwrap_or_default();

    match authenticate(&service, &headers)
        .and_then(|identity| service.statistics(&identity, window))
    {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn deadlines_handler<S, V>(
    State(service): State<Arc<RequestQueueService<S, V>>>,
) -> Response
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let registry = service.registry();
    let entries: Vec<_> = registry.entries().collect();
    let aliases: serde_json::Map<String, serde_json::Value> = registry
        .aliases()
        .map(|(alias, canonical)| (alias.to_string(), json!(canonical)))
        .collect();

    let payload = json!({
        "default_window_days": registry.default_days(),
        "entries": entries,
        "aliases": aliases,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn authenticate<S, V>(
    service: &RequestQueueService<S, V>,
    headers: &HeaderMap,
) -> Result<Identity, QueueServiceError>
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    service.authenticate(authorization)
}

pub(crate) fn error_response(err: QueueServiceError) -> Response {
    let status = match &err {
        QueueServiceError::Auth(AuthError::MissingToken | AuthError::InvalidToken) => {
            StatusCode::UNAUTHORIZED
        }
        QueueServiceError::Auth(AuthError::Forbidden { .. }) => StatusCode::FORBIDDEN,
        QueueServiceError::Auth(AuthError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
        QueueServiceError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
        QueueServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        QueueServiceError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
