use crate::cli::ServeArgs;
use crate::infra::{load_registry, AppState, InMemoryRequestStore, StaticTokenVerifier};
use crate::routes::with_request_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dossier_desk::config::AppConfig;
use dossier_desk::error::AppError;
use dossier_desk::telemetry;
use dossier_desk::workflows::requests::{PriorityEngine, RequestQueueService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let registry = load_registry(config.deadlines.overrides_csv.as_deref())?;
    info!(
        categories = registry.entries().count(),
        default_window_days = registry.default_days(),
        overrides = ?config.deadlines.overrides_csv,
        "deadline registry loaded"
    );

    let verifier = StaticTokenVerifier::from_tokens(&config.auth.static_tokens);
    if verifier.is_empty() {
        warn!("APP_STATIC_TOKENS is empty; authenticated routes will reject every caller");
    }

    let engine = PriorityEngine::new(Arc::new(registry), config.priority);
    let service = Arc::new(RequestQueueService::new(
        Arc::new(InMemoryRequestStore::default()),
        Arc::new(verifier),
        engine,
    ));

    let app = with_request_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "dossier desk request queue ready");

    axum::serve(listener, app).await?;
    Ok(())
}
