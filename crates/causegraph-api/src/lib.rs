//! causegraph API - REST and SSE server
//!
//! HTTP endpoints for submitting causal extraction jobs, following their
//! progress and reading the resulting graphs.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{cluster, events, files, health, jobs, network};
use crate::middleware::metrics_middleware;
use crate::state::AppState;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "causegraph API",
        version = "0.1.0",
        description = "Causal relation extraction and topic clustering over tabular text"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        health::metrics,
        jobs::submit_job,
        jobs::get_job,
        jobs::delete_job,
        events::job_events,
        network::get_network,
        cluster::cluster_rows,
        files::download_artifact,
    ),
    components(schemas(
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
        jobs::SubmitJobRequest,
        jobs::SubmitJobResponse,
        jobs::JobStatusResponse,
        network::Neighbour,
        network::FocusInfo,
        network::NetworkResponse,
        cluster::ClusterRequest,
        cluster::ClusterResponse,
        error::ApiError,
    )),
    tags(
        (name = "health", description = "Liveness, readiness and metrics"),
        (name = "jobs", description = "Job submission, status and events"),
        (name = "cluster", description = "Clustering-only reconciliation"),
        (name = "files", description = "Graph artifact downloads")
    )
)]
pub struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Application state backed by in-memory models and storage
///
/// Serves `weather.csv` (column `text`, four reports) and `broken.csv`
/// (column `text`, one report the predictor fails on).
#[cfg(feature = "test-utils")]
pub fn create_test_state() -> Arc<AppState> {
    use causegraph_core::config::AppConfig;
    use causegraph_jobs::testing::{
        MemoryArtifactStore, MemoryRecordSource, ScriptedPredictor, TableClusterer,
    };
    use causegraph_jobs::{JobOrchestrator, JobService};

    let predictor = ScriptedPredictor::new()
        .with("Heavy rain caused floods.", &[("Heavy rain", "floods")])
        .with("The floods destroyed crops.", &[("The floods", "crops")])
        .with("Storms knocked out power.", &[("Storms", "power outages")])
        .failing_on("The sensor exploded.");
    let clusterer = TableClusterer::new(&[("heavy rain", 0), ("floods", 1), ("crops", 2)]);
    let source = MemoryRecordSource::new()
        .with_column(
            "weather.csv",
            "text",
            &[
                "Heavy rain caused floods.",
                "The floods destroyed crops.",
                "Nothing happened.",
                "Storms knocked out power.",
            ],
        )
        .with_column("broken.csv", "text", &["The sensor exploded."]);

    let mut config = AppConfig::default();
    config.storage.upload_dir = std::env::temp_dir();
    config.storage.download_dir = std::env::temp_dir();

    let orchestrator = JobOrchestrator::new(
        Arc::new(predictor),
        Arc::new(clusterer),
        Arc::new(MemoryArtifactStore::new()),
    );
    let service = Arc::new(JobService::new(
        orchestrator,
        Arc::new(source),
        &config.worker,
    ));

    Arc::new(AppState::new(config, service))
}

/// Router over [`create_test_state`]
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}
