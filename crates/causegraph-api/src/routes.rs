//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{cluster, events, files, jobs, network};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Job endpoints
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/events", get(events::job_events))
        .route("/jobs/:id/network", get(network::get_network))
        // Clustering-only entry point
        .route("/cluster", post(cluster::cluster_rows))
        // Artifact download
        .route("/files/:job_id", get(files::download_artifact))
}
