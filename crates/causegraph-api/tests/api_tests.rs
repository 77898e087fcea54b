//! API Integration Tests
//!
//! Run against in-memory models and storage; jobs are executed by claiming
//! them from the queue directly instead of through a worker pool.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use causegraph_api::{create_router, create_router_for_testing, create_test_state, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn test_app() -> (Arc<AppState>, Router) {
    let state = create_test_state();
    let app = create_router(Arc::clone(&state));
    (state, app)
}

async fn submit(app: &Router, source: &str, cluster: bool) -> Uuid {
    let (status, json) = send_json(
        app,
        create_json_request(
            "POST",
            "/api/v1/jobs",
            Some(json!({
                "source_reference": source,
                "column_name": "text",
                "cluster": cluster
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    json["job_id"].as_str().unwrap().parse().unwrap()
}

/// Claim the next queued job and run it to a terminal status
async fn run_next(state: &AppState) -> Uuid {
    let job_id = state.service.queue().claim().await;
    let _ = state.service.execute(job_id).await;
    job_id
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send_json(&app, create_json_request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send_json(&app, create_json_request("GET", "/ready", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["upload_dir"], true);
}

#[tokio::test]
async fn test_metrics_counts_requests() {
    let (_state, app) = test_app();

    send(&app, create_json_request("GET", "/health", None)).await;
    send(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{}", Uuid::new_v4()), None),
    )
    .await;

    let (status, json) = send_json(&app, create_json_request("GET", "/metrics", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["total_requests"].as_u64().unwrap() >= 2);
    assert_eq!(json["queue_depth"], 0);
    assert_eq!(json["endpoints"]["/api/v1/jobs/:id"]["status_counts"]["404"], 1);
}

#[tokio::test]
async fn test_openapi_spec() {
    let app = create_router_for_testing();

    let (status, json) =
        send_json(&app, create_json_request("GET", "/api-docs/openapi.json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/jobs"].is_object());
    assert!(json["paths"]["/api/v1/cluster"].is_object());
}

// =============================================================================
// Job Submission Tests
// =============================================================================

#[tokio::test]
async fn test_submit_job_queues_in_order() {
    let (_state, app) = test_app();

    for expected in 0..2 {
        let (status, json) = send_json(
            &app,
            create_json_request(
                "POST",
                "/api/v1/jobs",
                Some(json!({"source_reference": "weather.csv", "column_name": "text"})),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["queue_position"], expected);
    }
}

#[tokio::test]
async fn test_submit_job_missing_column() {
    let app = create_router_for_testing();

    let (status, json) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/jobs",
            Some(json!({"source_reference": "weather.csv", "column_name": "body"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_submit_job_unknown_source() {
    let app = create_router_for_testing();

    let (status, _) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/jobs",
            Some(json!({"source_reference": "missing.csv", "column_name": "text"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_job_empty_source() {
    let app = create_router_for_testing();

    let (status, _) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/jobs",
            Some(json!({"source_reference": "  ", "column_name": "text"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Job Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_get_job_not_found() {
    let app = create_router_for_testing();

    let (status, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{}", Uuid::new_v4()), None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_queued_job_reports_position() {
    let (_state, app) = test_app();
    submit(&app, "weather.csv", false).await;
    let second = submit(&app, "weather.csv", false).await;

    let (status, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{second}"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "queued");
    assert_eq!(json["queue_position"], 1);
    assert!(json.get("result").is_none());
}

#[tokio::test]
async fn test_plain_job_finishes() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;
    assert_eq!(run_next(&state).await, job_id);

    let (status, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "finished");
    assert_eq!(json["progress"], 4);
    assert_eq!(json["total"], 4);
    assert!(json.get("queue_position").is_none());

    let result = &json["result"];
    assert_eq!(result["cluster_enabled"], false);
    assert_eq!(result["result_rows"].as_array().unwrap().len(), 4);

    let graph = result["result_graph"].as_array().unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(graph[0]["id"], 0);
    assert_eq!(graph[0]["cause"], "Heavy rain");
    assert_eq!(graph[0]["cause_cluster"], -1);
    assert_eq!(graph[2]["effect"], "power outages");
}

#[tokio::test]
async fn test_clustered_job_hides_outliers() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", true).await;
    run_next(&state).await;

    let (_, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;

    assert_eq!(json["status"], "finished");
    let result = &json["result"];
    assert_eq!(result["cluster_enabled"], true);

    // The storms row has no topic on either side
    let graph = result["result_graph"].as_array().unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph[0]["cause_cluster"], 0);
    assert_eq!(graph[0]["effect_cluster"], 1);
    assert_eq!(graph[1]["cause_cluster"], 1);
    assert_eq!(graph[1]["effect_cluster"], 2);
    assert!(result["topics"]["1"].is_array());

    // but it is part of the downloadable artifact
    let (status, body) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/files/{job_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(body).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("Storms"));
}

#[tokio::test]
async fn test_failed_job_reports_failure() {
    let (state, app) = test_app();
    let job_id = submit(&app, "broken.csv", false).await;
    run_next(&state).await;

    let (status, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["failure"]["kind"], "predictor");
    assert!(json.get("result").is_none());
}

#[tokio::test]
async fn test_delete_queued_job() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;

    let (status, _) = send(
        &app,
        create_json_request("DELETE", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.service.queue().is_empty().await);

    let (status, _) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_finished_job_removes_artifact() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;
    run_next(&state).await;

    let (status, _) = send(
        &app,
        create_json_request("DELETE", &format!("/api/v1/jobs/{job_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/files/{job_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Artifact and Network Tests
// =============================================================================

#[tokio::test]
async fn test_download_artifact_headers() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;
    run_next(&state).await;

    let response = app
        .oneshot(create_json_request(
            "GET",
            &format!("/api/v1/files/{job_id}"),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap();
    assert!(disposition.contains(&format!("{job_id}.csv")));
}

#[tokio::test]
async fn test_download_artifact_unknown_job() {
    let app = create_router_for_testing();

    let (status, _) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/files/{}", Uuid::new_v4()), None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_network_before_finish_conflicts() {
    let (_state, app) = test_app();
    let job_id = submit(&app, "weather.csv", true).await;

    let (status, json) = send_json(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}/network"), None),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn test_network_with_focus() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", true).await;
    run_next(&state).await;

    let (status, json) = send_json(
        &app,
        create_json_request(
            "GET",
            &format!("/api/v1/jobs/{job_id}/network?node=topic:1"),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // Three topics plus the two unclustered storm entities
    assert_eq!(json["nodes"].as_array().unwrap().len(), 5);
    assert_eq!(json["edges"].as_array().unwrap().len(), 3);

    let focus = &json["focus"];
    assert_eq!(focus["node"], json!({"kind": "topic", "key": 1}));
    assert_eq!(focus["causes"][0]["node"], json!({"kind": "topic", "key": 0}));
    assert_eq!(focus["effects"][0]["node"], json!({"kind": "topic", "key": 2}));
    assert_eq!(focus["effects"][0]["weight"], 1);
}

#[tokio::test]
async fn test_network_invalid_focus() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;
    run_next(&state).await;

    let (status, _) = send(
        &app,
        create_json_request(
            "GET",
            &format!("/api/v1/jobs/{job_id}/network?node=rain"),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Event Stream Tests
// =============================================================================

#[tokio::test]
async fn test_events_unknown_job() {
    let app = create_router_for_testing();

    let (status, _) = send(
        &app,
        create_json_request(
            "GET",
            &format!("/api/v1/jobs/{}/events", Uuid::new_v4()),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_events_of_finished_job_end_after_snapshot() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;
    run_next(&state).await;

    let (status, body) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/jobs/{job_id}/events"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("event: finished"));
    assert_eq!(text.matches("event:").count(), 1);
    assert_eq!(state.service.registry().subscriber_count(job_id), 0);
}

/// (event name, data) pairs of an SSE body
fn sse_frames(body: &[u8]) -> Vec<(String, Value)> {
    let text = String::from_utf8(body.to_vec()).unwrap();
    text.split("\n\n")
        .filter_map(|frame| {
            let name = frame.lines().find_map(|l| l.strip_prefix("event:"))?;
            let data = frame.lines().find_map(|l| l.strip_prefix("data:"))?;
            Some((
                name.trim().to_string(),
                serde_json::from_str(data.trim()).unwrap(),
            ))
        })
        .collect()
}

#[tokio::test]
async fn test_events_stream_progress_then_finished() {
    let (state, app) = test_app();
    let job_id = submit(&app, "weather.csv", false).await;

    // The room is joined once the response head is returned
    let response = app
        .clone()
        .oneshot(create_json_request(
            "GET",
            &format!("/api/v1/jobs/{job_id}/events"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.service.registry().subscriber_count(job_id), 1);

    run_next(&state).await;

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let frames = sse_frames(&body);

    let (first, _) = &frames[0];
    assert_eq!(first, "queued");

    let progress: Vec<u64> = frames[1..frames.len() - 1]
        .iter()
        .map(|(name, data)| {
            assert_eq!(name, "cause_effect");
            assert_eq!(data["total"], 4);
            data["progress"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&4));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let (last, data) = frames.last().unwrap();
    assert_eq!(last, "finished");
    assert!(data["result"].is_object());

    // The body ended, so the stream closed after the terminal event
    assert_eq!(state.service.registry().subscriber_count(job_id), 0);
}

// =============================================================================
// Cluster Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_cluster_rows() {
    let app = create_router_for_testing();

    let (status, json) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/cluster",
            Some(json!({
                "rows": [
                    {"text": "Heavy rain caused floods.", "pairs": [{"cause": "Heavy rain", "effect": "floods"}]},
                    {"text": "Storms knocked out power.", "pairs": [{"cause": "Storms", "effect": "power outages"}]}
                ],
                "nr_topics": 0,
                "n_gram_range": [1, 2]
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // Outliers are kept here
    let graph = json["graph"].as_array().unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph[1]["cause_cluster"], -1);
    assert!(json["topics"]["0"].is_array());
}

#[tokio::test]
async fn test_cluster_invalid_n_gram_range() {
    let app = create_router_for_testing();

    let (status, _) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/cluster",
            Some(json!({"rows": [], "n_gram_range": [2, 1]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cluster_empty_entity_set() {
    let app = create_router_for_testing();

    let (status, json) = send_json(
        &app,
        create_json_request(
            "POST",
            "/api/v1/cluster",
            Some(json!({"rows": [{"text": "Nothing happened.", "pairs": []}]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "EMPTY_ENTITY_SET");
}
