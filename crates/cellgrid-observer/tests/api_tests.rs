//! Integration tests for the HTTP endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` over a
//! running in-memory node, without starting a TCP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use cellgrid_core::{GridConfig, GridRuntime};
use cellgrid_observer::router::build_router;
use cellgrid_observer::state::AppState;
use cellgrid_store::MemoryJournal;
use serde_json::{Value, json};
use tower::ServiceExt;

fn start_node() -> (GridRuntime<MemoryJournal>, Router) {
    let mut config = GridConfig::default();
    config.predator.seed = Some(11);
    let runtime = GridRuntime::start(&config, Arc::new(MemoryJournal::new()));
    let router = build_router(Arc::new(AppState::from_runtime(&runtime)));
    (runtime, router)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn put(uri: &str, body: &Value) -> Request<Body> {
    Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Poll `uri` until its page holds `expected` rows.
async fn wait_for_rows(router: &Router, uri: &str, expected: usize) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, page) = send(router, get(uri)).await;
            assert_eq!(status, StatusCode::OK);
            if page["cells"].as_array().map(Vec::len) == Some(expected) {
                return page;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("rows did not appear in the view")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_update_status_then_get_entity() {
    let (_node, router) = start_node();

    let (status, receipt) = send(
        &router,
        put(
            "/grid-cell/update-status",
            &json!({"id": "3x4", "status": "red"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["id"], "3x4");
    assert_eq!(receipt["status"], "red");
    assert_eq!(receipt["events"], 1);

    let (status, cell) = send(&router, get("/grid-cell/entity-by-id/3x4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cell["id"], "3x4");
    assert_eq!(cell["status"], "red");
    assert_eq!(cell["created"], "local-development");
}

#[tokio::test]
async fn test_repeated_update_is_a_noop() {
    let (_node, router) = start_node();
    let body = json!({"id": "0x0", "status": "blue"});

    send(&router, put("/grid-cell/update-status", &body)).await;
    let (status, receipt) = send(&router, put("/grid-cell/update-status", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["events"], 0);
}

#[tokio::test]
async fn test_invalid_cell_id_is_bad_request() {
    let (_node, router) = start_node();

    let (status, body) = send(
        &router,
        put(
            "/grid-cell/update-status",
            &json!({"id": "3-4", "status": "red"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unknown_status_is_bad_request() {
    let (_node, router) = start_node();

    let (status, _) = send(
        &router,
        put(
            "/grid-cell/update-status",
            &json!({"id": "1x1", "status": "purple"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (_node, router) = start_node();

    let request = Request::put("/grid-cell/span-status")
        .header("content-type", "application/json")
        .body(Body::from("{\"id\": "))
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_span_without_radius_is_bad_request() {
    let (_node, router) = start_node();

    let (status, body) = send(
        &router,
        put(
            "/grid-cell/span-status",
            &json!({"id": "1x1", "status": "green"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("radius"));
}

#[tokio::test]
async fn test_unknown_cell_is_not_found() {
    let (_node, router) = start_node();

    let (status, body) = send(&router, get("/grid-cell/entity-by-id/9x9")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_missing_view_row_is_not_found() {
    let (_node, router) = start_node();

    let (status, _) = send(&router, get("/grid-cell/view-row-by-id/5x5")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fill_status_spreads_into_the_view() {
    let (_node, router) = start_node();

    let (status, receipt) = send(
        &router,
        put(
            "/grid-cell/fill-status",
            &json!({"id": "0x0", "status": "orange", "radius": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "orange");

    let page = wait_for_rows(&router, "/grid-cell/paginated-list/-5/-5/5/5/start", 13).await;
    assert_eq!(page["has_more"], false);

    let (status, row) = send(&router, get("/grid-cell/view-row-by-id/2x0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["status"], "orange");
    assert_eq!(row["view"], "local-development");
}

#[tokio::test]
async fn test_paginated_list_rejects_bad_token_and_bounds() {
    let (_node, router) = start_node();

    let (status, _) = send(&router, get("/grid-cell/paginated-list/0/0/4/4/nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&router, get("/grid-cell/paginated-list/a/0/4/4/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_empty_rectangle_lists_no_rows() {
    let (_node, router) = start_node();

    let (status, page) = send(&router, get("/grid-cell/paginated-list/0/0/3/3/start")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["cells"], json!([]));
    assert_eq!(page["has_more"], false);
}

#[tokio::test]
async fn test_fill_rectangle_is_accepted_and_runs_in_background() {
    let (_node, router) = start_node();

    let (status, body) = send(
        &router,
        put(
            "/grid-cell/fill-rectangle",
            &json!({"x1": 0, "y1": 0, "x2": 3, "y2": 2, "status": "blue"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["cells"], 12);

    wait_for_rows(&router, "/grid-cell/paginated-list/0/0/3/2/start", 12).await;
}

#[tokio::test]
async fn test_oversized_fill_rectangle_is_rejected() {
    let (_node, router) = start_node();

    let (status, _) = send(
        &router,
        put(
            "/grid-cell/fill-rectangle",
            &json!({"x1": 0, "y1": 0, "x2": 999, "y2": 999, "status": "red"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_predator_on_empty_grid() {
    let (_node, router) = start_node();

    let (status, receipt) = send(
        &router,
        put(
            "/grid-cell/create-predator",
            &json!({"id": "0x0", "radius": 3, "linger": 2}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["id"], "0x0");
}

#[tokio::test]
async fn test_region_endpoint() {
    let (_node, router) = start_node();

    let (status, body) = send(&router, get("/grid-cell/region")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["region"], "local-development");
}

#[tokio::test]
async fn test_sensor_update_and_get() {
    let (_node, router) = start_node();

    let (status, sensor) = send(
        &router,
        put(
            "/sensor/update-status",
            &json!({"id": "boiler-7", "status": "default"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sensor["status"], "inactive");

    let (status, sensor) = send(&router, get("/sensor/entity-by-id/boiler-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sensor["id"], "boiler-7");
    assert_eq!(sensor["status"], "inactive");
}

#[tokio::test]
async fn test_unknown_sensor_is_not_found() {
    let (_node, router) = start_node();

    let (status, _) = send(&router, get("/sensor/entity-by-id/nobody")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
