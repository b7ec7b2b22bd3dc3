//! REST endpoint handlers.
//!
//! Every handler parses its input, calls the shared
//! [`GridService`](cellgrid_core::GridService) and renders the result as
//! JSON. Malformed JSON bodies are reported as `400` rather than Axum's
//! default `422`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `PUT` | `/grid-cell/update-status` | Set one cell's status |
//! | `PUT` | `/grid-cell/span-status` | Repaint the lit region around a cell |
//! | `PUT` | `/grid-cell/fill-status` | Fill the unlit region around a cell |
//! | `PUT` | `/grid-cell/clear-status` | Clear a connected one-color region |
//! | `PUT` | `/grid-cell/erase-status` | Erase a connected lit region |
//! | `PUT` | `/grid-cell/create-predator` | Place a predator |
//! | `PUT` | `/grid-cell/fill-rectangle` | Paint a rectangle (`202`, runs in background) |
//! | `GET` | `/grid-cell/entity-by-id/:id` | Entity state |
//! | `GET` | `/grid-cell/view-row-by-id/:id` | Read-model row |
//! | `GET` | `/grid-cell/paginated-list/:x1/:y1/:x2/:y2/:token` | One page of rows |
//! | `GET` | `/grid-cell/region` | Serving region |
//! | `PUT` | `/sensor/update-status` | Record a sensor report |
//! | `GET` | `/sensor/entity-by-id/:id` | Sensor state |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use cellgrid_core::{CellRequest, CommandReceipt, FillRectangleRequest, SensorRequest};
use cellgrid_domain::{CellState, SensorState};
use cellgrid_store::EventJournal;
use cellgrid_types::{CellPage, CellRow, Rect};
use tracing::info;

use crate::error::ObserverError;
use crate::state::AppState;

/// Page token naming the first page of a listing.
pub const FIRST_PAGE: &str = "start";

/// A cell command body, or the reason it could not be read.
type CellBody = Result<Json<CellRequest>, JsonRejection>;

// ---------------------------------------------------------------------------
// Cell commands
// ---------------------------------------------------------------------------

/// `PUT /grid-cell/update-status`
pub async fn update_status<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.update_status(&request).await?))
}

/// `PUT /grid-cell/span-status`
pub async fn span_status<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.span_status(&request).await?))
}

/// `PUT /grid-cell/fill-status`
pub async fn fill_status<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.fill_status(&request).await?))
}

/// `PUT /grid-cell/clear-status`
pub async fn clear_status<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.clear_status(&request).await?))
}

/// `PUT /grid-cell/erase-status`
pub async fn erase_status<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.erase_status(&request).await?))
}

/// `PUT /grid-cell/create-predator`
pub async fn create_predator<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: CellBody,
) -> Result<Json<CommandReceipt>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.create_predator(&request).await?))
}

/// `PUT /grid-cell/fill-rectangle`
///
/// Validates the request, then runs the fill on a background task and
/// answers `202 Accepted` straight away.
pub async fn fill_rectangle<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: Result<Json<FillRectangleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Json(request) = body?;
    let job = state.service.prepare_fill(&request)?;
    let cells = job.rect.width().saturating_mul(job.rect.height());

    info!(rect = ?job.rect, status = %job.status, cells, "Rectangle fill accepted");

    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        service.run_fill(job).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "rect": job.rect,
            "status": job.status,
            "cells": cells,
        })),
    ))
}

// ---------------------------------------------------------------------------
// Cell queries
// ---------------------------------------------------------------------------

/// `GET /grid-cell/entity-by-id/{id}`
pub async fn get_cell<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    Path(id): Path<String>,
) -> Result<Json<CellState>, ObserverError> {
    Ok(Json(state.service.get_cell(&id).await?))
}

/// `GET /grid-cell/view-row-by-id/{id}`
pub async fn get_row<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    Path(id): Path<String>,
) -> Result<Json<CellRow>, ObserverError> {
    Ok(Json(state.service.get_row(&id).await?))
}

/// `GET /grid-cell/paginated-list/{x1}/{y1}/{x2}/{y2}/{page_token}`
pub async fn paginated_list<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    path: Result<Path<(i32, i32, i32, i32, String)>, PathRejection>,
) -> Result<Json<CellPage>, ObserverError> {
    let Path((x1, y1, x2, y2, page_token)) =
        path.map_err(|e| ObserverError::InvalidInput(e.body_text()))?;
    let token = (page_token != FIRST_PAGE).then_some(page_token.as_str());
    let page = state
        .service
        .cells_in_rectangle(Rect::new(x1, y1, x2, y2), token)
        .await?;
    Ok(Json(page))
}

/// `GET /grid-cell/region`
pub async fn region<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "region": state.service.region() }))
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// `PUT /sensor/update-status`
pub async fn update_sensor<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    body: Result<Json<SensorRequest>, JsonRejection>,
) -> Result<Json<SensorState>, ObserverError> {
    let Json(request) = body?;
    Ok(Json(state.service.update_sensor(&request).await?))
}

/// `GET /sensor/entity-by-id/{id}`
pub async fn get_sensor<J: EventJournal>(
    State(state): State<Arc<AppState<J>>>,
    Path(id): Path<String>,
) -> Result<Json<SensorState>, ObserverError> {
    Ok(Json(state.service.get_sensor(&id).await?))
}
