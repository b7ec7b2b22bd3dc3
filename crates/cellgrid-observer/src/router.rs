//! Axum router construction.
//!
//! Assembles all routes into a single [`Router`] with CORS and request
//! tracing middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use cellgrid_store::EventJournal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `PUT /grid-cell/update-status`, `span-status`, `fill-status`,
///   `clear-status`, `erase-status`, `create-predator` -- cell commands
/// - `PUT /grid-cell/fill-rectangle` -- background rectangle fill
/// - `GET /grid-cell/entity-by-id/{id}` -- entity state
/// - `GET /grid-cell/view-row-by-id/{id}` -- read-model row
/// - `GET /grid-cell/paginated-list/{x1}/{y1}/{x2}/{y2}/{page_token}` --
///   one page of rows inside a rectangle, `start` for the first page
/// - `GET /grid-cell/region` -- the serving region
/// - `PUT /sensor/update-status`, `GET /sensor/entity-by-id/{id}`
pub fn build_router<J: EventJournal>(state: Arc<AppState<J>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Cell commands
        .route("/grid-cell/update-status", put(handlers::update_status::<J>))
        .route("/grid-cell/span-status", put(handlers::span_status::<J>))
        .route("/grid-cell/fill-status", put(handlers::fill_status::<J>))
        .route("/grid-cell/clear-status", put(handlers::clear_status::<J>))
        .route("/grid-cell/erase-status", put(handlers::erase_status::<J>))
        .route("/grid-cell/create-predator", put(handlers::create_predator::<J>))
        .route("/grid-cell/fill-rectangle", put(handlers::fill_rectangle::<J>))
        // Cell queries
        .route("/grid-cell/entity-by-id/{id}", get(handlers::get_cell::<J>))
        .route("/grid-cell/view-row-by-id/{id}", get(handlers::get_row::<J>))
        .route(
            "/grid-cell/paginated-list/{x1}/{y1}/{x2}/{y2}/{page_token}",
            get(handlers::paginated_list::<J>),
        )
        .route("/grid-cell/region", get(handlers::region::<J>))
        // Sensors
        .route("/sensor/update-status", put(handlers::update_sensor::<J>))
        .route("/sensor/entity-by-id/{id}", get(handlers::get_sensor::<J>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
