//! The command and query service.
//!
//! [`GridService`] is the boundary between loosely typed client input
//! (string ids, status names, optional fields) and the typed entity
//! stores. Everything is validated here; the domain only ever sees
//! well-formed commands.

use std::sync::Arc;

use cellgrid_domain::{
    CellCommand, CellState, PredatorStep, SensorCommand, SensorId, SensorState, Spread,
};
use cellgrid_store::{EntityStore, EventJournal, StoreError};
use cellgrid_types::{CellId, CellPage, CellRow, Rect, Region, Status, Timing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bulk::{BulkFillReport, fill_rectangle};
use crate::config::GridConfig;
use crate::pursuit::Pursuit;
use crate::retry::RetryPolicy;
use crate::view::{CellQuery, ViewError};

/// Errors returned to clients.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested entity or row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The entity store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store(other),
        }
    }
}

impl From<ViewError> for ServiceError {
    fn from(e: ViewError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

// =============================================================================
// Requests and responses
// =============================================================================

/// A command addressed to one cell.
///
/// Which fields are required depends on the command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRequest {
    /// Cell id, `"{row}x{col}"`.
    pub id: String,
    /// Status name.
    #[serde(default)]
    pub status: Option<String>,
    /// When the client issued the request. Defaults to receipt time.
    #[serde(default)]
    pub client_at: Option<DateTime<Utc>>,
    /// Spread center column. Defaults to the cell's column.
    #[serde(default)]
    pub center_x: Option<i32>,
    /// Spread center row. Defaults to the cell's row.
    #[serde(default)]
    pub center_y: Option<i32>,
    /// Spread radius, or predator range.
    #[serde(default)]
    pub radius: Option<i32>,
    /// Predator trail length.
    #[serde(default)]
    pub linger: Option<i32>,
}

/// A rectangle fill request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRectangleRequest {
    /// First corner column.
    pub x1: i32,
    /// First corner row.
    pub y1: i32,
    /// Second corner column.
    pub x2: i32,
    /// Second corner row.
    pub y2: i32,
    /// Status name.
    pub status: String,
    /// When the client issued the request.
    #[serde(default)]
    pub client_at: Option<DateTime<Utc>>,
}

/// A sensor status report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRequest {
    /// Sensor id.
    pub id: String,
    /// Reported status. `"default"` is recorded as `"inactive"`.
    pub status: String,
    /// When the sensor reported. Defaults to receipt time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Acknowledgement of an accepted cell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReceipt {
    /// The cell the command ran on.
    pub id: CellId,
    /// Status after the command.
    pub status: Status,
    /// Events persisted; zero when the command was a no-op.
    pub events: usize,
}

/// A validated rectangle fill, ready to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillJob {
    /// Cells to paint.
    pub rect: Rect,
    /// Status to paint them.
    pub status: Status,
    /// Latency stamps.
    pub timing: Timing,
}

/// Client-facing limits and bulk fill tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Largest accepted span/fill radius.
    pub max_client_radius: i32,
    /// Predator trail length when a request omits it.
    pub default_linger: i32,
    /// Per-cell retry policy of a rectangle fill.
    pub bulk_retry: RetryPolicy,
    /// Cells of a rectangle fill updated concurrently.
    pub bulk_concurrency: usize,
    /// Largest rectangle a fill may cover.
    pub bulk_max_cells: u64,
}

impl ServiceSettings {
    /// Settings taken from the loaded configuration.
    pub const fn from_config(config: &GridConfig) -> Self {
        Self {
            max_client_radius: config.propagation.max_client_radius,
            default_linger: config.predator.default_linger,
            bulk_retry: config.bulk_fill.retry_policy(),
            bulk_concurrency: config.bulk_fill.concurrency,
            bulk_max_cells: config.bulk_fill.max_cells,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&GridConfig::default())
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn parse_cell_id(raw: &str) -> Result<CellId, ServiceError> {
    raw.parse::<CellId>()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))
}

fn parse_status(raw: &str) -> Result<Status, ServiceError> {
    raw.parse::<Status>()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ServiceError> {
    value.ok_or_else(|| ServiceError::InvalidInput(format!("missing field `{field}`")))
}

fn timing(client_at: Option<DateTime<Utc>>) -> Timing {
    let endpoint_at = Utc::now();
    Timing {
        client_at: client_at.unwrap_or(endpoint_at),
        endpoint_at,
    }
}

// =============================================================================
// Service
// =============================================================================

/// Commands and queries over the cell and sensor stores.
#[derive(Debug)]
pub struct GridService<J, Q> {
    cells: Arc<EntityStore<CellState, J>>,
    sensors: Arc<EntityStore<SensorState, J>>,
    pursuit: Arc<Pursuit<Q>>,
    settings: ServiceSettings,
}

impl<J: EventJournal, Q: CellQuery> GridService<J, Q> {
    /// Create a service over the given stores.
    pub const fn new(
        cells: Arc<EntityStore<CellState, J>>,
        sensors: Arc<EntityStore<SensorState, J>>,
        pursuit: Arc<Pursuit<Q>>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            cells,
            sensors,
            pursuit,
            settings,
        }
    }

    /// The region commands are issued from.
    pub fn region(&self) -> &Region {
        self.cells.region()
    }

    async fn run(&self, id: CellId, command: CellCommand) -> Result<CommandReceipt, ServiceError> {
        let invocation = self.cells.invoke(&id, command).await?;
        Ok(CommandReceipt {
            id,
            status: invocation.state.status,
            events: invocation.events.len(),
        })
    }

    fn spread(&self, request: &CellRequest) -> Result<(CellId, Spread), ServiceError> {
        let id = parse_cell_id(&request.id)?;
        let status = parse_status(required(request.status.as_deref(), "status")?)?;
        let radius = required(request.radius, "radius")?;
        Ok((
            id,
            Spread {
                status,
                center_x: request.center_x.unwrap_or(id.x),
                center_y: request.center_y.unwrap_or(id.y),
                radius: radius.min(self.settings.max_client_radius),
                timing: timing(request.client_at),
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Cell commands
    // -----------------------------------------------------------------------

    /// Set one cell's status.
    pub async fn update_status(&self, request: &CellRequest) -> Result<CommandReceipt, ServiceError> {
        let id = parse_cell_id(&request.id)?;
        let status = parse_status(required(request.status.as_deref(), "status")?)?;
        self.run(
            id,
            CellCommand::UpdateStatus {
                status,
                timing: timing(request.client_at),
            },
        )
        .await
    }

    /// Repaint the lit region around a cell.
    pub async fn span_status(&self, request: &CellRequest) -> Result<CommandReceipt, ServiceError> {
        let (id, spread) = self.spread(request)?;
        self.run(id, CellCommand::SpanStatus(spread)).await
    }

    /// Fill the unlit region around a cell.
    pub async fn fill_status(&self, request: &CellRequest) -> Result<CommandReceipt, ServiceError> {
        let (id, spread) = self.spread(request)?;
        self.run(id, CellCommand::FillStatus(spread)).await
    }

    /// Clear the connected region of one color.
    pub async fn clear_status(&self, request: &CellRequest) -> Result<CommandReceipt, ServiceError> {
        let id = parse_cell_id(&request.id)?;
        let status = parse_status(required(request.status.as_deref(), "status")?)?;
        self.run(id, CellCommand::ClearStatus { status }).await
    }

    /// Erase the connected lit region.
    pub async fn erase_status(&self, request: &CellRequest) -> Result<CommandReceipt, ServiceError> {
        let id = parse_cell_id(&request.id)?;
        self.run(id, CellCommand::EraseStatus).await
    }

    /// Place a predator on a cell with `radius` stamina.
    pub async fn create_predator(
        &self,
        request: &CellRequest,
    ) -> Result<CommandReceipt, ServiceError> {
        let id = parse_cell_id(&request.id)?;
        let range = required(request.radius, "radius")?;
        let linger = request.linger.unwrap_or(self.settings.default_linger);
        let next_cell = self.pursuit.next_from(id, range).await;
        info!(cell = %id, range, linger, next = ?next_cell, "Creating predator");
        self.run(
            id,
            CellCommand::CreatePredator(PredatorStep {
                status: Status::Predator,
                range,
                linger,
                next_cell,
                timing: timing(request.client_at),
            }),
        )
        .await
    }

    /// Validate a rectangle fill without running it.
    pub fn prepare_fill(&self, request: &FillRectangleRequest) -> Result<FillJob, ServiceError> {
        let status = parse_status(&request.status)?;
        let rect = Rect::new(request.x1, request.y1, request.x2, request.y2);
        let cells = rect.width().saturating_mul(rect.height());
        if cells > self.settings.bulk_max_cells {
            return Err(ServiceError::InvalidInput(format!(
                "rectangle covers {cells} cells, limit is {}",
                self.settings.bulk_max_cells
            )));
        }
        Ok(FillJob {
            rect,
            status,
            timing: timing(request.client_at),
        })
    }

    /// Run a validated rectangle fill to completion.
    pub async fn run_fill(&self, job: FillJob) -> BulkFillReport {
        fill_rectangle(
            &self.cells,
            job.rect,
            job.status,
            job.timing,
            &self.settings.bulk_retry,
            self.settings.bulk_concurrency,
        )
        .await
    }

    /// Validate and run a rectangle fill.
    pub async fn fill_rectangle(
        &self,
        request: &FillRectangleRequest,
    ) -> Result<BulkFillReport, ServiceError> {
        let job = self.prepare_fill(request)?;
        Ok(self.run_fill(job).await)
    }

    // -----------------------------------------------------------------------
    // Cell queries
    // -----------------------------------------------------------------------

    /// Current state of one cell entity.
    pub async fn get_cell(&self, id: &str) -> Result<CellState, ServiceError> {
        let id = parse_cell_id(id)?;
        Ok(self.cells.get(&id).await?)
    }

    /// The read-model row of one cell.
    pub async fn get_row(&self, id: &str) -> Result<CellRow, ServiceError> {
        let cell = parse_cell_id(id)?;
        self.pursuit
            .view()
            .get_row(cell)
            .await
            .ok_or_else(|| ServiceError::NotFound {
                kind: "view-row",
                id: cell.to_string(),
            })
    }

    /// One page of read-model rows inside a rectangle.
    pub async fn cells_in_rectangle(
        &self,
        rect: Rect,
        page_token: Option<&str>,
    ) -> Result<CellPage, ServiceError> {
        Ok(self
            .pursuit
            .view()
            .query_cells_in_rectangle(rect, page_token)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Sensors
    // -----------------------------------------------------------------------

    /// Record a sensor status report.
    pub async fn update_sensor(&self, request: &SensorRequest) -> Result<SensorState, ServiceError> {
        let id = request
            .id
            .parse::<SensorId>()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        let status = match request.status.trim() {
            "" => return Err(ServiceError::InvalidInput("missing field `status`".to_owned())),
            "default" => "inactive".to_owned(),
            other => other.to_owned(),
        };
        let invocation = self
            .sensors
            .invoke(
                &id,
                SensorCommand::UpdateStatus {
                    status,
                    updated_at: request.updated_at.unwrap_or_else(Utc::now),
                },
            )
            .await?;
        Ok(invocation.state)
    }

    /// Current state of one sensor.
    pub async fn get_sensor(&self, id: &str) -> Result<SensorState, ServiceError> {
        let id = id
            .parse::<SensorId>()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        Ok(self.sensors.get(&id).await?)
    }
}
