//! The cell read model.
//!
//! [`CellQuery`] is the contract the propagation consumer and the command
//! service read through: a paginated rectangle query plus a point lookup.
//! [`MemoryCellView`] is the in-process implementation, fed by projecting
//! `StatusUpdated` events from the cell store's subscription. Rows lag the
//! entities; readers must tolerate stale or missing rows.
//!
//! The view keeps nothing across restarts. [`MemoryCellView::spawn_rebuild`]
//! first restores one row per cell persisted in the journal, then follows
//! the live subscription, which was opened before the restore so no event
//! committed in between is missed.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use cellgrid_domain::{CellEvent, CellState, StatusUpdated};
use cellgrid_store::{Aggregate, EntityStore, EventEnvelope, EventJournal, StoreError};
use cellgrid_types::{CellId, CellPage, CellRow, Rect, Region};
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors from the read model.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// A page token that this view did not issue.
    #[error("invalid page token: {0}")]
    InvalidPageToken(String),
}

/// Read access to the cell read model.
pub trait CellQuery: Send + Sync + 'static {
    /// One page of the rows inside `rect`. `page_token` is `None` for the
    /// first page and the previous page's `next_page_token` afterwards.
    fn query_cells_in_rectangle(
        &self,
        rect: Rect,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<CellPage, ViewError>> + Send;

    /// The row for `id`, if the view has seen the cell.
    fn get_row(&self, id: CellId) -> impl Future<Output = Option<CellRow>> + Send;
}

/// Every row inside `rect`, following page tokens until the last page.
pub async fn collect_cells_in_area<Q: CellQuery + ?Sized>(
    view: &Q,
    rect: Rect,
) -> Result<Vec<CellRow>, ViewError> {
    let mut cells = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = view
            .query_cells_in_rectangle(rect, token.as_deref())
            .await?;
        cells.extend(page.cells);
        match page.next_page_token {
            Some(next) if page.has_more => token = Some(next),
            _ => return Ok(cells),
        }
    }
}

// =============================================================================
// In-memory view
// =============================================================================

/// In-process read model keyed by cell.
#[derive(Debug)]
pub struct MemoryCellView {
    region: Region,
    page_size: usize,
    rows: RwLock<BTreeMap<CellId, CellRow>>,
}

impl MemoryCellView {
    /// Create an empty view that stamps rows with `region`.
    ///
    /// A `page_size` of zero is treated as one.
    pub fn new(region: Region, page_size: usize) -> Self {
        Self {
            region,
            page_size: page_size.max(1),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the view holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold one cell event into the view. Only `StatusUpdated` writes.
    pub fn project(&self, envelope: &EventEnvelope<CellEvent>) {
        let CellEvent::StatusUpdated(updated) = &envelope.event else {
            return;
        };
        let row = self.row_for(updated);
        debug!(
            cell = %row.id,
            status = %row.status,
            origin = %envelope.origin,
            elapsed_ms = row.elapsed_ms,
            "View row updated"
        );
        self.insert(row);
    }

    /// Write one row for every cell persisted in the journal of `cells`.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns the first journal failure. Rows restored before it stay.
    pub async fn restore<J: EventJournal>(
        &self,
        cells: &EntityStore<CellState, J>,
    ) -> Result<usize, StoreError> {
        let mut restored = 0_usize;
        for key in cells.journal().entity_ids(CellState::KIND).await? {
            let Ok(id) = key.parse::<CellId>() else {
                warn!(entity = %key, "Skipping stream with an unparsable cell id");
                continue;
            };
            let state = match cells.get(&id).await {
                Ok(state) => state,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            self.insert(self.row_for(&StatusUpdated {
                id,
                status: state.status,
                created_at: state.created_at,
                updated_at: state.updated_at,
                client_at: state.client_at,
                endpoint_at: state.endpoint_at,
                created: state.created,
                updated: state.updated,
            }));
            restored = restored.saturating_add(1);
        }
        Ok(restored)
    }

    /// Restore from the journal of `cells`, then project every event from
    /// `receiver` until the channel closes.
    ///
    /// `receiver` must be subscribed before this is called.
    pub fn spawn_rebuild<J: EventJournal>(
        self: Arc<Self>,
        cells: Arc<EntityStore<CellState, J>>,
        receiver: UnboundedReceiver<EventEnvelope<CellEvent>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.restore(&cells).await {
                Ok(rows) => info!(rows, region = %self.region, "View restored from the journal"),
                Err(e) => warn!(error = %e, "View restore failed, serving live events only"),
            }
            drop(cells);
            self.follow(receiver).await;
        })
    }

    async fn follow(&self, mut receiver: UnboundedReceiver<EventEnvelope<CellEvent>>) {
        while let Some(envelope) = receiver.recv().await {
            self.project(&envelope);
        }
        warn!("Cell event subscription closed, view projection stopped");
    }

    fn row_for(&self, updated: &StatusUpdated) -> CellRow {
        let view_at = Utc::now();
        CellRow {
            id: updated.id,
            status: updated.status,
            x: updated.id.x,
            y: updated.id.y,
            client_at: updated.client_at,
            endpoint_at: updated.endpoint_at,
            created_at: updated.created_at,
            updated_at: updated.updated_at,
            view_at,
            elapsed_ms: view_at
                .signed_duration_since(updated.updated_at)
                .num_milliseconds(),
            created: updated.created.clone(),
            updated: updated.updated.clone(),
            view: self.region.clone(),
        }
    }

    fn insert(&self, row: CellRow) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(row.id, row);
    }

    fn page(&self, rect: Rect, offset: usize) -> CellPage {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching = rows.values().filter(|row| rect.contains(row.id)).skip(offset);
        let cells: Vec<CellRow> = matching.by_ref().take(self.page_size).cloned().collect();
        let has_more = matching.next().is_some();
        let next_page_token =
            has_more.then(|| offset.saturating_add(cells.len()).to_string());
        CellPage {
            cells,
            next_page_token,
            has_more,
        }
    }
}

impl CellQuery for MemoryCellView {
    async fn query_cells_in_rectangle(
        &self,
        rect: Rect,
        page_token: Option<&str>,
    ) -> Result<CellPage, ViewError> {
        let offset = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .ok()
                .ok_or_else(|| ViewError::InvalidPageToken(token.to_owned()))?,
        };
        Ok(self.page(rect, offset))
    }

    async fn get_row(&self, id: CellId) -> Option<CellRow> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}
