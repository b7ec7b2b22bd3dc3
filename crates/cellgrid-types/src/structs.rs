//! Plain data structs shared between the domain, the read model and the
//! HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::Status;
use crate::ids::CellId;
use crate::region::Region;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Client-side and boundary-side timestamps carried for latency reporting.
///
/// Neither value influences any domain decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// When the client submitted the request.
    pub client_at: DateTime<Utc>,
    /// When the request reached the service boundary.
    pub endpoint_at: DateTime<Utc>,
}

impl Timing {
    /// Timing with both stamps set to the given instant.
    pub const fn at(instant: DateTime<Utc>) -> Self {
        Self {
            client_at: instant,
            endpoint_at: instant,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::at(DateTime::<Utc>::UNIX_EPOCH)
    }
}

// ---------------------------------------------------------------------------
// Rectangles
// ---------------------------------------------------------------------------

/// Inclusive axis-aligned rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Smallest column.
    pub x1: i32,
    /// Smallest row.
    pub y1: i32,
    /// Largest column.
    pub x2: i32,
    /// Largest row.
    pub y2: i32,
}

impl Rect {
    /// Build a rectangle from two corners in any order.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// The square of half-width `radius` centered on `(x, y)`.
    pub fn around(x: i32, y: i32, radius: i32) -> Self {
        let r = radius.max(0);
        Self::new(
            x.saturating_sub(r),
            y.saturating_sub(r),
            x.saturating_add(r),
            y.saturating_add(r),
        )
    }

    /// Whether `id` lies inside the rectangle (edges included).
    pub const fn contains(&self, id: CellId) -> bool {
        id.x >= self.x1 && id.x <= self.x2 && id.y >= self.y1 && id.y <= self.y2
    }

    /// Number of columns.
    pub fn width(&self) -> u64 {
        u64::from(self.x2.abs_diff(self.x1)).saturating_add(1)
    }

    /// Number of rows.
    pub fn height(&self) -> u64 {
        u64::from(self.y2.abs_diff(self.y1)).saturating_add(1)
    }
}

// ---------------------------------------------------------------------------
// Read-model rows
// ---------------------------------------------------------------------------

/// One row of the cell read model.
///
/// Rows are derived from `StatusUpdated` events and lag the entities
/// they describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRow {
    /// The cell.
    pub id: CellId,
    /// Current color.
    pub status: Status,
    /// Column, duplicated from `id` for range filters.
    pub x: i32,
    /// Row, duplicated from `id` for range filters.
    pub y: i32,
    /// Client submit time of the last update.
    pub client_at: DateTime<Utc>,
    /// Boundary receive time of the last update.
    pub endpoint_at: DateTime<Utc>,
    /// When the cell entity was first created.
    pub created_at: DateTime<Utc>,
    /// When the cell entity last changed.
    pub updated_at: DateTime<Utc>,
    /// When this row was written.
    pub view_at: DateTime<Utc>,
    /// Milliseconds between the entity update and this row being written.
    pub elapsed_ms: i64,
    /// Region that created the cell.
    pub created: Region,
    /// Region that last updated the cell.
    pub updated: Region,
    /// Region whose view wrote this row.
    pub view: Region,
}

/// One page of a rectangle query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPage {
    /// Rows on this page.
    pub cells: Vec<CellRow>,
    /// Token to request the following page, present when `has_more`.
    pub next_page_token: Option<String>,
    /// Whether more rows follow.
    pub has_more: bool,
}
