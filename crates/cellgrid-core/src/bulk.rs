//! Rectangle fill.
//!
//! Paints every cell of a rectangle with one status. The rectangle is split
//! recursively (quarters, or halves once one side is a single cell) down to
//! single cells, and each cell gets its own `UpdateStatus` with retries.
//! Cells are updated with bounded concurrency; a cell that exhausts its
//! retries is logged and counted, never fatal to the job.

use cellgrid_domain::{CellCommand, CellState};
use cellgrid_store::{EntityStore, EventJournal, StoreError};
use cellgrid_types::{CellId, Rect, Status, Timing};
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{error, info};

use crate::retry::RetryPolicy;

/// Outcome counts of one fill job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFillReport {
    /// Cells in the rectangle.
    pub cells: u64,
    /// Cells whose status changed.
    pub updated: u64,
    /// Cells that already had the status.
    pub unchanged: u64,
    /// Cells that could not be updated.
    pub failed: u64,
}

/// Sub-rectangle with a non-negative size.
#[derive(Debug, Clone, Copy)]
struct Area {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Area {
    fn parts(self) -> Vec<Self> {
        let half_w = self.width / 2;
        let half_h = self.height / 2;
        let right_x = self.x.saturating_add_unsigned(half_w);
        let upper_y = self.y.saturating_add_unsigned(half_h);
        let rest_w = self.width.saturating_sub(half_w);
        let rest_h = self.height.saturating_sub(half_h);
        let part = |x, y, width, height| Self {
            x,
            y,
            width,
            height,
        };

        if half_w == 0 {
            vec![
                part(self.x, self.y, self.width, half_h),
                part(self.x, upper_y, self.width, rest_h),
            ]
        } else if half_h == 0 {
            vec![
                part(self.x, self.y, half_w, self.height),
                part(right_x, self.y, rest_w, self.height),
            ]
        } else {
            vec![
                part(self.x, self.y, half_w, half_h),
                part(right_x, self.y, rest_w, half_h),
                part(self.x, upper_y, half_w, rest_h),
                part(right_x, upper_y, rest_w, rest_h),
            ]
        }
    }

    fn collect(self, out: &mut Vec<CellId>) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        if self.width == 1 && self.height == 1 {
            out.push(CellId::new(self.x, self.y));
            return;
        }
        for part in self.parts() {
            part.collect(out);
        }
    }
}

/// Every cell of `rect`, in subdivision order.
pub fn subdivide(rect: Rect) -> Vec<CellId> {
    let width = u32::try_from(rect.width()).unwrap_or(u32::MAX);
    let height = u32::try_from(rect.height()).unwrap_or(u32::MAX);
    let capacity = usize::try_from(rect.width().saturating_mul(rect.height())).unwrap_or(0);
    let mut out = Vec::with_capacity(capacity);
    Area {
        x: rect.x1,
        y: rect.y1,
        width,
        height,
    }
    .collect(&mut out);
    out
}

/// Set every cell of `rect` to `status`.
pub async fn fill_rectangle<J: EventJournal>(
    cells: &EntityStore<CellState, J>,
    rect: Rect,
    status: Status,
    timing: Timing,
    policy: &RetryPolicy,
    concurrency: usize,
) -> BulkFillReport {
    let ids = subdivide(rect);
    let total = u64::try_from(ids.len()).unwrap_or(u64::MAX);
    info!(?rect, %status, cells = total, "Rectangle fill started");

    let command = CellCommand::UpdateStatus { status, timing };
    let report = stream::iter(ids)
        .map(|id| async move {
            let result = policy
                .run(
                    "fill-rectangle",
                    || cells.invoke(&id, command),
                    StoreError::is_transient,
                )
                .await;
            (id, result)
        })
        .buffer_unordered(concurrency.max(1))
        .fold(
            BulkFillReport {
                cells: total,
                ..BulkFillReport::default()
            },
            |mut report, (id, result)| async move {
                match result {
                    Ok(invocation) if invocation.is_noop() => {
                        report.unchanged = report.unchanged.saturating_add(1);
                    }
                    Ok(_) => report.updated = report.updated.saturating_add(1),
                    Err(e) => {
                        error!(cell = %id, error = %e, "Rectangle fill failed for cell");
                        report.failed = report.failed.saturating_add(1);
                    }
                }
                report
            },
        )
        .await;

    info!(
        ?rect,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failed,
        "Rectangle fill finished"
    );
    report
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use cellgrid_store::MemoryJournal;
    use cellgrid_types::Region;
    use chrono::Utc;

    use super::*;

    #[test]
    fn subdivision_covers_every_cell_once() {
        for (w, h) in [(1, 1), (1, 7), (6, 1), (5, 3), (8, 8), (13, 9)] {
            let rect = Rect::new(-3, 2, -3 + w - 1, 2 + h - 1);
            let cells = subdivide(rect);
            let unique: BTreeSet<CellId> = cells.iter().copied().collect();
            assert_eq!(cells.len(), unique.len(), "{w}x{h}");
            assert_eq!(
                u64::try_from(cells.len()).unwrap_or(0),
                rect.width() * rect.height()
            );
            assert!(cells.iter().all(|id| rect.contains(*id)));
        }
    }

    #[test]
    fn quad_split_visits_top_left_quarter_first() {
        let cells = subdivide(Rect::new(0, 0, 3, 3));
        let first_four: BTreeSet<CellId> = cells.iter().take(4).copied().collect();
        let expected: BTreeSet<CellId> = [(0, 0), (1, 0), (0, 1), (1, 1)]
            .into_iter()
            .map(|(x, y)| CellId::new(x, y))
            .collect();
        assert_eq!(first_four, expected);
    }

    #[tokio::test]
    async fn fill_updates_each_cell_and_counts_noops() {
        let store = EntityStore::<CellState, _>::new(Arc::new(MemoryJournal::new()), Region::Local);
        let timing = Timing::at(Utc::now());
        let policy = RetryPolicy::once();

        let first = fill_rectangle(&store, Rect::new(0, 0, 2, 1), Status::Green, timing, &policy, 4).await;
        assert_eq!(
            first,
            BulkFillReport {
                cells: 6,
                updated: 6,
                unchanged: 0,
                failed: 0
            }
        );

        let again = fill_rectangle(&store, Rect::new(1, 0, 3, 0), Status::Green, timing, &policy, 2).await;
        assert_eq!(again.cells, 3);
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.updated, 1);

        let state = store.get(&CellId::new(2, 1)).await;
        assert_eq!(state.map(|s| s.status).ok(), Some(Status::Green));
    }
}
