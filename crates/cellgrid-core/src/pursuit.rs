//! Read-model backed predator pursuit.
//!
//! Wraps [`cellgrid_domain::next_cell`] with the query it needs: the
//! rectangle `[x +- range] x [y +- range]` around the predator, read from
//! the cell view. Shared by the propagation consumer (moving predators)
//! and the command service (creating them).

use std::sync::{Arc, Mutex, PoisonError};

use cellgrid_domain::next_cell;
use cellgrid_types::{CellId, Rect};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::warn;

use crate::view::{CellQuery, collect_cells_in_area};

/// Pursuit over a [`CellQuery`] with an owned random source.
#[derive(Debug)]
pub struct Pursuit<Q> {
    view: Arc<Q>,
    rng: Mutex<StdRng>,
}

impl<Q: CellQuery> Pursuit<Q> {
    /// Pursuit seeded from `seed`, or from the OS when `None`.
    pub fn new(view: Arc<Q>, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            view,
            rng: Mutex::new(rng),
        }
    }

    /// The view pursuit reads from.
    pub const fn view(&self) -> &Arc<Q> {
        &self.view
    }

    /// Next cell for a predator on `from` with `range` stamina left.
    ///
    /// A view failure is logged and treated as an empty neighborhood,
    /// which ends the predator.
    pub async fn next_from(&self, from: CellId, range: i32) -> Option<CellId> {
        let rect = Rect::around(from.x, from.y, range);
        let cells = match collect_cells_in_area(self.view.as_ref(), rect).await {
            Ok(cells) => cells,
            Err(e) => {
                warn!(cell = %from, range, error = %e, "Pursuit query failed");
                Vec::new()
            }
        };
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        next_cell(from, &cells, range, &mut *rng)
    }
}
