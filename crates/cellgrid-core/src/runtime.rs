//! Runtime wiring.
//!
//! [`GridRuntime`] builds the cell and sensor stores over one journal,
//! attaches the in-memory view and the propagation consumer to the cell
//! store's event subscription, and exposes the command service. The view
//! is rebuilt from the journal in the background on every start.

use std::sync::Arc;

use cellgrid_domain::{CellState, SensorState};
use cellgrid_store::{EntityStore, EventJournal};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::GridConfig;
use crate::consumer::PropagationConsumer;
use crate::pursuit::Pursuit;
use crate::service::{GridService, ServiceSettings};
use crate::view::MemoryCellView;

/// Service type produced by [`GridRuntime`].
pub type MemoryGridService<J> = GridService<J, MemoryCellView>;

/// A running Cellgrid node.
#[derive(Debug)]
pub struct GridRuntime<J: EventJournal> {
    cells: Arc<EntityStore<CellState, J>>,
    sensors: Arc<EntityStore<SensorState, J>>,
    view: Arc<MemoryCellView>,
    consumer: Arc<PropagationConsumer<J, MemoryCellView>>,
    service: Arc<MemoryGridService<J>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<J: EventJournal> GridRuntime<J> {
    /// Build the stores over `journal` and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &GridConfig, journal: Arc<J>) -> Self {
        let region = config.region.region();
        let cells = Arc::new(
            EntityStore::new(Arc::clone(&journal), region.clone())
                .with_snapshot_every(config.store.snapshot_every)
                .with_slot_capacity(config.store.slot_capacity),
        );
        let sensors = Arc::new(
            EntityStore::new(journal, region.clone())
                .with_snapshot_every(config.store.snapshot_every)
                .with_slot_capacity(config.store.slot_capacity),
        );

        let view = Arc::new(MemoryCellView::new(region.clone(), config.view.page_size));
        let projection = Arc::clone(&view).spawn_rebuild(Arc::clone(&cells), cells.subscribe());

        let pursuit = Arc::new(Pursuit::new(Arc::clone(&view), config.predator.seed));
        let consumer = Arc::new(PropagationConsumer::new(
            Arc::clone(&cells),
            Arc::clone(&pursuit),
            config.propagation.retry_policy(),
        ));
        let consuming = Arc::clone(&consumer).run(cells.subscribe());

        let service = Arc::new(GridService::new(
            Arc::clone(&cells),
            Arc::clone(&sensors),
            pursuit,
            ServiceSettings::from_config(config),
        ));

        info!(
            region = %region,
            snapshot_every = config.store.snapshot_every,
            page_size = config.view.page_size,
            "Grid runtime started"
        );

        Self {
            cells,
            sensors,
            view,
            consumer,
            service,
            tasks: vec![projection, consuming],
        }
    }

    /// The cell store.
    pub const fn cells(&self) -> &Arc<EntityStore<CellState, J>> {
        &self.cells
    }

    /// The sensor store.
    pub const fn sensors(&self) -> &Arc<EntityStore<SensorState, J>> {
        &self.sensors
    }

    /// The cell read model.
    pub const fn view(&self) -> &Arc<MemoryCellView> {
        &self.view
    }

    /// The propagation consumer.
    pub const fn consumer(&self) -> &Arc<PropagationConsumer<J, MemoryCellView>> {
        &self.consumer
    }

    /// The command service.
    pub const fn service(&self) -> &Arc<MemoryGridService<J>> {
        &self.service
    }

    /// Stop the projection and consumer tasks.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Grid runtime stopped");
    }
}
