//! The propagation consumer.
//!
//! Subscribes to every cell event and turns outbound events into commands
//! on the addressed cell. Only events that originated in this region are
//! acted on: a replicated copy of a foreign event already propagated in its
//! own region, and re-issuing its commands here would cascade back and
//! forth between regions.
//!
//! Delivery is at least once. A redelivered event re-issues the same
//! command, which the target cell's guards turn into a no-op.

use std::sync::Arc;

use cellgrid_domain::{CellCommand, CellEvent, CellState, PredatorStep};
use cellgrid_store::{EntityStore, EventEnvelope, EventJournal, StoreError};
use cellgrid_types::CellId;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::pursuit::Pursuit;
use crate::retry::RetryPolicy;
use crate::view::CellQuery;

/// What the consumer did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event originated in another region.
    IgnoredForeign,
    /// The event does not continue anywhere.
    NotPropagating,
    /// A command was delivered to `target`.
    Dispatched {
        /// Cell the command was addressed to.
        target: CellId,
    },
    /// Every attempt to deliver the command to `target` failed.
    Dropped {
        /// Cell the command was addressed to.
        target: CellId,
    },
}

/// Follows outbound cell events with commands on their targets.
#[derive(Debug)]
pub struct PropagationConsumer<J, Q> {
    cells: Arc<EntityStore<CellState, J>>,
    pursuit: Arc<Pursuit<Q>>,
    retry: RetryPolicy,
}

impl<J: EventJournal, Q: CellQuery> PropagationConsumer<J, Q> {
    /// Create a consumer issuing commands to `cells`.
    pub const fn new(
        cells: Arc<EntityStore<CellState, J>>,
        pursuit: Arc<Pursuit<Q>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cells,
            pursuit,
            retry,
        }
    }

    /// Process one event.
    pub async fn handle(&self, envelope: &EventEnvelope<CellEvent>) -> Disposition {
        if envelope.origin != *self.cells.region() {
            debug!(
                event = envelope.event.name(),
                origin = %envelope.origin,
                region = %self.cells.region(),
                "Foreign event, not propagating"
            );
            return Disposition::IgnoredForeign;
        }

        let Some(command) = self.follow_on(&envelope.event).await else {
            return Disposition::NotPropagating;
        };
        let target = envelope.event.target();

        let result = self
            .retry
            .run(
                envelope.event.name(),
                || self.cells.invoke(&target, command),
                StoreError::is_transient,
            )
            .await;

        match result {
            Ok(invocation) => {
                debug!(
                    event = envelope.event.name(),
                    source = %envelope.entity_id,
                    cell = %target,
                    events = invocation.events.len(),
                    "Propagated"
                );
                Disposition::Dispatched { target }
            }
            Err(e) => {
                error!(
                    event = envelope.event.name(),
                    source = %envelope.entity_id,
                    cell = %target,
                    error = %e,
                    "Propagation dropped"
                );
                Disposition::Dropped { target }
            }
        }
    }

    /// The command an event asks of its target, if any.
    async fn follow_on(&self, event: &CellEvent) -> Option<CellCommand> {
        let command = match *event {
            CellEvent::StatusUpdated(_) => return None,
            CellEvent::SpanToNeighbor { spread, .. } => CellCommand::SpanStatus(spread),
            CellEvent::FillToNeighbor { spread, .. } => CellCommand::FillStatus(spread),
            CellEvent::ClearToNeighbor { status, .. } => CellCommand::ClearStatus { status },
            CellEvent::EraseToNeighbor { .. } => CellCommand::EraseStatus,
            CellEvent::PredatorLingered {
                status,
                linger,
                timing,
                ..
            } => CellCommand::LingerPredator {
                status,
                linger,
                timing,
            },
            CellEvent::PredatorMoved {
                id,
                status,
                range,
                linger,
                timing,
            } => {
                let next_cell = self.pursuit.next_from(id, range).await;
                CellCommand::MovePredator(PredatorStep {
                    status,
                    range,
                    linger,
                    next_cell,
                    timing,
                })
            }
        };
        Some(command)
    }

    /// Consume `receiver` until it closes, handling each event on its own
    /// task so that the neighbor commands of one event run in parallel.
    pub fn run(
        self: Arc<Self>,
        mut receiver: UnboundedReceiver<EventEnvelope<CellEvent>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(region = %self.cells.region(), "Propagation consumer started");
            while let Some(envelope) = receiver.recv().await {
                let consumer = Arc::clone(&self);
                tokio::spawn(async move {
                    consumer.handle(&envelope).await;
                });
            }
            info!("Cell event subscription closed, propagation consumer stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use cellgrid_domain::Spread;
    use cellgrid_store::{MemoryJournal, StoredEvent, StoredSnapshot};
    use cellgrid_types::{EventId, Region, Status, Timing};
    use chrono::Utc;

    use super::*;
    use crate::view::MemoryCellView;

    /// Journal whose first `failures` appends fail as if the database
    /// connection dropped.
    #[derive(Debug, Default)]
    struct FlakyJournal {
        inner: MemoryJournal,
        failures: AtomicU32,
        appends: AtomicU32,
    }

    impl FlakyJournal {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Self::default()
            }
        }
    }

    impl EventJournal for FlakyJournal {
        async fn append(
            &self,
            kind: &str,
            entity_id: &str,
            expected_sequence: u64,
            events: &[StoredEvent],
        ) -> Result<(), StoreError> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(StoreError::Journal("connection reset".to_owned()));
            }
            self.inner
                .append(kind, entity_id, expected_sequence, events)
                .await
        }

        async fn load(
            &self,
            kind: &str,
            entity_id: &str,
            after_sequence: u64,
        ) -> Result<Vec<StoredEvent>, StoreError> {
            self.inner.load(kind, entity_id, after_sequence).await
        }

        async fn entity_ids(&self, kind: &str) -> Result<Vec<String>, StoreError> {
            self.inner.entity_ids(kind).await
        }

        async fn contains(
            &self,
            kind: &str,
            entity_id: &str,
            event_id: EventId,
        ) -> Result<bool, StoreError> {
            self.inner.contains(kind, entity_id, event_id).await
        }

        async fn save_snapshot(
            &self,
            kind: &str,
            entity_id: &str,
            snapshot: &StoredSnapshot,
        ) -> Result<(), StoreError> {
            self.inner.save_snapshot(kind, entity_id, snapshot).await
        }

        async fn load_snapshot(
            &self,
            kind: &str,
            entity_id: &str,
        ) -> Result<Option<StoredSnapshot>, StoreError> {
            self.inner.load_snapshot(kind, entity_id).await
        }
    }

    type Fixture = (
        Arc<FlakyJournal>,
        Arc<EntityStore<CellState, FlakyJournal>>,
        PropagationConsumer<FlakyJournal, MemoryCellView>,
    );

    fn consumer(failures: u32, max_attempts: u32) -> Fixture {
        let journal = Arc::new(FlakyJournal::failing(failures));
        let cells = Arc::new(EntityStore::new(Arc::clone(&journal), Region::Local));
        let view = Arc::new(MemoryCellView::new(Region::Local, 16));
        let retry = RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: Duration::ZERO,
        };
        let consumer = PropagationConsumer::new(
            Arc::clone(&cells),
            Arc::new(Pursuit::new(view, Some(1))),
            retry,
        );
        (journal, cells, consumer)
    }

    fn fill_toward(target: CellId) -> EventEnvelope<CellEvent> {
        EventEnvelope {
            event_id: EventId::new(),
            entity_id: CellId::new(0, 0).to_string(),
            sequence: 2,
            origin: Region::Local,
            recorded_at: Utc::now(),
            event: CellEvent::FillToNeighbor {
                id: target,
                spread: Spread {
                    status: Status::Red,
                    center_x: 0,
                    center_y: 0,
                    radius: 2,
                    timing: Timing::default(),
                },
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_dispatched() {
        let (journal, cells, consumer) = consumer(2, 3);
        let target = CellId::new(1, 0);

        let disposition = consumer.handle(&fill_toward(target)).await;

        assert_eq!(disposition, Disposition::Dispatched { target });
        assert_eq!(journal.appends.load(Ordering::SeqCst), 3);
        assert_eq!(cells.get(&target).await.map(|c| c.status).ok(), Some(Status::Red));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_drop_the_command() {
        let (journal, cells, consumer) = consumer(10, 3);
        let target = CellId::new(1, 0);

        let disposition = consumer.handle(&fill_toward(target)).await;

        assert_eq!(disposition, Disposition::Dropped { target });
        assert_eq!(journal.appends.load(Ordering::SeqCst), 3);
        assert!(matches!(
            cells.get(&target).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(journal.inner.is_empty());
    }

    #[tokio::test]
    async fn foreign_events_are_ignored_without_touching_the_journal() {
        let (journal, _cells, consumer) = consumer(0, 3);
        let foreign = EventEnvelope {
            origin: Region::from_name("eu-west"),
            ..fill_toward(CellId::new(1, 0))
        };

        assert_eq!(consumer.handle(&foreign).await, Disposition::IgnoredForeign);
        assert_eq!(journal.appends.load(Ordering::SeqCst), 0);
    }
}
