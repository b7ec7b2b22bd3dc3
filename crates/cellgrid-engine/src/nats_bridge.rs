//! NATS cross-region replication bridge.
//!
//! [`NatsBridge`] ships every event that originated in this region to the
//! other regions, and replicates every event that originated elsewhere
//! into the local stores.
//!
//! # Subject Convention
//!
//! - **Publish:** `cellgrid.events.{region}.{kind}`, one message per event,
//!   the JSON-encoded [`EventEnvelope`]
//! - **Subscribe:** `cellgrid.events.>`
//!
//! A replicated event keeps its foreign origin, so it reaches the local
//! view but is never propagated or published again here.

use std::sync::Arc;

use cellgrid_core::GridRuntime;
use cellgrid_domain::{CellState, SensorState};
use cellgrid_store::{Aggregate, EntityStore, EventEnvelope, EventJournal, StoreError};
use cellgrid_types::Region;
use futures::StreamExt as _;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Prefix shared by every replication subject.
const SUBJECT_PREFIX: &str = "cellgrid.events";

/// Subject an event of `kind` from `region` is published on.
fn subject_for(region: &Region, kind: &str) -> String {
    format!("{SUBJECT_PREFIX}.{region}.{kind}")
}

/// The entity kind named by a replication subject.
fn kind_of(subject: &str) -> Option<&str> {
    subject
        .strip_prefix(SUBJECT_PREFIX)?
        .strip_prefix('.')?
        .rsplit_once('.')
        .map(|(_, kind)| kind)
}

/// Why an incoming message was not replicated.
#[derive(Debug, thiserror::Error)]
enum ReplicationError {
    /// The payload is not an envelope of the expected kind.
    #[error("undecodable envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// The local store rejected the event.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Decode `payload` and replicate it into `store` unless it is local.
///
/// Returns whether a new event was appended.
async fn replicate_into<A: Aggregate, J: EventJournal>(
    store: &EntityStore<A, J>,
    payload: &[u8],
) -> Result<bool, ReplicationError> {
    let envelope: EventEnvelope<A::Event> = serde_json::from_slice(payload)?;
    if envelope.origin == *store.region() {
        return Ok(false);
    }
    Ok(store.replicate(envelope).await?)
}

/// A running replication bridge.
#[derive(Debug)]
pub struct NatsBridge {
    tasks: Vec<JoinHandle<()>>,
}

impl NatsBridge {
    /// Connect to `url` and start replicating the stores of `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection or the subscription
    /// fails.
    pub async fn start<J: EventJournal>(
        url: &str,
        runtime: &GridRuntime<J>,
    ) -> Result<Self, EngineError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;

        let wildcard = format!("{SUBJECT_PREFIX}.>");
        let subscriber = client
            .subscribe(wildcard.clone())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {wildcard}: {e}"),
            })?;

        let region = runtime.cells().region().clone();
        let tasks = vec![
            tokio::spawn(publish_local::<CellState>(
                client.clone(),
                region.clone(),
                runtime.cells().subscribe(),
            )),
            tokio::spawn(publish_local::<SensorState>(
                client,
                region.clone(),
                runtime.sensors().subscribe(),
            )),
            tokio::spawn(replicate_foreign(
                subscriber,
                Arc::clone(runtime.cells()),
                Arc::clone(runtime.sensors()),
            )),
        ];

        info!(url, region = %region, subject = %wildcard, "NATS replication bridge started");
        Ok(Self { tasks })
    }

    /// Stop publishing and replicating.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("NATS replication bridge stopped");
    }
}

/// Publish every local-origin event from `receiver`.
async fn publish_local<A: Aggregate>(
    client: async_nats::Client,
    region: Region,
    mut receiver: UnboundedReceiver<EventEnvelope<A::Event>>,
) {
    let subject = subject_for(&region, A::KIND);
    while let Some(envelope) = receiver.recv().await {
        if envelope.origin != region {
            continue;
        }
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = A::KIND, entity = %envelope.entity_id, error = %e, "Failed to encode event");
                continue;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(kind = A::KIND, entity = %envelope.entity_id, error = %e, "Failed to publish event");
            continue;
        }
        debug!(
            kind = A::KIND,
            entity = %envelope.entity_id,
            sequence = envelope.sequence,
            "Published event"
        );
    }
    info!(kind = A::KIND, "Event subscription closed, publisher stopped");
}

/// Replicate every foreign event arriving on `subscriber`.
async fn replicate_foreign<J: EventJournal>(
    mut subscriber: async_nats::Subscriber,
    cells: Arc<EntityStore<CellState, J>>,
    sensors: Arc<EntityStore<SensorState, J>>,
) {
    while let Some(msg) = subscriber.next().await {
        let result = match kind_of(msg.subject.as_str()) {
            Some(CellState::KIND) => replicate_into(&cells, &msg.payload).await,
            Some(SensorState::KIND) => replicate_into(&sensors, &msg.payload).await,
            _ => {
                warn!(subject = %msg.subject, "Message on unknown replication subject");
                continue;
            }
        };
        match result {
            Ok(true) => debug!(subject = %msg.subject, "Replicated event"),
            Ok(false) => {}
            Err(e) => warn!(subject = %msg.subject, error = %e, "Failed to replicate event"),
        }
    }
    info!("NATS subscription closed, replication stopped");
}
