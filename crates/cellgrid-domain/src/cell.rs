//! The grid cell aggregate.
//!
//! A cell holds one [`Status`]. Commands are evaluated against the current
//! state by guards; a failed guard yields no events. Accepted commands
//! produce a local [`StatusUpdated`] and, for propagating operations,
//! outbound events addressed to other cells. Only `StatusUpdated` changes
//! the cell's own state; every other event is a message for the
//! propagation consumer that rides on this cell's stream.
//!
//! Spreading operations terminate without a visited set: a cell already
//! at the target status rejects the command, and span/fill never leave
//! the capped radius.

use cellgrid_store::{Aggregate, CommandContext};
use cellgrid_types::{CellId, Region, Status, Timing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::inside_radius;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Folded state of one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellState {
    /// `None` until the cell accepts its first command.
    pub id: Option<CellId>,
    /// Current color.
    pub status: Status,
    /// Server time of the first accepted command.
    pub created_at: DateTime<Utc>,
    /// Server time of the latest accepted command.
    pub updated_at: DateTime<Utc>,
    /// Client submit time of the latest update.
    pub client_at: DateTime<Utc>,
    /// Boundary receive time of the latest update.
    pub endpoint_at: DateTime<Utc>,
    /// Region that created the cell.
    pub created: Region,
    /// Region that last updated the cell.
    pub updated: Region,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Parameters shared by span and fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spread {
    /// Color to spread.
    pub status: Status,
    /// Column of the operation's center.
    pub center_x: i32,
    /// Row of the operation's center.
    pub center_y: i32,
    /// Requested radius; the domain never spreads beyond 50.
    pub radius: i32,
    /// Latency stamps of the originating request.
    pub timing: Timing,
}

/// One predator step, used by both `CreatePredator` and `MovePredator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredatorStep {
    /// Status the predator carries forward.
    pub status: Status,
    /// Remaining stamina before this step.
    pub range: i32,
    /// Ticks a visited cell stays lit.
    pub linger: i32,
    /// Cell the predator moves to next; `None` kills it.
    pub next_cell: Option<CellId>,
    /// Latency stamps of the originating request.
    pub timing: Timing,
}

/// Commands a cell accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellCommand {
    /// Set the cell's color.
    UpdateStatus {
        /// New color.
        status: Status,
        /// Latency stamps.
        timing: Timing,
    },
    /// Place a predator on this cell.
    CreatePredator(PredatorStep),
    /// A predator arrives on this cell.
    MovePredator(PredatorStep),
    /// One decay tick of a predator trail.
    LingerPredator {
        /// Status the trail carries.
        status: Status,
        /// Ticks remaining before this one.
        linger: i32,
        /// Latency stamps.
        timing: Timing,
    },
    /// Repaint a colored region.
    SpanStatus(Spread),
    /// Extend a color into unlit territory.
    FillStatus(Spread),
    /// Revert cells of one color to inactive.
    ClearStatus {
        /// Color to clear.
        status: Status,
    },
    /// Revert any lit cell to inactive.
    EraseStatus,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The one event that changes a cell's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdated {
    /// The cell.
    pub id: CellId,
    /// New color.
    pub status: Status,
    /// Creation time, unchanged after the first update.
    pub created_at: DateTime<Utc>,
    /// Time of this update.
    pub updated_at: DateTime<Utc>,
    /// Client submit time.
    pub client_at: DateTime<Utc>,
    /// Boundary receive time.
    pub endpoint_at: DateTime<Utc>,
    /// Region that created the cell.
    pub created: Region,
    /// Region that produced this update.
    pub updated: Region,
}

/// Events persisted on a cell's stream.
///
/// Every variant carries the id of the cell it is addressed to, which for
/// outbound variants is not the cell whose stream holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CellEvent {
    /// The cell changed color.
    StatusUpdated(StatusUpdated),
    /// A predator moves to `id`.
    PredatorMoved {
        /// Destination cell.
        id: CellId,
        /// Status the predator carries.
        status: Status,
        /// Stamina after this step.
        range: i32,
        /// Trail length.
        linger: i32,
        /// Latency stamps.
        timing: Timing,
    },
    /// The trail on `id` decays by one tick.
    PredatorLingered {
        /// The trail cell (the emitting cell itself).
        id: CellId,
        /// Status the trail carries.
        status: Status,
        /// Ticks remaining.
        linger: i32,
        /// Latency stamps.
        timing: Timing,
    },
    /// Span continues at neighbor `id`.
    SpanToNeighbor {
        /// Neighbor cell.
        id: CellId,
        /// Span parameters, unchanged from the command.
        spread: Spread,
    },
    /// Fill continues at neighbor `id`.
    FillToNeighbor {
        /// Neighbor cell.
        id: CellId,
        /// Fill parameters, unchanged from the command.
        spread: Spread,
    },
    /// Clear continues at neighbor `id`.
    ClearToNeighbor {
        /// Neighbor cell.
        id: CellId,
        /// Color being cleared.
        status: Status,
    },
    /// Erase continues at neighbor `id`.
    EraseToNeighbor {
        /// Neighbor cell.
        id: CellId,
    },
}

impl CellEvent {
    /// The cell this event is addressed to.
    pub const fn target(&self) -> CellId {
        match self {
            Self::StatusUpdated(e) => e.id,
            Self::PredatorMoved { id, .. }
            | Self::PredatorLingered { id, .. }
            | Self::SpanToNeighbor { id, .. }
            | Self::FillToNeighbor { id, .. }
            | Self::ClearToNeighbor { id, .. }
            | Self::EraseToNeighbor { id } => *id,
        }
    }

    /// Short kebab-case name, as used in the serialized `type` tag.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StatusUpdated(_) => "status-updated",
            Self::PredatorMoved { .. } => "predator-moved",
            Self::PredatorLingered { .. } => "predator-lingered",
            Self::SpanToNeighbor { .. } => "span-to-neighbor",
            Self::FillToNeighbor { .. } => "fill-to-neighbor",
            Self::ClearToNeighbor { .. } => "clear-to-neighbor",
            Self::EraseToNeighbor { .. } => "erase-to-neighbor",
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

impl CellState {
    /// Whether the cell has never accepted a command.
    pub const fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    /// Whether the cell is lit (initialized and not inactive).
    fn is_lit(&self) -> bool {
        !self.is_empty() && self.status != Status::Inactive
    }

    /// A `StatusUpdated` for an accepted command that originates here.
    fn touched(
        &self,
        id: CellId,
        status: Status,
        timing: Timing,
        context: &CommandContext,
    ) -> StatusUpdated {
        let empty = self.is_empty();
        StatusUpdated {
            id,
            status,
            created_at: if empty { context.now } else { self.created_at },
            updated_at: context.now,
            client_at: timing.client_at,
            endpoint_at: timing.endpoint_at,
            created: if empty {
                context.region.clone()
            } else {
                self.created.clone()
            },
            updated: context.region.clone(),
        }
    }

    /// A `StatusUpdated(inactive)` that keeps every other field.
    fn reverted(&self, id: CellId, context: &CommandContext) -> StatusUpdated {
        StatusUpdated {
            id,
            status: Status::Inactive,
            created_at: self.created_at,
            updated_at: context.now,
            client_at: self.client_at,
            endpoint_at: self.endpoint_at,
            created: self.created.clone(),
            updated: self.updated.clone(),
        }
    }

    fn update_status(
        &self,
        id: CellId,
        status: Status,
        timing: Timing,
        context: &CommandContext,
    ) -> Vec<CellEvent> {
        if !self.is_empty() && self.status == status {
            return Vec::new();
        }
        vec![CellEvent::StatusUpdated(
            self.touched(id, status, timing, context),
        )]
    }

    fn span_status(&self, id: CellId, spread: Spread, context: &CommandContext) -> Vec<CellEvent> {
        if !self.is_lit()
            || self.status == spread.status
            || !inside_radius(id, spread.center_x, spread.center_y, spread.radius)
        {
            return Vec::new();
        }
        let head = self.touched(id, spread.status, spread.timing, context);
        spread_events(head, id, |n| CellEvent::SpanToNeighbor { id: n, spread })
    }

    fn fill_status(&self, id: CellId, spread: Spread, context: &CommandContext) -> Vec<CellEvent> {
        if self.is_lit()
            || self.status == spread.status
            || !inside_radius(id, spread.center_x, spread.center_y, spread.radius)
        {
            return Vec::new();
        }
        let head = self.touched(id, spread.status, spread.timing, context);
        spread_events(head, id, |n| CellEvent::FillToNeighbor { id: n, spread })
    }

    fn clear_status(&self, id: CellId, status: Status, context: &CommandContext) -> Vec<CellEvent> {
        if !self.is_lit() || self.status != status {
            return Vec::new();
        }
        let head = self.reverted(id, context);
        spread_events(head, id, |n| CellEvent::ClearToNeighbor { id: n, status })
    }

    fn erase_status(&self, id: CellId, context: &CommandContext) -> Vec<CellEvent> {
        if !self.is_lit() {
            return Vec::new();
        }
        let head = self.reverted(id, context);
        spread_events(head, id, |n| CellEvent::EraseToNeighbor { id: n })
    }

    /// Stamina after the predator consumes this cell.
    ///
    /// Prey adds its intensity; anything else costs one.
    pub fn range_after_visit(&self, range: i32) -> i32 {
        if self.status.is_prey() {
            range.saturating_add(i32::from(self.status.prey_intensity()))
        } else {
            range.saturating_sub(1)
        }
    }

    fn predator_step(
        &self,
        id: CellId,
        step: PredatorStep,
        context: &CommandContext,
    ) -> Vec<CellEvent> {
        let new_range = self.range_after_visit(step.range);
        let next = match step.next_cell {
            Some(next) if new_range > 0 && step.linger > 0 => next,
            _ => {
                return vec![CellEvent::StatusUpdated(self.touched(
                    id,
                    Status::Inactive,
                    step.timing,
                    context,
                ))];
            }
        };

        vec![
            CellEvent::StatusUpdated(self.touched(id, Status::Predator, step.timing, context)),
            CellEvent::PredatorMoved {
                id: next,
                status: step.status,
                range: new_range,
                linger: step.linger,
                timing: step.timing,
            },
            CellEvent::PredatorLingered {
                id,
                status: step.status,
                linger: step.linger,
                timing: step.timing,
            },
        ]
    }

    fn linger_predator(
        &self,
        id: CellId,
        status: Status,
        linger: i32,
        timing: Timing,
        context: &CommandContext,
    ) -> Vec<CellEvent> {
        if self.is_empty() || self.status != Status::Predator {
            return Vec::new();
        }
        let new_linger = linger.saturating_sub(1);
        if new_linger <= 0 {
            return vec![CellEvent::StatusUpdated(self.touched(
                id,
                Status::Inactive,
                timing,
                context,
            ))];
        }
        vec![
            CellEvent::StatusUpdated(self.touched(id, Status::Predator, timing, context)),
            CellEvent::PredatorLingered {
                id,
                status,
                linger: new_linger,
                timing,
            },
        ]
    }
}

/// `head` followed by one outbound event per neighbor of `id`.
fn spread_events(
    head: StatusUpdated,
    id: CellId,
    to_neighbor: impl Fn(CellId) -> CellEvent,
) -> Vec<CellEvent> {
    let mut events = Vec::with_capacity(9);
    events.push(CellEvent::StatusUpdated(head));
    events.extend(id.neighbors().into_iter().map(to_neighbor));
    events
}

impl Aggregate for CellState {
    const KIND: &'static str = "grid-cell";
    type Id = CellId;
    type Command = CellCommand;
    type Event = CellEvent;

    fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    fn decide(&self, id: &CellId, command: &CellCommand, context: &CommandContext) -> Vec<CellEvent> {
        let id = *id;
        match *command {
            CellCommand::UpdateStatus { status, timing } => {
                self.update_status(id, status, timing, context)
            }
            CellCommand::CreatePredator(step) | CellCommand::MovePredator(step) => {
                self.predator_step(id, step, context)
            }
            CellCommand::LingerPredator {
                status,
                linger,
                timing,
            } => self.linger_predator(id, status, linger, timing, context),
            CellCommand::SpanStatus(spread) => self.span_status(id, spread, context),
            CellCommand::FillStatus(spread) => self.fill_status(id, spread, context),
            CellCommand::ClearStatus { status } => self.clear_status(id, status, context),
            CellCommand::EraseStatus => self.erase_status(id, context),
        }
    }

    fn apply(self, event: &CellEvent) -> Self {
        match event {
            CellEvent::StatusUpdated(e) => Self {
                id: Some(e.id),
                status: e.status,
                created_at: e.created_at,
                updated_at: e.updated_at,
                client_at: e.client_at,
                endpoint_at: e.endpoint_at,
                created: e.created.clone(),
                updated: e.updated.clone(),
            },
            CellEvent::PredatorMoved { .. }
            | CellEvent::PredatorLingered { .. }
            | CellEvent::SpanToNeighbor { .. }
            | CellEvent::FillToNeighbor { .. }
            | CellEvent::ClearToNeighbor { .. }
            | CellEvent::EraseToNeighbor { .. } => self,
        }
    }
}
