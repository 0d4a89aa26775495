//! Which structure a position or object belongs to, and the migrations that follow a
//! merge or split.

use serde::{Deserialize, Serialize};

use crate::classifier::ObjectClassifier;
use crate::counters::CounterStore;
use crate::host::{PendingPlacement, Position, SpatialIndex, WorldObject, WorldObjects};
use crate::ids::{ObjectId, StructureId};
use crate::ledger::OwnershipLedger;

/// Search radius around a point when attributing it to a structure.
pub const STRUCTURE_QUERY_RADIUS: f32 = 16.0;

/// Structure of the oldest structural element near `position`.
pub fn building_id_for_position(spatial: &dyn SpatialIndex, position: Position) -> Option<StructureId> {
    spatial
        .query_near(position, STRUCTURE_QUERY_RADIUS)
        .into_iter()
        .filter(|hit| hit.structure.is_some())
        .min_by_key(|hit| hit.creation_order)
        .map(|hit| hit.structure)
}

pub fn building_id_for_object(spatial: &dyn SpatialIndex, object: &WorldObject) -> Option<StructureId> {
    match object.structure.and_then(StructureId::non_zero) {
        Some(structure) => Some(structure),
        None => building_id_for_position(spatial, object.position),
    }
}

/// Structure a pending placement would join: the anchor's own structure, else whatever is
/// near the socket or the placement position.
pub fn building_id_for_placement(
    spatial: &dyn SpatialIndex,
    placement: &PendingPlacement,
) -> Option<StructureId> {
    if let Some(anchor) = &placement.anchor {
        if let Some(structure) = anchor.structure.and_then(StructureId::non_zero) {
            return Some(structure);
        }
        if let Some(socket) = anchor.socket {
            return building_id_for_position(spatial, socket);
        }
    }
    building_id_for_position(spatial, placement.position)
}

/// A host topology change waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyChange {
    Merged {
        absorbed: StructureId,
        survivor: StructureId,
    },
    Split {
        original: StructureId,
        created: StructureId,
    },
}

impl TopologyChange {
    /// `(previous, next)` ids: the structure objects leave and the nominal destination.
    pub fn ids(&self) -> (StructureId, StructureId) {
        match *self {
            TopologyChange::Merged { absorbed, survivor } => (absorbed, survivor),
            TopologyChange::Split { original, created } => (original, created),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopologyOutcome {
    pub owner_propagated: bool,
    pub migrated: usize,
}

/// Applies one deferred change: propagates the recorded owner to the nominal destination and
/// moves every member of the previous structure whose current structure id differs.
pub(crate) fn apply_change(
    change: TopologyChange,
    counters: &mut CounterStore,
    ledger: &mut OwnershipLedger,
    classifier: &ObjectClassifier,
    spatial: &dyn SpatialIndex,
    world: &dyn WorldObjects,
) -> TopologyOutcome {
    let (previous, next) = change.ids();
    let mut outcome = TopologyOutcome::default();

    if let Some(owner) = ledger.owner_of(previous) {
        if owner.is_valid() && world.structure_exists(next) {
            ledger.set_owner(next, owner);
            outcome.owner_propagated = true;
        }
    }

    let members: Vec<ObjectId> = counters
        .structure(previous)
        .map(|record| record.members().collect())
        .unwrap_or_default();
    for object_id in members {
        let Some(object) = world.find(object_id) else {
            continue;
        };
        let Some(category) = classifier.resolve_category(object.type_id) else {
            continue;
        };
        let Some(current) = building_id_for_object(spatial, &object) else {
            continue;
        };
        if current == previous {
            continue;
        }
        if counters.migrate_member(previous, current, category, object_id) {
            outcome.migrated += 1;
        }
    }

    log::debug!(
        "{change:?}: owner propagated {}, {} objects migrated",
        outcome.owner_propagated,
        outcome.migrated
    );
    outcome
}
