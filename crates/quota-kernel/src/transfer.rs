//! Bulk re-ownership of placed objects.
//!
//! Planning runs over a snapshot of the counters with running budgets, the same technique
//! the merge simulator uses; nothing is written until the whole list has been classified.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::classifier::ObjectClassifier;
use crate::counters::{Adjustment, CounterStore, PlayerRecord};
use crate::evaluator::LimitScope;
use crate::host::{SpatialIndex, WorldObjects};
use crate::ids::{CategoryId, ObjectId, PlayerId, StructureId};
use crate::topology::building_id_for_object;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("player {0} cannot own objects")]
    InvalidOwner(PlayerId),
    #[error("structural object {object} cannot be given to {owner}: no build rights")]
    NoBuildRights { object: ObjectId, owner: PlayerId },
    #[error("structural object {object} would exceed {owner}'s {scope} limit")]
    StructuralOverflow {
        object: ObjectId,
        structure: Option<StructureId>,
        owner: PlayerId,
        scope: LimitScope,
    },
}

/// Counter changes and ledger updates for an accepted transfer.
#[derive(Debug, Default)]
pub(crate) struct TransferPlan {
    pub adjustments: Vec<Adjustment>,
    pub structures: BTreeSet<StructureId>,
    pub accepted: Vec<ObjectId>,
    pub rejected: BTreeSet<ObjectId>,
}

struct Candidate {
    id: ObjectId,
    previous_owner: PlayerId,
    category: CategoryId,
    structure: Option<StructureId>,
    structural: bool,
}

/// Remaining room for the new owner, decremented as objects are accepted.
struct Budgets<'a> {
    counters: &'a CounterStore,
    owner: &'a PlayerRecord,
    global_total: i64,
    global_category: HashMap<CategoryId, i64>,
    structure_total: HashMap<StructureId, i64>,
    structure_category: HashMap<(StructureId, CategoryId), i64>,
    /// Members already counted in a structure that are part of this transfer.
    moving: HashMap<(StructureId, CategoryId), i64>,
    moving_total: HashMap<StructureId, i64>,
}

impl Budgets<'_> {
    /// First scope without room for one more object of `category`, or `None` when it fits.
    fn try_take(&mut self, category: CategoryId, structure: Option<StructureId>) -> Option<LimitScope> {
        let Some(profile) = self.owner.profile.as_deref() else {
            return Some(LimitScope::GlobalTotal);
        };
        if self.global_total < 1 {
            return Some(LimitScope::GlobalTotal);
        }
        let global_cap = profile.global.category_cap(category);
        if let Some(cap) = global_cap {
            let owned = self.owner.counters.count(category);
            let budget = self
                .global_category
                .entry(category)
                .or_insert_with(|| i64::from(cap) - i64::from(owned));
            if *budget < 1 {
                return Some(LimitScope::GlobalCategory);
            }
        }

        if let Some(structure) = structure {
            let record = self.counters.structure(structure);
            let moving_total = self.moving_total.get(&structure).copied().unwrap_or(0);
            let total = self.structure_total.entry(structure).or_insert_with(|| {
                let settled = i64::from(record.map_or(0, |r| r.total())) - moving_total;
                i64::from(profile.structure.total) - settled
            });
            if *total < 1 {
                return Some(LimitScope::StructureTotal);
            }
            if let Some(cap) = profile.structure.category_cap(category) {
                let moving = self.moving.get(&(structure, category)).copied().unwrap_or(0);
                let budget = self
                    .structure_category
                    .entry((structure, category))
                    .or_insert_with(|| {
                        let settled = i64::from(record.map_or(0, |r| r.count(category))) - moving;
                        i64::from(cap) - settled
                    });
                if *budget < 1 {
                    return Some(LimitScope::StructureCategory);
                }
                *budget -= 1;
            }
            if let Some(total) = self.structure_total.get_mut(&structure) {
                *total -= 1;
            }
        }

        self.global_total -= 1;
        if global_cap.is_some() {
            if let Some(budget) = self.global_category.get_mut(&category) {
                *budget -= 1;
            }
        }
        None
    }
}

/// Classify every object in `objects` for `owner`. Fails without side effects when a
/// structural object does not fit.
pub(crate) fn plan_transfer(
    counters: &CounterStore,
    classifier: &ObjectClassifier,
    spatial: &dyn SpatialIndex,
    world: &dyn WorldObjects,
    owner: &PlayerRecord,
    objects: &[ObjectId],
) -> Result<TransferPlan, TransferError> {
    if !owner.id.is_valid() {
        return Err(TransferError::InvalidOwner(owner.id));
    }

    let mut plan = TransferPlan::default();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for &id in objects {
        if !seen.insert(id) {
            continue;
        }
        let Some(object) = world.find(id) else {
            log::debug!("transfer: object {id} not found, rejected");
            plan.rejected.insert(id);
            continue;
        };
        let Some(category) = classifier.resolve_category(object.type_id) else {
            continue;
        };
        if object.owner == owner.id {
            continue;
        }
        candidates.push(Candidate {
            id,
            previous_owner: object.owner,
            category,
            structure: building_id_for_object(spatial, &object),
            structural: classifier.is_structural(object.type_id),
        });
    }

    let mut budgets = Budgets {
        counters,
        owner,
        global_total: owner.profile.as_deref().map_or(0, |profile| {
            i64::from(profile.global.total) - i64::from(owner.counters.total)
        }),
        global_category: HashMap::new(),
        structure_total: HashMap::new(),
        structure_category: HashMap::new(),
        moving: HashMap::new(),
        moving_total: HashMap::new(),
    };
    for candidate in &candidates {
        let Some(structure) = candidate.structure else {
            continue;
        };
        if counters
            .structure(structure)
            .is_some_and(|record| record.contains(candidate.id))
        {
            *budgets.moving.entry((structure, candidate.category)).or_insert(0) += 1;
            *budgets.moving_total.entry(structure).or_insert(0) += 1;
        }
    }

    for candidate in candidates {
        if !owner.immune {
            if let Some(scope) = budgets.try_take(candidate.category, candidate.structure) {
                if candidate.structural {
                    return Err(match owner.profile {
                        None => TransferError::NoBuildRights {
                            object: candidate.id,
                            owner: owner.id,
                        },
                        Some(_) => TransferError::StructuralOverflow {
                            object: candidate.id,
                            structure: candidate.structure,
                            owner: owner.id,
                            scope,
                        },
                    });
                }
                log::debug!(
                    "transfer: object {} rejected for {} ({scope})",
                    candidate.id,
                    owner.id
                );
                plan.rejected.insert(candidate.id);
                continue;
            }
        }

        if candidate.previous_owner.is_valid() && counters.is_counted(candidate.id) {
            plan.adjustments.push(Adjustment::Player {
                player: candidate.previous_owner,
                category: candidate.category,
                delta: -1,
            });
        }
        plan.adjustments.push(Adjustment::Player {
            player: owner.id,
            category: candidate.category,
            delta: 1,
        });
        if let Some(structure) = candidate.structure {
            plan.adjustments.push(Adjustment::StructureAdd {
                structure,
                category: candidate.category,
                objects: vec![candidate.id],
            });
            plan.structures.insert(structure);
        } else {
            plan.adjustments.push(Adjustment::Track {
                objects: vec![candidate.id],
            });
        }
        plan.accepted.push(candidate.id);
    }
    Ok(plan)
}
