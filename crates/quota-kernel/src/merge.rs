//! Projects the structure quota over a merge that a pending placement would trigger.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::counters::CounterStore;
use crate::host::{PendingPlacement, ProbeGuard, SpatialIndex};
use crate::ids::{CategoryId, StructureId};
use crate::permissions::QuotaProfile;

/// Extra distance added around the probe bounds when looking for adjacent structures.
pub const ADJACENCY_MARGIN: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum MergeConflictKind {
    Total { overflow: u32 },
    Category { category: CategoryId, overflow: u32 },
}

/// First adjacent structure whose objects would not fit into the target's remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub target: StructureId,
    pub adjacent: StructureId,
    pub kind: MergeConflictKind,
}

/// Walk every structure adjacent to `placement` and decrement the running budgets of
/// `target` by their counts. Returns the first overflow. Reads counters only, and the probe
/// is discarded before returning.
pub fn simulate_merge(
    counters: &CounterStore,
    spatial: &dyn SpatialIndex,
    profile: &QuotaProfile,
    placement: &PendingPlacement,
    target: StructureId,
) -> Option<MergeConflict> {
    let Some(probe) = ProbeGuard::materialize(spatial, placement) else {
        log::debug!("no probe for type {}; merge check skipped", placement.type_id);
        return None;
    };
    let bounds = probe.bounds()?;
    let hits = spatial.query_near(bounds.center, bounds.extent + ADJACENCY_MARGIN);
    drop(probe);

    let target_record = counters.structure(target);
    let mut total_budget = i64::from(profile.structure.total)
        - i64::from(target_record.map_or(0, |record| record.total()));
    let mut category_budget: HashMap<CategoryId, i64> = HashMap::new();
    let mut visited = HashSet::from([target]);

    for hit in hits {
        if !hit.structure.is_some() || !visited.insert(hit.structure) {
            continue;
        }
        let Some(adjacent) = counters.structure(hit.structure) else {
            continue;
        };
        for (category, count) in adjacent.categories() {
            total_budget -= i64::from(count);
            if total_budget < 0 {
                return Some(MergeConflict {
                    target,
                    adjacent: adjacent.id,
                    kind: MergeConflictKind::Total {
                        overflow: overflow(total_budget),
                    },
                });
            }
            let Some(cap) = profile.structure.category_cap(category) else {
                continue;
            };
            let budget = category_budget.entry(category).or_insert_with(|| {
                i64::from(cap) - i64::from(target_record.map_or(0, |record| record.count(category)))
            });
            *budget -= i64::from(count);
            if *budget < 0 {
                return Some(MergeConflict {
                    target,
                    adjacent: adjacent.id,
                    kind: MergeConflictKind::Category {
                        category,
                        overflow: overflow(*budget),
                    },
                });
            }
        }
    }
    None
}

pub fn would_merge_exceed_limit(
    counters: &CounterStore,
    spatial: &dyn SpatialIndex,
    profile: &QuotaProfile,
    placement: &PendingPlacement,
    target: StructureId,
) -> bool {
    simulate_merge(counters, spatial, profile, placement, target).is_some()
}

fn overflow(budget: i64) -> u32 {
    u32::try_from(-budget).unwrap_or(u32::MAX)
}
