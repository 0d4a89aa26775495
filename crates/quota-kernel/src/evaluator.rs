//! Allow/deny decision for a pending placement, and the advisory usage threshold.

use std::fmt;

use serde::Serialize;

use crate::counters::{CounterStore, PlayerRecord};
use crate::ids::{CategoryId, PlayerId, StructureId};
use crate::merge::{MergeConflict, MergeConflictKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    GlobalTotal,
    GlobalCategory,
    StructureTotal,
    StructureCategory,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitScope::GlobalTotal => "global total",
            LimitScope::GlobalCategory => "global category",
            LimitScope::StructureTotal => "structure total",
            LimitScope::StructureCategory => "structure category",
        })
    }
}

/// Outcome of a placement check. Denials carry the scope, observed count and limit so the
/// caller can render its own message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    DeniedNoBuildRights,
    DeniedGlobalTotal {
        observed: u32,
        limit: u32,
    },
    DeniedGlobalCategory {
        category: CategoryId,
        observed: u32,
        limit: u32,
    },
    DeniedStructureTotal {
        structure: StructureId,
        observed: u32,
        limit: u32,
    },
    DeniedStructureCategory {
        structure: StructureId,
        category: CategoryId,
        observed: u32,
        limit: u32,
    },
    /// Joining `adjacent` onto `structure` would exceed the structure total by `overflow`.
    DeniedMergeTotal {
        structure: StructureId,
        adjacent: StructureId,
        overflow: u32,
    },
    DeniedMergeCategory {
        structure: StructureId,
        adjacent: StructureId,
        category: CategoryId,
        overflow: u32,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn scope(&self) -> Option<LimitScope> {
        match self {
            Decision::Allowed | Decision::DeniedNoBuildRights => None,
            Decision::DeniedGlobalTotal { .. } => Some(LimitScope::GlobalTotal),
            Decision::DeniedGlobalCategory { .. } => Some(LimitScope::GlobalCategory),
            Decision::DeniedStructureTotal { .. } | Decision::DeniedMergeTotal { .. } => {
                Some(LimitScope::StructureTotal)
            }
            Decision::DeniedStructureCategory { .. } | Decision::DeniedMergeCategory { .. } => {
                Some(LimitScope::StructureCategory)
            }
        }
    }
}

impl From<MergeConflict> for Decision {
    fn from(conflict: MergeConflict) -> Self {
        match conflict.kind {
            MergeConflictKind::Total { overflow } => Decision::DeniedMergeTotal {
                structure: conflict.target,
                adjacent: conflict.adjacent,
                overflow,
            },
            MergeConflictKind::Category { category, overflow } => Decision::DeniedMergeCategory {
                structure: conflict.target,
                adjacent: conflict.adjacent,
                category,
                overflow,
            },
        }
    }
}

/// Advisory notice that a player's usage crossed the configured warn percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdNotice {
    pub player: PlayerId,
    pub scope: LimitScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureId>,
    pub observed: u32,
    pub limit: u32,
    pub percent: f32,
}

/// Decide whether `player` may place one more object of `category`, optionally inside
/// `structure`. Rules apply in a fixed order and the first match wins. Never mutates.
pub fn evaluate(
    counters: &CounterStore,
    player: &PlayerRecord,
    category: CategoryId,
    structure: Option<StructureId>,
) -> Decision {
    if player.immune {
        return Decision::Allowed;
    }
    let Some(profile) = player.profile.as_deref() else {
        return Decision::DeniedNoBuildRights;
    };
    if !profile.can_build() {
        return Decision::DeniedNoBuildRights;
    }

    let owned = &player.counters;
    if owned.total >= profile.global.total {
        return Decision::DeniedGlobalTotal {
            observed: owned.total,
            limit: profile.global.total,
        };
    }
    if let Some(cap) = profile.global.category_cap(category) {
        let observed = owned.count(category);
        if observed >= cap {
            return Decision::DeniedGlobalCategory {
                category,
                observed,
                limit: cap,
            };
        }
    }

    let Some(record) = structure.and_then(|id| counters.structure(id)) else {
        return Decision::Allowed;
    };
    let observed = record.total();
    if observed >= profile.structure.total {
        return Decision::DeniedStructureTotal {
            structure: record.id,
            observed,
            limit: profile.structure.total,
        };
    }
    if let Some(cap) = profile.structure.category_cap(category) {
        let observed = record.count(category);
        if observed >= cap {
            return Decision::DeniedStructureCategory {
                structure: record.id,
                category,
                observed,
                limit: cap,
            };
        }
    }
    Decision::Allowed
}

/// First scope, in decision order, whose usage is at or above `warn_percent`.
/// Scopes with a zero limit are skipped.
pub fn threshold_notice(
    counters: &CounterStore,
    player: &PlayerRecord,
    category: CategoryId,
    structure: Option<StructureId>,
    warn_percent: f32,
) -> Option<ThresholdNotice> {
    if player.immune || warn_percent <= 0.0 {
        return None;
    }
    let profile = player.profile.as_deref()?;
    let record = structure.and_then(|id| counters.structure(id));

    let mut candidates = vec![(
        LimitScope::GlobalTotal,
        None,
        None,
        player.counters.total,
        profile.global.total,
    )];
    if let Some(cap) = profile.global.category_cap(category) {
        candidates.push((
            LimitScope::GlobalCategory,
            Some(category),
            None,
            player.counters.count(category),
            cap,
        ));
    }
    if let Some(record) = record {
        candidates.push((
            LimitScope::StructureTotal,
            None,
            Some(record.id),
            record.total(),
            profile.structure.total,
        ));
        if let Some(cap) = profile.structure.category_cap(category) {
            candidates.push((
                LimitScope::StructureCategory,
                Some(category),
                Some(record.id),
                record.count(category),
                cap,
            ));
        }
    }

    candidates
        .into_iter()
        .filter(|(.., limit)| *limit > 0)
        .map(|(scope, category, structure, observed, limit)| ThresholdNotice {
            player: player.id,
            scope,
            category,
            structure,
            observed,
            limit,
            percent: observed as f32 / limit as f32 * 100.0,
        })
        .find(|notice| notice.percent >= warn_percent)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;

    use super::*;
    use crate::ids::ObjectId;
    use crate::permissions::{LimitSet, QuotaProfile};

    const P: PlayerId = PlayerId(1);
    const S: StructureId = StructureId(3);
    const WOOD: CategoryId = CategoryId(100);
    const STONE: CategoryId = CategoryId(200);

    fn profile(global: u32, structure: u32) -> QuotaProfile {
        QuotaProfile {
            permission: "tier".into(),
            priority: Some(1),
            global: LimitSet {
                total: global,
                categories: IndexMap::new(),
            },
            structure: LimitSet {
                total: structure,
                categories: IndexMap::new(),
            },
            merge_guard: false,
        }
    }

    fn setup(profile: Option<QuotaProfile>) -> CounterStore {
        let mut store = CounterStore::new();
        store.ensure_player(P, || PlayerRecord::new(P, profile.map(Arc::new), false));
        store
    }

    fn place(store: &mut CounterStore, n: u64, category: CategoryId, structure: Option<StructureId>) {
        let base = store.player(P).unwrap().counters.total as u64;
        for i in 0..n {
            store.record_placement(P, structure, category, ObjectId(base + i + 1));
        }
    }

    #[test]
    fn immunity_bypasses_everything() {
        let mut store = setup(Some(profile(0, 0)));
        store.player_mut(P).unwrap().immune = true;
        let player = store.player(P).unwrap();
        assert_eq!(evaluate(&store, player, WOOD, Some(S)), Decision::Allowed);
    }

    #[test]
    fn missing_profile_or_zero_limit_means_no_build_rights() {
        let store = setup(None);
        assert_eq!(
            evaluate(&store, store.player(P).unwrap(), WOOD, None),
            Decision::DeniedNoBuildRights
        );
        let store = setup(Some(profile(0, 10)));
        assert_eq!(
            evaluate(&store, store.player(P).unwrap(), WOOD, None),
            Decision::DeniedNoBuildRights
        );
    }

    #[test]
    fn eleventh_object_hits_global_total() {
        let mut store = setup(Some(profile(10, 100)));
        place(&mut store, 10, WOOD, None);
        assert_eq!(
            evaluate(&store, store.player(P).unwrap(), WOOD, None),
            Decision::DeniedGlobalTotal {
                observed: 10,
                limit: 10
            }
        );
    }

    #[test]
    fn global_category_cap_is_per_category() {
        let mut p = profile(100, 100);
        p.global.categories.insert(WOOD, 2);
        let mut store = setup(Some(p));
        place(&mut store, 2, WOOD, None);
        let player = store.player(P).unwrap();
        assert_eq!(
            evaluate(&store, player, WOOD, None),
            Decision::DeniedGlobalCategory {
                category: WOOD,
                observed: 2,
                limit: 2
            }
        );
        assert_eq!(evaluate(&store, player, STONE, None), Decision::Allowed);
    }

    #[test]
    fn sixth_object_in_structure_hits_structure_total() {
        let mut store = setup(Some(profile(1000, 5)));
        place(&mut store, 5, WOOD, Some(S));
        let player = store.player(P).unwrap();
        assert_eq!(
            evaluate(&store, player, STONE, Some(S)),
            Decision::DeniedStructureTotal {
                structure: S,
                observed: 5,
                limit: 5
            }
        );
        assert_eq!(evaluate(&store, player, STONE, Some(StructureId(4))), Decision::Allowed);
        assert_eq!(evaluate(&store, player, STONE, None), Decision::Allowed);
    }

    #[test]
    fn structure_category_cap_checked_last() {
        let mut p = profile(1000, 50);
        p.structure.categories.insert(STONE, 1);
        let mut store = setup(Some(p));
        place(&mut store, 1, STONE, Some(S));
        let player = store.player(P).unwrap();
        assert_eq!(
            evaluate(&store, player, STONE, Some(S)),
            Decision::DeniedStructureCategory {
                structure: S,
                category: STONE,
                observed: 1,
                limit: 1
            }
        );
        assert_eq!(evaluate(&store, player, WOOD, Some(S)), Decision::Allowed);
    }

    #[test]
    fn generic_denial_reported_first() {
        let mut p = profile(3, 3);
        p.global.categories.insert(WOOD, 3);
        p.structure.categories.insert(WOOD, 3);
        let mut store = setup(Some(p));
        place(&mut store, 3, WOOD, Some(S));
        let decision = evaluate(&store, store.player(P).unwrap(), WOOD, Some(S));
        assert_eq!(decision.scope(), Some(LimitScope::GlobalTotal));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let mut store = setup(Some(profile(4, 4)));
        place(&mut store, 2, WOOD, Some(S));
        let player = store.player(P).unwrap();
        let first = evaluate(&store, player, WOOD, Some(S));
        let second = evaluate(&store, player, WOOD, Some(S));
        assert_eq!(first, second);
        assert_eq!(player.counters.total, 2);
    }

    #[test]
    fn threshold_reports_first_scope_over_percent() {
        let mut p = profile(100, 10);
        p.structure.categories.insert(WOOD, 4);
        let mut store = setup(Some(p));
        place(&mut store, 4, WOOD, Some(S));
        let player = store.player(P).unwrap();
        let notice = threshold_notice(&store, player, WOOD, Some(S), 80.0).unwrap();
        assert_eq!(notice.scope, LimitScope::StructureCategory);
        assert_eq!(notice.observed, 4);
        assert_eq!(notice.limit, 4);

        let notice = threshold_notice(&store, player, WOOD, Some(S), 40.0).unwrap();
        assert_eq!(notice.scope, LimitScope::StructureTotal);
        assert!(threshold_notice(&store, player, WOOD, None, 80.0).is_none());
    }
}
