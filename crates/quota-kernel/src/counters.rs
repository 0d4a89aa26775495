//! Live per-player and per-structure counters.
//!
//! Every mutation keeps `|members| == sum(per_category)` for structures and never lets a
//! counter go below zero; removals of objects that were never counted are ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::ids::{CategoryId, ObjectId, PlayerId, StructureId};
use crate::permissions::QuotaProfile;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerCounters {
    pub total: u32,
    pub per_category: HashMap<CategoryId, u32>,
}

impl PlayerCounters {
    pub fn count(&self, category: CategoryId) -> u32 {
        self.per_category.get(&category).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: PlayerId,
    /// `None` means the player was observed to hold no quota-granting permission.
    pub profile: Option<Arc<QuotaProfile>>,
    pub immune: bool,
    pub counters: PlayerCounters,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, profile: Option<Arc<QuotaProfile>>, immune: bool) -> Self {
        Self {
            id,
            profile,
            immune,
            counters: PlayerCounters::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureRecord {
    pub id: StructureId,
    members: HashSet<ObjectId>,
    per_category: HashMap<CategoryId, u32>,
}

impl StructureRecord {
    pub fn new(id: StructureId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn total(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn count(&self, category: CategoryId) -> u32 {
        self.per_category.get(&category).copied().unwrap_or(0)
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.members.contains(&object)
    }

    pub fn members(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.members.iter().copied()
    }

    /// Category counts sorted by category id.
    pub fn categories(&self) -> Vec<(CategoryId, u32)> {
        let mut counts: Vec<_> = self
            .per_category
            .iter()
            .map(|(category, count)| (*category, *count))
            .collect();
        counts.sort_unstable();
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn insert(&mut self, category: CategoryId, object: ObjectId) -> bool {
        if !self.members.insert(object) {
            return false;
        }
        *self.per_category.entry(category).or_insert(0) += 1;
        true
    }

    fn remove(&mut self, category: CategoryId, object: ObjectId) -> bool {
        if !self.members.remove(&object) {
            return false;
        }
        decrement(&mut self.per_category, category);
        true
    }
}

/// One step of a batch applied through [`CounterStore::bulk_adjust`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    /// Signed delta on a player's category and total counters.
    Player {
        player: PlayerId,
        category: CategoryId,
        delta: i64,
    },
    /// Objects joining a structure under one category, leaving whichever structure held them.
    StructureAdd {
        structure: StructureId,
        category: CategoryId,
        objects: Vec<ObjectId>,
    },
    /// Objects counted outside any structure. Already counted objects stay where they are.
    Track { objects: Vec<ObjectId> },
    /// Objects no longer counted at all; they also leave their structure.
    Release {
        category: CategoryId,
        objects: Vec<ObjectId>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CounterStore {
    players: HashMap<PlayerId, PlayerRecord>,
    structures: HashMap<StructureId, StructureRecord>,
    /// Every counted object and the structure record holding it.
    held: HashMap<ObjectId, Option<StructureId>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerRecord> {
        self.players.get_mut(&id)
    }

    /// Returns the player's record, creating it with `init` on first access.
    pub fn ensure_player(
        &mut self,
        id: PlayerId,
        init: impl FnOnce() -> PlayerRecord,
    ) -> &mut PlayerRecord {
        self.players.entry(id).or_insert_with(init)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut PlayerRecord> {
        self.players.values_mut()
    }

    pub fn structure(&self, id: StructureId) -> Option<&StructureRecord> {
        self.structures.get(&id)
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureRecord> {
        self.structures.values()
    }

    pub fn is_counted(&self, object: ObjectId) -> bool {
        self.held.contains_key(&object)
    }

    /// The structure whose record holds `object`. Until a pending merge is applied this may
    /// still be the absorbed id.
    pub fn holder(&self, object: ObjectId) -> Option<StructureId> {
        self.held.get(&object).copied().flatten()
    }

    /// Count one placed object. `structure` is `None` for objects outside any structure.
    /// Returns false, changing nothing, when the object is already counted.
    pub fn record_placement(
        &mut self,
        player: PlayerId,
        structure: Option<StructureId>,
        category: CategoryId,
        object: ObjectId,
    ) -> bool {
        if self.held.contains_key(&object) {
            log::warn!("object {object} already counted, placement ignored");
            return false;
        }
        let Some(record) = self.players.get_mut(&player) else {
            log::warn!("placement for unknown player {player} ignored");
            return false;
        };
        increment_player(record, category, 1);
        if let Some(structure) = structure {
            self.structures
                .entry(structure)
                .or_insert_with(|| StructureRecord::new(structure))
                .insert(category, object);
        }
        self.held.insert(object, structure);
        true
    }

    /// Symmetric to [`record_placement`](Self::record_placement): the object leaves whichever
    /// structure holds it. Returns false, changing nothing, when it was not counted.
    pub fn record_removal(
        &mut self,
        player: PlayerId,
        category: CategoryId,
        object: ObjectId,
    ) -> bool {
        let Some(holder) = self.held.remove(&object) else {
            log::debug!("object {object} was not counted, removal ignored");
            return false;
        };
        if let Some(structure) = holder {
            if let Some(record) = self.structures.get_mut(&structure) {
                record.remove(category, object);
            }
        }
        match self.players.get_mut(&player) {
            Some(record) => decrement_player(record, category, 1),
            None => log::warn!("removal for unknown player {player} ignored"),
        }
        true
    }

    /// Moves one object between structures. Returns false when it was not in `from`.
    pub fn migrate_member(
        &mut self,
        from: StructureId,
        to: StructureId,
        category: CategoryId,
        object: ObjectId,
    ) -> bool {
        let removed = self
            .structures
            .get_mut(&from)
            .is_some_and(|record| record.remove(category, object));
        if !removed {
            return false;
        }
        self.structures
            .entry(to)
            .or_insert_with(|| StructureRecord::new(to))
            .insert(category, object);
        self.held.insert(object, Some(to));
        true
    }

    /// Apply a batch of adjustments under a single borrow so no reader sees it half-done.
    pub fn bulk_adjust(&mut self, batch: impl IntoIterator<Item = Adjustment>) {
        for adjustment in batch {
            match adjustment {
                Adjustment::Player {
                    player,
                    category,
                    delta,
                } => {
                    let Some(record) = self.players.get_mut(&player) else {
                        log::warn!("adjustment for unknown player {player} ignored");
                        continue;
                    };
                    let magnitude = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
                    if delta >= 0 {
                        increment_player(record, category, magnitude);
                    } else {
                        decrement_player(record, category, magnitude);
                    }
                }
                Adjustment::StructureAdd {
                    structure,
                    category,
                    objects,
                } => {
                    for object in objects {
                        if let Some(previous) = self.holder(object).filter(|id| *id != structure) {
                            if let Some(record) = self.structures.get_mut(&previous) {
                                record.remove(category, object);
                            }
                        }
                        self.structures
                            .entry(structure)
                            .or_insert_with(|| StructureRecord::new(structure))
                            .insert(category, object);
                        self.held.insert(object, Some(structure));
                    }
                }
                Adjustment::Track { objects } => {
                    for object in objects {
                        self.held.entry(object).or_insert(None);
                    }
                }
                Adjustment::Release { category, objects } => {
                    for object in objects {
                        if let Some(Some(structure)) = self.held.remove(&object) {
                            if let Some(record) = self.structures.get_mut(&structure) {
                                record.remove(category, object);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drop structure records with no members left.
    pub fn prune_empty_structures(&mut self) -> usize {
        let before = self.structures.len();
        self.structures.retain(|_, record| !record.is_empty());
        before - self.structures.len()
    }

    /// Zero every counter but keep player records (and their resolved profiles).
    pub fn reset_counts(&mut self) {
        for record in self.players.values_mut() {
            record.counters = PlayerCounters::default();
        }
        self.structures.clear();
        self.held.clear();
    }
}

fn increment_player(record: &mut PlayerRecord, category: CategoryId, amount: u32) {
    if amount == 0 {
        return;
    }
    record.counters.total = record.counters.total.saturating_add(amount);
    let entry = record.counters.per_category.entry(category).or_insert(0);
    *entry = entry.saturating_add(amount);
}

fn decrement_player(record: &mut PlayerRecord, category: CategoryId, amount: u32) {
    if amount == 0 {
        return;
    }
    let current = record.counters.count(category);
    if current == 0 {
        log::warn!(
            "player {} has no counted objects in category {category}, removal ignored",
            record.id
        );
        return;
    }
    let applied = amount.min(current);
    if applied < amount {
        log::warn!(
            "player {} category {category} clamped at zero ({current} < {amount})",
            record.id
        );
    }
    let remaining = current - applied;
    if remaining == 0 {
        record.counters.per_category.remove(&category);
    } else {
        record.counters.per_category.insert(category, remaining);
    }
    record.counters.total = record.counters.total.saturating_sub(applied);
}

/// Decrement by one, deleting the entry instead of keeping a zero.
fn decrement(map: &mut HashMap<CategoryId, u32>, category: CategoryId) {
    if let Some(count) = map.get_mut(&category) {
        if *count <= 1 {
            map.remove(&category);
        } else {
            *count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: PlayerId = PlayerId(1);
    const S: StructureId = StructureId(5);
    const C: CategoryId = CategoryId(10);

    fn store() -> CounterStore {
        let mut store = CounterStore::new();
        store.ensure_player(P, || PlayerRecord::new(P, None, false));
        store
    }

    fn structure_invariant_holds(store: &CounterStore) -> bool {
        store.structures().all(|record| {
            record.total() == record.categories().iter().map(|(_, n)| n).sum::<u32>()
        })
    }

    #[test]
    fn placement_and_removal_are_symmetric() {
        let mut store = store();
        assert!(store.record_placement(P, Some(S), C, ObjectId(1)));
        assert!(store.record_placement(P, Some(S), C, ObjectId(2)));
        assert!(store.record_placement(P, None, C, ObjectId(3)));
        let player = store.player(P).unwrap();
        assert_eq!(player.counters.total, 3);
        assert_eq!(player.counters.count(C), 3);
        assert_eq!(store.structure(S).unwrap().total(), 2);
        assert_eq!(store.holder(ObjectId(1)), Some(S));
        assert!(store.is_counted(ObjectId(3)));
        assert_eq!(store.holder(ObjectId(3)), None);

        assert!(store.record_removal(P, C, ObjectId(1)));
        assert!(store.record_removal(P, C, ObjectId(2)));
        assert!(store.record_removal(P, C, ObjectId(3)));
        let player = store.player(P).unwrap();
        assert_eq!(player.counters.total, 0);
        assert!(player.counters.per_category.is_empty());
        assert!(store.structure(S).unwrap().is_empty());
        assert!(!store.is_counted(ObjectId(3)));
        assert!(structure_invariant_holds(&store));
    }

    #[test]
    fn removal_of_uncounted_object_never_underflows() {
        let mut store = store();
        assert!(!store.record_removal(P, C, ObjectId(9)));
        let player = store.player(P).unwrap();
        assert_eq!(player.counters.total, 0);
        assert!(store.structure(S).is_none());
    }

    #[test]
    fn repeated_removal_leaves_other_objects_counted() {
        let mut store = store();
        for id in 1..=3 {
            store.record_placement(P, Some(S), C, ObjectId(id));
        }
        assert!(store.record_removal(P, C, ObjectId(1)));
        assert!(!store.record_removal(P, C, ObjectId(1)));
        let player = store.player(P).unwrap();
        assert_eq!(player.counters.total, 2);
        assert_eq!(player.counters.count(C), 2);
        assert_eq!(store.structure(S).unwrap().total(), 2);
    }

    #[test]
    fn duplicate_placement_counts_once() {
        let mut store = store();
        assert!(store.record_placement(P, Some(S), C, ObjectId(1)));
        assert!(!store.record_placement(P, Some(S), C, ObjectId(1)));
        assert!(store.record_placement(P, None, C, ObjectId(2)));
        assert!(!store.record_placement(P, None, C, ObjectId(2)));
        assert_eq!(store.structure(S).unwrap().total(), 1);
        assert_eq!(store.player(P).unwrap().counters.total, 2);
        assert!(structure_invariant_holds(&store));
    }

    #[test]
    fn migrate_moves_one_member() {
        let mut store = store();
        store.record_placement(P, Some(S), C, ObjectId(1));
        store.record_placement(P, Some(S), C, ObjectId(2));
        assert!(store.migrate_member(S, StructureId(6), C, ObjectId(1)));
        assert!(!store.migrate_member(S, StructureId(6), C, ObjectId(42)));
        assert_eq!(store.structure(S).unwrap().total(), 1);
        assert_eq!(store.structure(StructureId(6)).unwrap().count(C), 1);
        assert_eq!(store.holder(ObjectId(1)), Some(StructureId(6)));
        assert!(structure_invariant_holds(&store));

        assert!(store.record_removal(P, C, ObjectId(1)));
        assert!(store.structure(StructureId(6)).unwrap().is_empty());
    }

    #[test]
    fn bulk_adjust_clamps_negative_deltas() {
        let mut store = store();
        store.bulk_adjust([
            Adjustment::Player {
                player: P,
                category: C,
                delta: 4,
            },
            Adjustment::StructureAdd {
                structure: S,
                category: C,
                objects: vec![ObjectId(1), ObjectId(2)],
            },
        ]);
        assert_eq!(store.player(P).unwrap().counters.total, 4);
        store.bulk_adjust([
            Adjustment::Player {
                player: P,
                category: C,
                delta: -10,
            },
            Adjustment::Release {
                category: C,
                objects: vec![ObjectId(2), ObjectId(3)],
            },
        ]);
        let player = store.player(P).unwrap();
        assert_eq!(player.counters.total, 0);
        assert!(player.counters.per_category.is_empty());
        assert_eq!(store.structure(S).unwrap().total(), 1);
        assert!(!store.is_counted(ObjectId(2)));
        assert!(structure_invariant_holds(&store));
    }

    #[test]
    fn structure_add_moves_object_out_of_its_holder() {
        let mut store = store();
        store.record_placement(P, Some(S), C, ObjectId(1));
        store.bulk_adjust([
            Adjustment::StructureAdd {
                structure: StructureId(6),
                category: C,
                objects: vec![ObjectId(1)],
            },
            Adjustment::Track {
                objects: vec![ObjectId(1), ObjectId(2)],
            },
        ]);
        assert!(store.structure(S).unwrap().is_empty());
        assert_eq!(store.holder(ObjectId(1)), Some(StructureId(6)));
        assert!(store.is_counted(ObjectId(2)));
        assert_eq!(store.holder(ObjectId(2)), None);
    }

    #[test]
    fn prune_drops_only_empty_records() {
        let mut store = store();
        store.record_placement(P, Some(S), C, ObjectId(1));
        store.record_placement(P, Some(StructureId(6)), C, ObjectId(2));
        store.record_removal(P, C, ObjectId(2));
        assert_eq!(store.prune_empty_structures(), 1);
        assert!(store.structure(S).is_some());
    }

    #[test]
    fn reset_forgets_counted_objects() {
        let mut store = store();
        store.record_placement(P, Some(S), C, ObjectId(1));
        store.reset_counts();
        assert!(!store.is_counted(ObjectId(1)));
        assert!(store.record_placement(P, Some(S), C, ObjectId(1)));
        assert_eq!(store.player(P).unwrap().counters.total, 1);
    }
}
