//! The engine instance a host creates once per session and feeds events into.

use std::borrow::Cow;
use std::collections::BTreeSet;

use quota_store::{DynStore, MemStore};
use serde::{Deserialize, Serialize};

use crate::classifier::{ConfigIssue, ObjectClassifier};
use crate::config::LimitsConfig;
use crate::counters::{Adjustment, CounterStore, PlayerRecord, StructureRecord};
use crate::error::KernelError;
use crate::evaluator::{self, Decision, ThresholdNotice};
use crate::host::{
    ObjectCatalog, PendingPlacement, PermissionOracle, Position, SharedPermissionOracle,
    SharedSpatialIndex, SharedWorldObjects, TrackableType, WorldObject,
};
use crate::ids::{CategoryId, ObjectId, PlayerId, StructureId};
use crate::ledger::OwnershipLedger;
use crate::memory::{MemPermissions, MemWorld};
use crate::merge;
use crate::permissions::{PermissionChange, PermissionResolver};
use crate::report::LimitsReport;
use crate::scheduler::Scheduler;
use crate::topology::{self, TopologyChange};
use crate::transfer::{self, TransferError};

/// Capabilities supplied by the host.
#[derive(Clone)]
pub struct HostServices {
    pub permissions: SharedPermissionOracle,
    pub spatial: SharedSpatialIndex,
    pub world: SharedWorldObjects,
    pub store: DynStore,
}

impl HostServices {
    /// Host backed entirely by in-memory fakes. The handles passed in stay usable by the
    /// caller since clones share state.
    pub fn in_memory(permissions: &MemPermissions, world: &MemWorld, store: &MemStore) -> Self {
        Self {
            permissions: std::sync::Arc::new(permissions.clone()),
            spatial: std::sync::Arc::new(world.clone()),
            world: std::sync::Arc::new(world.clone()),
            store: std::sync::Arc::new(store.clone()),
        }
    }
}

/// Host event, either passed straight to an `on_*` method or queued with
/// [`LimitEngine::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ObjectPlaced { object: WorldObject },
    ObjectRemoved { object: WorldObject },
    StructureMerged { absorbed: StructureId, survivor: StructureId },
    StructureSplit { original: StructureId, created: StructureId },
    PlayerConnected { player: PlayerId },
    PermissionChanged { change: PermissionChange },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub objects: usize,
    pub players: usize,
    pub structures: usize,
    pub ledger_entries: usize,
    pub pruned: usize,
    pub bootstrapped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub events: usize,
    pub topology_changes: usize,
    pub migrated_objects: usize,
    pub notices: Vec<ThresholdNotice>,
}

pub struct LimitEngine {
    config: LimitsConfig,
    types: Vec<TrackableType>,
    classifier: ObjectClassifier,
    resolver: PermissionResolver,
    issues: Vec<ConfigIssue>,
    counters: CounterStore,
    ledger: OwnershipLedger,
    scheduler: Scheduler,
    host: HostServices,
    enabled: bool,
}

impl LimitEngine {
    /// Builds the classifier and permission tiers. Event intake stays disabled until
    /// [`start`](Self::start) has rebuilt the counters.
    pub fn new(config: LimitsConfig, catalog: &dyn ObjectCatalog, host: HostServices) -> Self {
        let types = catalog.enumerate_trackable_types();
        let (classifier, resolver, issues) = build_tables(&types, &config);
        log::info!(
            "tracking {} object types across {} tiers",
            classifier.tracked_len(),
            resolver.tiers().len()
        );
        Self {
            config,
            types,
            classifier,
            resolver,
            issues,
            counters: CounterStore::new(),
            ledger: OwnershipLedger::new(),
            scheduler: Scheduler::default(),
            host,
            enabled: false,
        }
    }

    /// Loads and prunes the ownership ledger, bootstraps it from the world when empty, rebuilds
    /// the counters from every live object and enables event intake.
    pub fn start(&mut self) -> Result<RebuildSummary, KernelError> {
        let world = self.host.world.clone();
        let mut ledger = OwnershipLedger::load(self.host.store.as_ref())?;
        let pruned = ledger.prune(|structure| world.structure_exists(structure));
        let bootstrapped = if ledger.is_empty() {
            ledger.bootstrap(world.as_ref())
        } else {
            0
        };
        self.ledger = ledger;

        let mut summary = self.rebuild();
        summary.pruned = pruned;
        summary.bootstrapped = bootstrapped;
        if self.ledger.is_dirty() {
            self.ledger.save(self.host.store.as_ref())?;
        }
        self.enabled = true;
        log::info!(
            "started: {} objects, {} players, {} structures, {} owned structures",
            summary.objects,
            summary.players,
            summary.structures,
            summary.ledger_entries
        );
        Ok(summary)
    }

    /// Recount every live tracked object from scratch. Safe to call repeatedly.
    pub fn rebuild(&mut self) -> RebuildSummary {
        self.counters.reset_counts();
        for record in self.counters.players_mut() {
            record.profile = self.resolver.resolve(self.host.permissions.as_ref(), record.id);
            record.immune = self.resolver.is_immune(self.host.permissions.as_ref(), record.id);
        }

        let mut objects = self.host.world.live_objects();
        objects.sort_by_key(|object| object.id);
        let mut counted = 0;
        for object in &objects {
            if self.count_placement(object).is_some() {
                counted += 1;
            }
        }

        RebuildSummary {
            objects: counted,
            players: self.counters.players().count(),
            structures: self.counters.structures().count(),
            ledger_entries: self.ledger.len(),
            pruned: 0,
            bootstrapped: 0,
        }
    }

    /// Saves the ledger and stops accepting events.
    pub fn shutdown(&mut self) -> Result<(), KernelError> {
        self.enabled = false;
        self.scheduler.clear();
        self.ledger.save(self.host.store.as_ref())
    }

    /// Swaps in a new configuration, re-resolves every known player and recounts.
    pub fn reload_config(&mut self, config: LimitsConfig) -> &[ConfigIssue] {
        let (classifier, resolver, issues) = build_tables(&self.types, &config);
        self.config = config;
        self.classifier = classifier;
        self.resolver = resolver;
        self.issues = issues;
        self.rebuild();
        &self.issues
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_object_placed(&mut self, object: &WorldObject) -> Option<ThresholdNotice> {
        if !self.accepting("object placed") {
            return None;
        }
        let (category, structure) = self.count_placement(object)?;
        log::debug!(
            "{} placed {} ({}) in {:?}; total {}",
            object.owner,
            object.id,
            self.classifier.label(category),
            structure,
            self.counters
                .player(object.owner)
                .map_or(0, |record| record.counters.total)
        );
        self.notice_for(object.owner, category, structure)
    }

    pub fn on_object_removed(&mut self, object: &WorldObject) {
        if !self.accepting("object removed") || !object.owner.is_valid() {
            return;
        }
        let Some(category) = self.classifier.resolve_category(object.type_id) else {
            return;
        };
        if !self
            .counters
            .record_removal(object.owner, category, object.id)
        {
            return;
        }

        if object.decay_element {
            let structure = topology::building_id_for_object(self.host.spatial.as_ref(), object);
            if let Some(structure) = structure {
                let others = self
                    .host
                    .world
                    .decay_elements(structure)
                    .iter()
                    .any(|element| element.id != object.id);
                if !others && self.ledger.clear(structure).is_some() {
                    log::debug!("structure {structure} lost its last element; owner cleared");
                }
            }
        }

        log::debug!(
            "{} removed {} ({}); total {}",
            object.owner,
            object.id,
            self.classifier.label(category),
            self.counters
                .player(object.owner)
                .map_or(0, |record| record.counters.total)
        );
    }

    /// Queues the migration for the next tick; the host's remapping is not complete yet.
    pub fn on_structure_merged(&mut self, absorbed: StructureId, survivor: StructureId) {
        if self.accepting("structure merged") {
            self.scheduler
                .push_topology(TopologyChange::Merged { absorbed, survivor });
        }
    }

    pub fn on_structure_split(&mut self, original: StructureId, created: StructureId) {
        if self.accepting("structure split") {
            self.scheduler
                .push_topology(TopologyChange::Split { original, created });
        }
    }

    pub fn on_player_connected(&mut self, player: PlayerId) {
        if self.accepting("player connected") {
            self.invalidate(player);
        }
    }

    /// Re-resolves every player the change may affect. Returns them.
    pub fn on_permission_changed(&mut self, change: &PermissionChange) -> Vec<PlayerId> {
        if !self.accepting("permission changed") {
            return Vec::new();
        }
        let affected = self
            .resolver
            .affected_players(self.host.permissions.as_ref(), change);
        for player in &affected {
            self.invalidate(*player);
        }
        affected
    }

    /// Drops the cached profile and immunity flag of `player` and resolves them again.
    pub fn invalidate(&mut self, player: PlayerId) {
        if !player.is_valid() {
            return;
        }
        let oracle = self.host.permissions.as_ref();
        let profile = self.resolver.resolve(oracle, player);
        let immune = self.resolver.is_immune(oracle, player);
        let record = ensure_record(&mut self.counters, &self.resolver, oracle, player);
        record.profile = profile;
        record.immune = immune;
        log::debug!(
            "{player} resolved to {}{}",
            record
                .profile
                .as_ref()
                .map_or("no tier", |profile| profile.permission.as_str()),
            if record.immune { " (immune)" } else { "" }
        );
    }

    pub fn submit(&mut self, event: EngineEvent) {
        self.scheduler.push_event(event);
    }

    /// Runs the topology changes queued before this tick, then every submitted event.
    /// Merges and splits among those events wait for the following tick.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for change in self.scheduler.take_due_topology() {
            let outcome = topology::apply_change(
                change,
                &mut self.counters,
                &mut self.ledger,
                &self.classifier,
                self.host.spatial.as_ref(),
                self.host.world.as_ref(),
            );
            report.topology_changes += 1;
            report.migrated_objects += outcome.migrated;
        }

        while let Some(event) = self.scheduler.pop_event() {
            report.events += 1;
            match event {
                EngineEvent::ObjectPlaced { object } => {
                    if let Some(notice) = self.on_object_placed(&object) {
                        report.notices.push(notice);
                    }
                }
                EngineEvent::ObjectRemoved { object } => self.on_object_removed(&object),
                EngineEvent::StructureMerged { absorbed, survivor } => {
                    self.on_structure_merged(absorbed, survivor)
                }
                EngineEvent::StructureSplit { original, created } => {
                    self.on_structure_split(original, created)
                }
                EngineEvent::PlayerConnected { player } => self.on_player_connected(player),
                EngineEvent::PermissionChanged { change } => {
                    self.on_permission_changed(&change);
                }
            }
        }
        report
    }

    /// Gate called before the host materializes `placement`. Anything but `Allowed` must
    /// stop the placement.
    pub fn can_place(&mut self, player: PlayerId, placement: &PendingPlacement) -> Decision {
        if !self.enabled || !player.is_valid() {
            return Decision::Allowed;
        }
        let Some(category) = self.classifier.resolve_category(placement.type_id) else {
            return Decision::Allowed;
        };
        let structure = topology::building_id_for_placement(self.host.spatial.as_ref(), placement);
        ensure_record(
            &mut self.counters,
            &self.resolver,
            self.host.permissions.as_ref(),
            player,
        );
        let Some(record) = self.counters.player(player) else {
            return Decision::Allowed;
        };

        let decision = evaluator::evaluate(&self.counters, record, category, structure);
        if !decision.is_allowed() {
            log::debug!("{player} denied {}: {decision:?}", self.classifier.label(category));
            return decision;
        }

        let Some(profile) = record.profile.as_deref() else {
            return decision;
        };
        let Some(target) = structure.filter(|id| self.counters.structure(*id).is_some()) else {
            return decision;
        };
        if record.immune
            || !profile.merge_guard
            || !self.classifier.is_structural(placement.type_id)
        {
            return decision;
        }
        match merge::simulate_merge(
            &self.counters,
            self.host.spatial.as_ref(),
            profile,
            placement,
            target,
        ) {
            Some(conflict) => {
                log::debug!("{player} denied merge into {target}: {conflict:?}");
                conflict.into()
            }
            None => decision,
        }
    }

    /// Read-only decision for one more object of `category`, without the merge guard.
    pub fn evaluate(
        &self,
        player: PlayerId,
        category: CategoryId,
        structure: Option<StructureId>,
    ) -> Decision {
        let record = self.record_or_probe(player);
        evaluator::evaluate(&self.counters, &record, category, structure)
    }

    /// Whether `placement` would push `target` over the player's structure quota once the
    /// adjacent structures merge into it. Touches neither counters nor ledger.
    pub fn would_merge_exceed_limit(
        &self,
        placement: &PendingPlacement,
        player: PlayerId,
        target: StructureId,
    ) -> bool {
        let record = self.record_or_probe(player);
        if record.immune {
            return false;
        }
        let Some(profile) = record.profile.as_deref() else {
            return false;
        };
        merge::would_merge_exceed_limit(
            &self.counters,
            self.host.spatial.as_ref(),
            profile,
            placement,
            target,
        )
    }

    pub fn owner_of_structure(&self, structure: StructureId) -> Option<PlayerId> {
        self.ledger.owner_of(structure)
    }

    pub fn owner_of_object(&self, object: ObjectId) -> Option<PlayerId> {
        let object = self.host.world.find(object)?;
        let structure = topology::building_id_for_object(self.host.spatial.as_ref(), &object)?;
        self.ledger.owner_of(structure)
    }

    pub fn owner_of_position(&self, position: Position) -> Option<PlayerId> {
        let structure = topology::building_id_for_position(self.host.spatial.as_ref(), position)?;
        self.ledger.owner_of(structure)
    }

    /// Gives `objects` to `new_owner` in one step. Returns the non-structural objects that did
    /// not fit and stay with their previous owner. A structural object that does not fit
    /// aborts the whole transfer and nothing changes.
    pub fn transfer_ownership(
        &mut self,
        objects: &[ObjectId],
        new_owner: PlayerId,
    ) -> Result<BTreeSet<ObjectId>, KernelError> {
        if !new_owner.is_valid() {
            return Err(TransferError::InvalidOwner(new_owner).into());
        }
        ensure_record(
            &mut self.counters,
            &self.resolver,
            self.host.permissions.as_ref(),
            new_owner,
        );
        let Some(owner) = self.counters.player(new_owner) else {
            return Err(TransferError::InvalidOwner(new_owner).into());
        };
        let plan = transfer::plan_transfer(
            &self.counters,
            &self.classifier,
            self.host.spatial.as_ref(),
            self.host.world.as_ref(),
            owner,
            objects,
        )?;

        let mut ledger = self.ledger.clone();
        for structure in &plan.structures {
            ledger.set_owner(*structure, new_owner);
        }
        self.commit_ledger(ledger)?;
        self.counters.bulk_adjust(plan.adjustments);
        log::debug!(
            "transferred {} objects to {new_owner}, {} rejected",
            plan.accepted.len(),
            plan.rejected.len()
        );
        Ok(plan.rejected)
    }

    /// Releases `objects` from their owners' quotas and clears the ownership of the structures
    /// they sit in. Returns the objects that were released; the host resets their owner.
    pub fn clear_ownership(&mut self, objects: &[ObjectId]) -> Result<Vec<ObjectId>, KernelError> {
        let mut batch = Vec::new();
        let mut cleared = Vec::new();
        let mut ledger = self.ledger.clone();
        for &id in objects {
            let Some(object) = self.host.world.find(id) else {
                continue;
            };
            if !object.owner.is_valid() || !self.counters.is_counted(id) {
                continue;
            }
            let Some(category) = self.classifier.resolve_category(object.type_id) else {
                continue;
            };
            let record = ensure_record(
                &mut self.counters,
                &self.resolver,
                self.host.permissions.as_ref(),
                object.owner,
            );
            if record.profile.is_none() || record.immune {
                continue;
            }
            batch.push(Adjustment::Player {
                player: object.owner,
                category,
                delta: -1,
            });
            batch.push(Adjustment::Release {
                category,
                objects: vec![id],
            });
            if let Some(structure) =
                topology::building_id_for_object(self.host.spatial.as_ref(), &object)
            {
                ledger.clear(structure);
            }
            cleared.push(id);
        }
        self.commit_ledger(ledger)?;
        self.counters.bulk_adjust(batch);
        log::debug!("cleared ownership of {} objects", cleared.len());
        Ok(cleared)
    }

    /// Usage against the player's tier, or `None` when nothing limits them.
    pub fn limits_report(&self, player: PlayerId) -> Option<LimitsReport> {
        if !player.is_valid() {
            return None;
        }
        LimitsReport::for_player(&self.record_or_probe(player), &self.classifier)
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.counters.player(id)
    }

    pub fn structure(&self, id: StructureId) -> Option<&StructureRecord> {
        self.counters.structure(id)
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    pub fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    pub fn classifier(&self) -> &ObjectClassifier {
        &self.classifier
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    pub fn pending_topology(&self) -> usize {
        self.scheduler.pending_topology()
    }

    fn accepting(&self, what: &str) -> bool {
        if !self.enabled {
            log::debug!("{what} before start; ignored");
        }
        self.enabled
    }

    /// Counts one live object against its owner and structure, recording the structure owner
    /// when it has none yet.
    fn count_placement(&mut self, object: &WorldObject) -> Option<(CategoryId, Option<StructureId>)> {
        if !object.owner.is_valid() {
            return None;
        }
        let category = self.classifier.resolve_category(object.type_id)?;
        let structure = topology::building_id_for_object(self.host.spatial.as_ref(), object);
        if object.decay_element {
            if let Some(structure) = structure {
                if self.ledger.owner_of(structure).is_none() {
                    self.ledger.set_owner(structure, object.owner);
                    log::debug!("structure {structure} now owned by {}", object.owner);
                }
            }
        }
        ensure_record(
            &mut self.counters,
            &self.resolver,
            self.host.permissions.as_ref(),
            object.owner,
        );
        self.counters
            .record_placement(object.owner, structure, category, object.id)
            .then_some((category, structure))
    }

    fn notice_for(
        &self,
        player: PlayerId,
        category: CategoryId,
        structure: Option<StructureId>,
    ) -> Option<ThresholdNotice> {
        let notifications = &self.config.notifications;
        if !notifications.enabled() {
            return None;
        }
        let record = self.counters.player(player)?;
        evaluator::threshold_notice(
            &self.counters,
            record,
            category,
            structure,
            notifications.warn_percent,
        )
    }

    /// Persists `ledger` if it changed and only then makes it current, so a failed save leaves
    /// the engine as it was.
    fn commit_ledger(&mut self, mut ledger: OwnershipLedger) -> Result<(), KernelError> {
        if ledger.is_dirty() {
            ledger.save(self.host.store.as_ref())?;
        }
        self.ledger = ledger;
        Ok(())
    }

    /// The stored record, or a freshly resolved one that is not kept.
    fn record_or_probe(&self, player: PlayerId) -> Cow<'_, PlayerRecord> {
        match self.counters.player(player) {
            Some(record) => Cow::Borrowed(record),
            None => {
                let oracle = self.host.permissions.as_ref();
                Cow::Owned(PlayerRecord::new(
                    player,
                    self.resolver.resolve(oracle, player),
                    self.resolver.is_immune(oracle, player),
                ))
            }
        }
    }
}

fn build_tables(
    types: &[TrackableType],
    config: &LimitsConfig,
) -> (ObjectClassifier, PermissionResolver, Vec<ConfigIssue>) {
    let (classifier, mut issues) = ObjectClassifier::build(types, config);
    let (resolver, tier_issues) = PermissionResolver::build(config, &classifier);
    issues.extend(tier_issues);
    (classifier, resolver, issues)
}

fn ensure_record<'a>(
    counters: &'a mut CounterStore,
    resolver: &PermissionResolver,
    oracle: &dyn PermissionOracle,
    player: PlayerId,
) -> &'a mut PlayerRecord {
    counters.ensure_player(player, || {
        PlayerRecord::new(
            player,
            resolver.resolve(oracle, player),
            resolver.is_immune(oracle, player),
        )
    })
}
