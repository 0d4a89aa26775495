//! In-memory host capabilities for tests, the CLI replay command and embedders without a
//! live simulation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::host::{
    BoundingVolume, PendingPlacement, PermissionOracle, ProbeHandle, SpatialIndex,
    StructuralElementRef, WorldObject, WorldObjects,
};
use crate::ids::{ObjectId, ObjectTypeId, PlayerId, StructureId};

/// Probe half-extent magnitude used for types without an explicit extent.
pub const DEFAULT_PROBE_EXTENT: f32 = 1.5;

#[derive(Debug, Default)]
struct PermissionState {
    users: HashMap<PlayerId, BTreeSet<String>>,
    memberships: HashMap<PlayerId, BTreeSet<String>>,
    groups: HashMap<String, BTreeSet<String>>,
}

/// Permission oracle backed by plain maps. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemPermissions {
    state: Arc<RwLock<PermissionState>>,
}

impl MemPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_user(&self, player: PlayerId, permission: &str) {
        self.write()
            .users
            .entry(player)
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke_user(&self, player: PlayerId, permission: &str) {
        if let Some(set) = self.write().users.get_mut(&player) {
            set.remove(permission);
        }
    }

    pub fn add_to_group(&self, player: PlayerId, group: &str) {
        self.write()
            .memberships
            .entry(player)
            .or_default()
            .insert(group.to_string());
    }

    pub fn remove_from_group(&self, player: PlayerId, group: &str) {
        if let Some(set) = self.write().memberships.get_mut(&player) {
            set.remove(group);
        }
    }

    pub fn grant_group(&self, group: &str, permission: &str) {
        self.write()
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke_group(&self, group: &str, permission: &str) {
        if let Some(set) = self.write().groups.get_mut(group) {
            set.remove(permission);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PermissionState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PermissionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PermissionOracle for MemPermissions {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool {
        let state = self.read();
        if state
            .users
            .get(&player)
            .is_some_and(|set| set.contains(permission))
        {
            return true;
        }
        state.memberships.get(&player).is_some_and(|groups| {
            groups.iter().any(|group| {
                state
                    .groups
                    .get(group)
                    .is_some_and(|set| set.contains(permission))
            })
        })
    }

    fn members_of_group(&self, group: &str) -> Vec<PlayerId> {
        let state = self.read();
        let mut members: Vec<PlayerId> = state
            .memberships
            .iter()
            .filter(|(_, groups)| groups.contains(group))
            .map(|(player, _)| *player)
            .collect();
        members.sort();
        members
    }

    fn group_has_permission(&self, group: &str, permission: &str) -> bool {
        self.read()
            .groups
            .get(group)
            .is_some_and(|set| set.contains(permission))
    }
}

#[derive(Debug, Default)]
struct WorldState {
    objects: BTreeMap<ObjectId, (WorldObject, u64)>,
    next_order: u64,
    extents: HashMap<ObjectTypeId, f32>,
    probes: HashMap<u64, BoundingVolume>,
    next_probe: u64,
}

/// A flat list of live objects standing in for the host world. Spatial queries scan every
/// structural object, which is fine at test scale. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemWorld {
    state: Arc<RwLock<WorldState>>,
}

impl MemWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object. Replacing keeps the original creation order.
    pub fn spawn(&self, object: WorldObject) {
        let mut state = self.write();
        let order = match state.objects.get(&object.id) {
            Some((_, order)) => *order,
            None => {
                state.next_order += 1;
                state.next_order
            }
        };
        state.objects.insert(object.id, (object, order));
    }

    pub fn despawn(&self, id: ObjectId) -> Option<WorldObject> {
        self.write().objects.remove(&id).map(|(object, _)| object)
    }

    pub fn set_structure(&self, id: ObjectId, structure: Option<StructureId>) -> bool {
        match self.write().objects.get_mut(&id) {
            Some((object, _)) => {
                object.structure = structure;
                true
            }
            None => false,
        }
    }

    pub fn set_owner(&self, id: ObjectId, owner: PlayerId) -> bool {
        match self.write().objects.get_mut(&id) {
            Some((object, _)) => {
                object.owner = owner;
                true
            }
            None => false,
        }
    }

    /// Moves every object of `from` into `to`, the way the host remaps ids on a merge.
    pub fn reassign_structure(&self, from: StructureId, to: StructureId) -> Vec<ObjectId> {
        let mut moved = Vec::new();
        for (object, _) in self.write().objects.values_mut() {
            if object.structure == Some(from) {
                object.structure = Some(to);
                moved.push(object.id);
            }
        }
        moved
    }

    pub fn set_type_extent(&self, type_id: ObjectTypeId, extent: f32) {
        self.write().extents.insert(type_id, extent);
    }

    /// Probes materialized and not yet discarded.
    pub fn live_probes(&self) -> usize {
        self.read().probes.len()
    }

    pub fn len(&self) -> usize {
        self.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpatialIndex for MemWorld {
    fn query_near(
        &self,
        position: crate::host::Position,
        radius: f32,
    ) -> Vec<StructuralElementRef> {
        let state = self.read();
        let mut hits: Vec<StructuralElementRef> = state
            .objects
            .values()
            .filter(|(object, _)| object.structural && object.position.distance(&position) <= radius)
            .filter_map(|(object, order)| {
                let structure = object.structure?.non_zero()?;
                Some(StructuralElementRef {
                    object: object.id,
                    structure,
                    creation_order: *order,
                })
            })
            .collect();
        hits.sort_by_key(|hit| hit.creation_order);
        hits
    }

    fn materialize_probe(&self, placement: &PendingPlacement) -> Option<ProbeHandle> {
        let mut state = self.write();
        let extent = state
            .extents
            .get(&placement.type_id)
            .copied()
            .unwrap_or(DEFAULT_PROBE_EXTENT);
        state.next_probe += 1;
        let handle = state.next_probe;
        state.probes.insert(
            handle,
            BoundingVolume {
                center: placement.position,
                extent,
            },
        );
        Some(ProbeHandle(handle))
    }

    fn probe_bounds(&self, probe: ProbeHandle) -> BoundingVolume {
        self.read()
            .probes
            .get(&probe.0)
            .copied()
            .unwrap_or(BoundingVolume {
                center: crate::host::Position::default(),
                extent: 0.0,
            })
    }

    fn discard_probe(&self, probe: ProbeHandle) {
        self.write().probes.remove(&probe.0);
    }
}

impl WorldObjects for MemWorld {
    fn find(&self, id: ObjectId) -> Option<WorldObject> {
        self.read().objects.get(&id).map(|(object, _)| object.clone())
    }

    fn live_objects(&self) -> Vec<WorldObject> {
        self.read()
            .objects
            .values()
            .map(|(object, _)| object.clone())
            .collect()
    }

    fn structure_ids(&self) -> Vec<StructureId> {
        let ids: BTreeSet<StructureId> = self
            .read()
            .objects
            .values()
            .filter_map(|(object, _)| object.structure?.non_zero())
            .collect();
        ids.into_iter().collect()
    }

    fn structure_exists(&self, id: StructureId) -> bool {
        id.is_some()
            && self
                .read()
                .objects
                .values()
                .any(|(object, _)| object.structure == Some(id))
    }

    fn decay_elements(&self, id: StructureId) -> Vec<WorldObject> {
        self.read()
            .objects
            .values()
            .filter(|(object, _)| object.decay_element && object.structure == Some(id))
            .map(|(object, _)| object.clone())
            .collect()
    }
}
