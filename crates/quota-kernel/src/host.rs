//! Capabilities the engine consumes from the host simulation.
//!
//! The engine never inspects the world directly. Permission membership, spatial lookups,
//! object enumeration and the transient placement probe all come through these traits so a
//! host (or a test) can supply its own implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{ObjectId, ObjectTypeId, PlayerId, StructureId};

pub type SharedPermissionOracle = Arc<dyn PermissionOracle>;
pub type SharedSpatialIndex = Arc<dyn SpatialIndex>;
pub type SharedWorldObjects = Arc<dyn WorldObjects>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// World-space bounds of a probe: a center and the magnitude of its half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub center: Position,
    pub extent: f32,
}

/// One structural element returned by a spatial query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralElementRef {
    pub object: ObjectId,
    pub structure: StructureId,
    /// Monotonic creation order; lower is older.
    pub creation_order: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackableType {
    pub type_id: ObjectTypeId,
    /// Structural elements make up the structure itself and cannot be split off it.
    #[serde(default)]
    pub structural: bool,
    pub short_name: String,
    /// Full asset path, when the host has one; config entries may use either name.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// A live object as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: ObjectId,
    pub type_id: ObjectTypeId,
    pub owner: PlayerId,
    pub position: Position,
    /// Structure the object itself belongs to, when it is a decay-linked element.
    #[serde(default)]
    pub structure: Option<StructureId>,
    #[serde(default)]
    pub structural: bool,
    #[serde(default)]
    pub decay_element: bool,
}

/// What the placement is attached to, if anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementAnchor {
    pub object: ObjectId,
    /// Set when the anchor is itself a decay-linked element with a known structure id.
    #[serde(default)]
    pub structure: Option<StructureId>,
    /// World position of the socket the placement snaps to.
    #[serde(default)]
    pub socket: Option<Position>,
}

/// An object the player is about to place; nothing exists in the world yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPlacement {
    pub type_id: ObjectTypeId,
    pub position: Position,
    /// Orientation quaternion `[x, y, z, w]`.
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub anchor: Option<PlacementAnchor>,
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl PendingPlacement {
    pub fn at(type_id: ObjectTypeId, position: Position) -> Self {
        Self {
            type_id,
            position,
            rotation: identity_rotation(),
            anchor: None,
        }
    }

    pub fn anchored(mut self, anchor: PlacementAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Opaque handle to a transient probe object created by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeHandle(pub u64);

pub trait PermissionOracle: Send + Sync {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool;
    fn members_of_group(&self, group: &str) -> Vec<PlayerId>;
    fn group_has_permission(&self, group: &str, permission: &str) -> bool;
}

pub trait ObjectCatalog {
    fn enumerate_trackable_types(&self) -> Vec<TrackableType>;
}

pub trait SpatialIndex: Send + Sync {
    /// All structural elements within `radius` of `position`.
    fn query_near(&self, position: Position, radius: f32) -> Vec<StructuralElementRef>;

    /// Materialize a non-persisted probe for `placement` at its intended position and
    /// orientation. Returns `None` when the host cannot build one for this type.
    fn materialize_probe(&self, placement: &PendingPlacement) -> Option<ProbeHandle>;

    fn probe_bounds(&self, probe: ProbeHandle) -> BoundingVolume;

    fn discard_probe(&self, probe: ProbeHandle);
}

pub trait WorldObjects: Send + Sync {
    fn find(&self, id: ObjectId) -> Option<WorldObject>;
    /// Every live object, for the startup rebuild.
    fn live_objects(&self) -> Vec<WorldObject>;
    fn structure_ids(&self) -> Vec<StructureId>;
    fn structure_exists(&self, id: StructureId) -> bool;
    fn decay_elements(&self, id: StructureId) -> Vec<WorldObject>;
}

/// Fixed list of trackable types, typically deserialized from a JSON catalog dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog(pub Vec<TrackableType>);

impl ObjectCatalog for StaticCatalog {
    fn enumerate_trackable_types(&self) -> Vec<TrackableType> {
        self.0.clone()
    }
}

/// Keeps a probe alive for the duration of one simulation and discards it on every exit path.
pub(crate) struct ProbeGuard<'a> {
    spatial: &'a dyn SpatialIndex,
    handle: Option<ProbeHandle>,
}

impl<'a> ProbeGuard<'a> {
    pub(crate) fn materialize(
        spatial: &'a dyn SpatialIndex,
        placement: &PendingPlacement,
    ) -> Option<Self> {
        let handle = spatial.materialize_probe(placement)?;
        Some(Self {
            spatial,
            handle: Some(handle),
        })
    }

    pub(crate) fn bounds(&self) -> Option<BoundingVolume> {
        self.handle.map(|handle| self.spatial.probe_bounds(handle))
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.spatial.discard_probe(handle);
        }
    }
}
