//! Shared fixtures for the engine integration tests.
//!
//! Each integration test compiles this module separately, so some helpers are unused in a
//! given test binary.

#![allow(dead_code)]

use indexmap::IndexMap;
use quota_kernel::config::{GroupConfig, LimitSetConfig, TierConfig};
use quota_kernel::engine::HostServices;
use quota_kernel::{
    LimitEngine, LimitsConfig, MemPermissions, MemWorld, ObjectId, ObjectTypeId, PlayerId,
    Position, StaticCatalog, StructureId, ThresholdNotice, TrackableType, WorldObject,
    WorldObjects,
};
use quota_store::MemStore;

pub const FOUNDATION: ObjectTypeId = ObjectTypeId(1);
pub const WALL: ObjectTypeId = ObjectTypeId(2);
pub const BOX: ObjectTypeId = ObjectTypeId(3);
pub const FURNACE: ObjectTypeId = ObjectTypeId(4);
pub const LARGE_FURNACE: ObjectTypeId = ObjectTypeId(5);
pub const SIGN: ObjectTypeId = ObjectTypeId(6);

pub const ALICE: PlayerId = PlayerId(76561198000000001);
pub const BOB: PlayerId = PlayerId(76561198000000002);

pub fn catalog() -> StaticCatalog {
    let ty = |id: ObjectTypeId, name: &str, structural: bool| TrackableType {
        type_id: id,
        structural,
        short_name: name.into(),
        full_name: Some(format!("assets/prefabs/{name}.prefab")),
    };
    StaticCatalog(vec![
        ty(FOUNDATION, "foundation", true),
        ty(WALL, "wall", true),
        ty(BOX, "box", false),
        ty(FURNACE, "furnace", false),
        ty(LARGE_FURNACE, "furnace.large", false),
        ty(SIGN, "sign", false),
    ])
}

pub fn tier(permission: &str, priority: Option<i32>, global: u32, structure: u32) -> TierConfig {
    TierConfig {
        permission: permission.into(),
        priority,
        global: LimitSetConfig {
            total: global,
            categories: IndexMap::new(),
        },
        structure: LimitSetConfig {
            total: structure,
            categories: IndexMap::new(),
        },
        merge_guard: false,
    }
}

pub fn config(tiers: Vec<TierConfig>) -> LimitsConfig {
    LimitsConfig {
        excluded: vec!["sign".into()],
        groups: vec![GroupConfig {
            name: "Heat".into(),
            members: vec!["furnace".into(), "furnace.large".into()],
        }],
        tiers,
        ..LimitsConfig::default()
    }
}

pub fn block(id: u64, owner: PlayerId, structure: u32, x: f32) -> WorldObject {
    WorldObject {
        id: ObjectId(id),
        type_id: FOUNDATION,
        owner,
        position: Position::new(x, 0.0, 0.0),
        structure: Some(StructureId(structure)),
        structural: true,
        decay_element: true,
    }
}

pub fn item(id: u64, owner: PlayerId, type_id: ObjectTypeId, x: f32) -> WorldObject {
    WorldObject {
        id: ObjectId(id),
        type_id,
        owner,
        position: Position::new(x, 0.0, 0.0),
        structure: None,
        structural: false,
        decay_element: false,
    }
}

/// An engine wired to in-memory host fakes that the test keeps handles to.
pub struct Harness {
    pub perms: MemPermissions,
    pub world: MemWorld,
    pub store: MemStore,
    pub engine: LimitEngine,
}

impl Harness {
    pub fn new(config: LimitsConfig) -> Self {
        Self::with_world(config, MemWorld::new(), MemStore::new())
    }

    pub fn with_world(config: LimitsConfig, world: MemWorld, store: MemStore) -> Self {
        let perms = MemPermissions::new();
        let host = HostServices::in_memory(&perms, &world, &store);
        let engine = LimitEngine::new(config, &catalog(), host);
        Self {
            perms,
            world,
            store,
            engine,
        }
    }

    /// Grants a permission and lets the engine re-resolve the player.
    pub fn grant(&mut self, player: PlayerId, permission: &str) {
        self.perms.grant_user(player, permission);
        self.engine.invalidate(player);
    }

    pub fn start(mut self) -> Self {
        self.engine.start().unwrap();
        self
    }

    /// Spawns the object in the world, then reports it to the engine.
    pub fn place(&mut self, object: WorldObject) -> Option<ThresholdNotice> {
        self.world.spawn(object.clone());
        self.engine.on_object_placed(&object)
    }

    /// Reports the removal while the object still exists, then despawns it.
    pub fn remove(&mut self, id: u64) {
        if let Some(object) = self.world.find(ObjectId(id)) {
            self.engine.on_object_removed(&object);
            self.world.despawn(object.id);
        }
    }

    pub fn total(&self, player: PlayerId) -> u32 {
        self.engine
            .player(player)
            .map_or(0, |record| record.counters.total)
    }
}
