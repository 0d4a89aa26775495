//! Placement quota engine: classifies placed objects, resolves permission tiers, keeps live
//! per-player and per-structure counters, and gates new placements against them.

pub mod classifier;
pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod ids;
pub mod ledger;
pub mod memory;
pub mod merge;
pub mod permissions;
pub mod report;
pub mod scheduler;
pub mod topology;
pub mod transfer;

pub use classifier::{ConfigIssue, ObjectClassifier};
pub use config::{LimitsConfig, LogLevel};
pub use counters::{Adjustment, CounterStore, PlayerRecord, StructureRecord};
pub use engine::{EngineEvent, HostServices, LimitEngine, RebuildSummary, TickReport};
pub use error::KernelError;
pub use evaluator::{Decision, LimitScope, ThresholdNotice};
pub use host::{
    ObjectCatalog, PendingPlacement, PermissionOracle, PlacementAnchor, Position, SpatialIndex,
    StaticCatalog, TrackableType, WorldObject, WorldObjects,
};
pub use ids::{CategoryId, ObjectId, ObjectTypeId, PlayerId, StructureId};
pub use ledger::OwnershipLedger;
pub use memory::{MemPermissions, MemWorld};
pub use merge::{MergeConflict, MergeConflictKind};
pub use permissions::{PermissionChange, PermissionResolver, QuotaProfile};
pub use report::LimitsReport;
pub use transfer::TransferError;
