//! `quota replay` command: drive the engine through a scripted session.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use quota_kernel::engine::HostServices;
use quota_kernel::{
    KernelError, LimitEngine, LimitsConfig, MemPermissions, MemWorld, ObjectId, PendingPlacement,
    PermissionChange, PlayerId, Position, StaticCatalog, StructureId, WorldObject, WorldObjects,
};
use quota_store::{DynStore, FsStore, MemStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::input::read_json;
use crate::opts::{GlobalOpts, setup_logging};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Persist the ownership ledger under this directory instead of in memory
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Scenario {
    #[serde(default)]
    config: LimitsConfig,
    catalog: StaticCatalog,
    #[serde(default)]
    players: Vec<PlayerGrants>,
    /// Group name to the permissions it grants.
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
    /// Objects that exist before the session starts.
    #[serde(default)]
    objects: Vec<WorldObject>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct PlayerGrants {
    player: PlayerId,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Place {
        object: WorldObject,
    },
    Remove {
        object: ObjectId,
    },
    /// The host remaps `absorbed` into `survivor`, then reports the merge.
    Merge {
        absorbed: StructureId,
        survivor: StructureId,
    },
    /// The host moves `objects` from `original` into `created`, then reports the split.
    Split {
        original: StructureId,
        created: StructureId,
        objects: Vec<ObjectId>,
    },
    Connect {
        player: PlayerId,
    },
    Grant {
        player: PlayerId,
        permission: String,
    },
    Revoke {
        player: PlayerId,
        permission: String,
    },
    Tick,
    CanPlace {
        player: PlayerId,
        placement: PendingPlacement,
    },
    Owner {
        #[serde(default)]
        structure: Option<StructureId>,
        #[serde(default)]
        object: Option<ObjectId>,
        #[serde(default)]
        position: Option<Position>,
    },
    Transfer {
        objects: Vec<ObjectId>,
        owner: PlayerId,
    },
    Clear {
        objects: Vec<ObjectId>,
    },
    Limits {
        player: PlayerId,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Place { .. } => "place",
            Step::Remove { .. } => "remove",
            Step::Merge { .. } => "merge",
            Step::Split { .. } => "split",
            Step::Connect { .. } => "connect",
            Step::Grant { .. } => "grant",
            Step::Revoke { .. } => "revoke",
            Step::Tick => "tick",
            Step::CanPlace { .. } => "can_place",
            Step::Owner { .. } => "owner",
            Step::Transfer { .. } => "transfer",
            Step::Clear { .. } => "clear",
            Step::Limits { .. } => "limits",
        }
    }
}

struct Session {
    perms: MemPermissions,
    world: MemWorld,
    engine: LimitEngine,
}

pub fn cmd_replay(opts: &GlobalOpts, args: &ReplayArgs) -> Result<()> {
    let scenario: Scenario = read_json(&args.scenario, "scenario")?;
    setup_logging(opts, scenario.config.log_level);

    let store: DynStore = match &args.store {
        Some(dir) => Arc::new(
            FsStore::open(dir).with_context(|| format!("open store {}", dir.display()))?,
        ),
        None => Arc::new(MemStore::new()),
    };
    let perms = MemPermissions::new();
    for (group, permissions) in &scenario.groups {
        for permission in permissions {
            perms.grant_group(group, permission);
        }
    }
    for grants in &scenario.players {
        for permission in &grants.permissions {
            perms.grant_user(grants.player, permission);
        }
        for group in &grants.groups {
            perms.add_to_group(grants.player, group);
        }
    }
    let world = MemWorld::new();
    for object in scenario.objects {
        world.spawn(object);
    }

    let host = HostServices {
        permissions: Arc::new(perms.clone()),
        spatial: Arc::new(world.clone()),
        world: Arc::new(world.clone()),
        store,
    };
    let mut engine = LimitEngine::new(scenario.config, &scenario.catalog, host);
    let warnings: Vec<String> = engine.issues().iter().map(ToString::to_string).collect();
    let summary = engine.start().context("start engine")?;
    tracing::info!(
        objects = summary.objects,
        players = summary.players,
        "replay session started"
    );

    let mut session = Session {
        perms,
        world,
        engine,
    };
    let mut results = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let op = step.name();
        let result = session
            .apply(step)
            .with_context(|| format!("step {index} ({op})"))?;
        results.push(json!({ "step": index, "op": op, "result": result }));
    }
    session.engine.shutdown().context("shut down engine")?;

    if opts.wants_json() {
        print_success(
            opts,
            json!({ "start": summary, "steps": results }),
            warnings,
        )
    } else {
        let mut lines = vec![serde_json::to_string(&json!({ "start": summary }))?];
        for result in &results {
            lines.push(serde_json::to_string(result)?);
        }
        print_success(opts, Value::String(lines.join("\n")), warnings)
    }
}

impl Session {
    fn apply(&mut self, step: Step) -> Result<Value> {
        let value = match step {
            Step::Place { object } => {
                self.world.spawn(object.clone());
                let notice = self.engine.on_object_placed(&object);
                json!({ "notice": notice })
            }
            Step::Remove { object } => match self.world.find(object) {
                Some(found) => {
                    self.engine.on_object_removed(&found);
                    self.world.despawn(object);
                    json!({ "removed": true })
                }
                None => json!({ "removed": false }),
            },
            Step::Merge { absorbed, survivor } => {
                let moved = self.world.reassign_structure(absorbed, survivor);
                self.engine.on_structure_merged(absorbed, survivor);
                json!({ "remapped": moved.len() })
            }
            Step::Split {
                original,
                created,
                objects,
            } => {
                for object in &objects {
                    self.world.set_structure(*object, Some(created));
                }
                self.engine.on_structure_split(original, created);
                json!({ "remapped": objects.len() })
            }
            Step::Connect { player } => {
                self.engine.on_player_connected(player);
                json!({ "player": player })
            }
            Step::Grant { player, permission } => {
                self.perms.grant_user(player, &permission);
                self.permission_changed(player, permission)
            }
            Step::Revoke { player, permission } => {
                self.perms.revoke_user(player, &permission);
                self.permission_changed(player, permission)
            }
            Step::Tick => serde_json::to_value(self.engine.tick())?,
            Step::CanPlace { player, placement } => {
                serde_json::to_value(self.engine.can_place(player, &placement))?
            }
            Step::Owner {
                structure,
                object,
                position,
            } => {
                let owner = if let Some(structure) = structure {
                    self.engine.owner_of_structure(structure)
                } else if let Some(object) = object {
                    self.engine.owner_of_object(object)
                } else if let Some(position) = position {
                    self.engine.owner_of_position(position)
                } else {
                    None
                };
                json!({ "owner": owner })
            }
            Step::Transfer { objects, owner } => {
                match self.engine.transfer_ownership(&objects, owner) {
                    Ok(rejected) => {
                        for object in objects.iter().filter(|id| !rejected.contains(id)) {
                            self.world.set_owner(*object, owner);
                        }
                        json!({ "rejected": rejected })
                    }
                    Err(KernelError::Transfer(err)) => json!({ "aborted": err.to_string() }),
                    Err(err) => return Err(err.into()),
                }
            }
            Step::Clear { objects } => {
                let cleared = self.engine.clear_ownership(&objects)?;
                for object in &cleared {
                    self.world.set_owner(*object, PlayerId::NONE);
                }
                json!({ "cleared": cleared })
            }
            Step::Limits { player } => json!({ "limits": self.engine.limits_report(player) }),
        };
        Ok(value)
    }

    fn permission_changed(&mut self, player: PlayerId, permission: String) -> Value {
        let affected = self
            .engine
            .on_permission_changed(&PermissionChange::UserPermission { player, permission });
        json!({ "reresolved": affected })
    }
}
