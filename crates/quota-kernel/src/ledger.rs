//! Durable structure → owner map that survives structure id churn.

use std::collections::BTreeMap;

use quota_store::{PersistenceStore, StoreError, load_json, save_json};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::host::WorldObjects;
use crate::ids::{PlayerId, StructureId};

pub const LEDGER_KEY: &str = "ownership-ledger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerEntry {
    structure: StructureId,
    owner: PlayerId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerBlob {
    entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipLedger {
    owners: BTreeMap<StructureId, PlayerId>,
    dirty: bool,
}

impl OwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, structure: StructureId) -> Option<PlayerId> {
        self.owners.get(&structure).copied()
    }

    /// Ignores the `0` structure and invalid owners.
    pub fn set_owner(&mut self, structure: StructureId, owner: PlayerId) {
        if !structure.is_some() || !owner.is_valid() {
            return;
        }
        if self.owners.insert(structure, owner) != Some(owner) {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self, structure: StructureId) -> Option<PlayerId> {
        let previous = self.owners.remove(&structure);
        if previous.is_some() {
            self.dirty = true;
        }
        previous
    }

    pub fn entries(&self) -> impl Iterator<Item = (StructureId, PlayerId)> + '_ {
        self.owners.iter().map(|(structure, owner)| (*structure, *owner))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// True when there are changes not yet written with [`save`](Self::save).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reads the persisted ledger. A blob that no longer decodes is dropped with a warning
    /// and an empty ledger is returned in its place.
    pub fn load(store: &dyn PersistenceStore) -> Result<Self, KernelError> {
        let blob = match load_json::<LedgerBlob>(store, LEDGER_KEY) {
            Ok(blob) => blob.unwrap_or_default(),
            Err(StoreError::Json { source, .. }) => {
                log::warn!("ownership ledger is corrupt and will be rebuilt: {source}");
                LedgerBlob::default()
            }
            Err(err) => return Err(err.into()),
        };
        let mut ledger = Self::new();
        for entry in blob.entries {
            ledger.set_owner(entry.structure, entry.owner);
        }
        ledger.dirty = false;
        Ok(ledger)
    }

    pub fn save(&mut self, store: &dyn PersistenceStore) -> Result<(), KernelError> {
        let blob = LedgerBlob {
            entries: self
                .entries()
                .map(|(structure, owner)| LedgerEntry { structure, owner })
                .collect(),
        };
        save_json(store, LEDGER_KEY, &blob)?;
        self.dirty = false;
        log::debug!("saved ownership ledger ({} entries)", self.owners.len());
        Ok(())
    }

    /// Drops entries for structures that no longer exist. Returns how many were removed.
    pub fn prune(&mut self, exists: impl Fn(StructureId) -> bool) -> usize {
        let before = self.owners.len();
        self.owners.retain(|structure, _| exists(*structure));
        let removed = before - self.owners.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Fills the ledger from the world: each structure is owned by whoever owns its oldest
    /// decay element (lowest object id) with a valid owner.
    pub fn bootstrap(&mut self, world: &dyn WorldObjects) -> usize {
        let mut added = 0;
        for structure in world.structure_ids() {
            let owner = world
                .decay_elements(structure)
                .into_iter()
                .filter(|element| element.owner.is_valid())
                .min_by_key(|element| element.id)
                .map(|element| element.owner);
            if let Some(owner) = owner {
                self.set_owner(structure, owner);
                added += 1;
            }
        }
        added
    }
}
