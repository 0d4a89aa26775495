use serde::Serialize;

use crate::classifier::ObjectClassifier;
use crate::counters::PlayerRecord;
use crate::ids::{CategoryId, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub category: CategoryId,
    pub name: String,
    /// Current count for global scopes; absent for per-structure caps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalUsage {
    pub count: u32,
    pub limit: u32,
    pub categories: Vec<CategoryUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureLimits {
    pub limit: u32,
    pub categories: Vec<CategoryUsage>,
}

/// What a player may still build, for rendering by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitsReport {
    pub player: PlayerId,
    pub permission: String,
    pub global: GlobalUsage,
    pub structure: StructureLimits,
}

impl LimitsReport {
    /// `None` for immune players and players without a profile.
    pub fn for_player(record: &PlayerRecord, classifier: &ObjectClassifier) -> Option<Self> {
        if record.immune {
            return None;
        }
        let profile = record.profile.as_deref()?;
        let global = GlobalUsage {
            count: record.counters.total,
            limit: profile.global.total,
            categories: profile
                .global
                .categories
                .iter()
                .map(|(category, limit)| CategoryUsage {
                    category: *category,
                    name: classifier.label(*category),
                    count: Some(record.counters.count(*category)),
                    limit: *limit,
                })
                .collect(),
        };
        let structure = StructureLimits {
            limit: profile.structure.total,
            categories: profile
                .structure
                .categories
                .iter()
                .map(|(category, limit)| CategoryUsage {
                    category: *category,
                    name: classifier.label(*category),
                    count: None,
                    limit: *limit,
                })
                .collect(),
        };
        Some(Self {
            player: record.id,
            permission: profile.permission.clone(),
            global,
            structure,
        })
    }
}
