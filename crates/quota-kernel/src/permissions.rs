//! Permission tiers: which quota profile applies to a player.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::classifier::{ConfigIssue, LimitKeyError, ObjectClassifier};
use crate::config::{LimitSetConfig, LimitsConfig, TierConfig};
use crate::host::PermissionOracle;
use crate::ids::{CategoryId, PlayerId};

pub const PERMISSION_ADMIN: &str = "limitentities.admin";
pub const PERMISSION_IMMUNITY: &str = "limitentities.immunity";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimitSet {
    pub total: u32,
    pub categories: IndexMap<CategoryId, u32>,
}

impl LimitSet {
    pub fn category_cap(&self, category: CategoryId) -> Option<u32> {
        self.categories.get(&category).copied()
    }
}

/// The full set of limits granted by one permission tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaProfile {
    pub permission: String,
    pub priority: Option<i32>,
    pub global: LimitSet,
    pub structure: LimitSet,
    pub merge_guard: bool,
}

impl QuotaProfile {
    pub fn can_build(&self) -> bool {
        self.global.total != 0
    }
}

/// A membership change reported by the host's permission system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionChange {
    /// A permission was granted to or revoked from the player directly.
    UserPermission { player: PlayerId, permission: String },
    /// The player joined or left a group.
    UserGroup { player: PlayerId, group: String },
    /// A permission was granted to or revoked from a group.
    GroupPermission { group: String, permission: String },
    /// A group was created or deleted.
    Group { group: String },
}

#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    descending: Vec<Arc<QuotaProfile>>,
    registered: BTreeSet<String>,
}

impl PermissionResolver {
    pub fn build(
        config: &LimitsConfig,
        classifier: &ObjectClassifier,
    ) -> (Self, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut registered = BTreeSet::new();
        registered.insert(PERMISSION_IMMUNITY.to_string());
        let mut tiers = Vec::new();

        for (index, tier) in config.tiers.iter().enumerate() {
            if tier.permission.trim().is_empty() {
                issues.push(ConfigIssue::EmptyPermission { index });
                continue;
            }
            registered.insert(tier.permission.clone());
            tiers.push(Arc::new(build_profile(tier, classifier, &mut issues)));
        }

        // Stable: tiers with equal priority keep config order. `None` sorts below every `Some`.
        tiers.sort_by(|a, b| b.priority.cmp(&a.priority));

        for issue in &issues {
            issue.log();
        }
        (
            Self {
                descending: tiers,
                registered,
            },
            issues,
        )
    }

    /// Highest-priority tier whose permission the player holds.
    pub fn resolve(
        &self,
        oracle: &dyn PermissionOracle,
        player: PlayerId,
    ) -> Option<Arc<QuotaProfile>> {
        self.descending
            .iter()
            .find(|tier| oracle.has_permission(player, &tier.permission))
            .cloned()
    }

    pub fn is_immune(&self, oracle: &dyn PermissionOracle, player: PlayerId) -> bool {
        oracle.has_permission(player, PERMISSION_IMMUNITY)
    }

    pub fn is_registered(&self, permission: &str) -> bool {
        self.registered.contains(permission)
    }

    pub fn tiers(&self) -> &[Arc<QuotaProfile>] {
        &self.descending
    }

    /// Players whose effective profile may have changed.
    pub fn affected_players(
        &self,
        oracle: &dyn PermissionOracle,
        change: &PermissionChange,
    ) -> Vec<PlayerId> {
        match change {
            PermissionChange::UserPermission { player, permission } => {
                if self.is_registered(permission) {
                    vec![*player]
                } else {
                    Vec::new()
                }
            }
            PermissionChange::UserGroup { player, group } => {
                if self.group_grants_any(oracle, group) {
                    vec![*player]
                } else {
                    Vec::new()
                }
            }
            PermissionChange::GroupPermission { group, permission } => {
                if self.is_registered(permission) {
                    oracle.members_of_group(group)
                } else {
                    Vec::new()
                }
            }
            PermissionChange::Group { group } => {
                if self.group_grants_any(oracle, group) {
                    oracle.members_of_group(group)
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn group_grants_any(&self, oracle: &dyn PermissionOracle, group: &str) -> bool {
        self.registered
            .iter()
            .any(|permission| oracle.group_has_permission(group, permission))
    }
}

fn build_profile(
    tier: &TierConfig,
    classifier: &ObjectClassifier,
    issues: &mut Vec<ConfigIssue>,
) -> QuotaProfile {
    QuotaProfile {
        permission: tier.permission.clone(),
        priority: tier.priority,
        global: build_limit_set(&tier.permission, &tier.global, classifier, issues),
        structure: build_limit_set(&tier.permission, &tier.structure, classifier, issues),
        merge_guard: tier.merge_guard,
    }
}

fn build_limit_set(
    tier: &str,
    config: &LimitSetConfig,
    classifier: &ObjectClassifier,
    issues: &mut Vec<ConfigIssue>,
) -> LimitSet {
    let mut categories = IndexMap::new();
    for (name, cap) in &config.categories {
        match classifier.resolve_limit_key(name) {
            Ok(category) => {
                categories.insert(category, *cap);
            }
            Err(LimitKeyError::Grouped) => issues.push(ConfigIssue::GroupedTypeListedIndividually {
                tier: tier.to_string(),
                name: name.clone(),
            }),
            Err(LimitKeyError::Unknown) => issues.push(ConfigIssue::UnknownLimitEntry {
                tier: tier.to_string(),
                name: name.clone(),
            }),
        }
    }
    LimitSet {
        total: config.total,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::host::TrackableType;
    use crate::ids::ObjectTypeId;
    use crate::memory::MemPermissions;

    fn tier(permission: &str, priority: Option<i32>, total: u32) -> TierConfig {
        TierConfig {
            permission: permission.into(),
            priority,
            global: LimitSetConfig {
                total,
                categories: IndexMap::new(),
            },
            structure: LimitSetConfig::default(),
            merge_guard: false,
        }
    }

    fn resolver(tiers: Vec<TierConfig>) -> (PermissionResolver, Vec<ConfigIssue>) {
        let config = LimitsConfig {
            tiers,
            ..LimitsConfig::default()
        };
        let (classifier, _) = ObjectClassifier::build(&[], &config);
        PermissionResolver::build(&config, &classifier)
    }

    #[test]
    fn highest_priority_held_tier_wins() {
        let (resolver, _) = resolver(vec![tier("a", Some(10), 100), tier("b", Some(20), 200)]);
        let perms = MemPermissions::new();
        perms.grant_user(PlayerId(1), "a");
        perms.grant_user(PlayerId(1), "b");
        let profile = resolver.resolve(&perms, PlayerId(1)).unwrap();
        assert_eq!(profile.permission, "b");
        assert_eq!(profile.global.total, 200);
    }

    #[test]
    fn unprioritized_tier_never_beats_prioritized_one() {
        let (resolver, _) = resolver(vec![tier("loose", None, 1000), tier("low", Some(-5), 10)]);
        let perms = MemPermissions::new();
        perms.grant_user(PlayerId(1), "loose");
        perms.grant_user(PlayerId(1), "low");
        assert_eq!(resolver.resolve(&perms, PlayerId(1)).unwrap().permission, "low");

        perms.revoke_user(PlayerId(1), "low");
        assert_eq!(
            resolver.resolve(&perms, PlayerId(1)).unwrap().permission,
            "loose"
        );
    }

    #[test]
    fn no_matching_tier_resolves_none() {
        let (resolver, _) = resolver(vec![tier("a", Some(1), 10)]);
        assert!(resolver.resolve(&MemPermissions::new(), PlayerId(1)).is_none());
    }

    #[test]
    fn empty_permission_is_skipped() {
        let (resolver, issues) = resolver(vec![tier("  ", Some(1), 10), tier("a", Some(1), 10)]);
        assert_eq!(issues, vec![ConfigIssue::EmptyPermission { index: 0 }]);
        assert_eq!(resolver.tiers().len(), 1);
    }

    #[test]
    fn limit_keys_resolve_through_classifier() {
        let types = vec![
            TrackableType {
                type_id: ObjectTypeId(5),
                structural: false,
                short_name: "furnace".into(),
                full_name: None,
            },
            TrackableType {
                type_id: ObjectTypeId(6),
                structural: false,
                short_name: "box".into(),
                full_name: None,
            },
        ];
        let mut t = tier("a", Some(1), 100);
        t.global.categories.insert("Heat".into(), 2);
        t.global.categories.insert("box".into(), 3);
        t.global.categories.insert("furnace".into(), 9);
        t.structure.categories.insert("missing".into(), 1);
        let config = LimitsConfig {
            groups: vec![GroupConfig {
                name: "Heat".into(),
                members: vec!["furnace".into()],
            }],
            tiers: vec![t],
            ..LimitsConfig::default()
        };
        let (classifier, _) = ObjectClassifier::build(&types, &config);
        let (resolver, issues) = PermissionResolver::build(&config, &classifier);
        let profile = &resolver.tiers()[0];
        let heat = classifier.group_id("Heat").unwrap();
        assert_eq!(profile.global.category_cap(heat), Some(2));
        assert_eq!(profile.global.category_cap(CategoryId(6)), Some(3));
        assert_eq!(profile.global.categories.len(), 2);
        assert!(profile.structure.categories.is_empty());
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn only_registered_changes_affect_players() {
        let (resolver, _) = resolver(vec![tier("vip", Some(1), 10)]);
        let perms = MemPermissions::new();
        perms.grant_group("vips", "vip");
        perms.add_to_group(PlayerId(7), "vips");
        perms.add_to_group(PlayerId(8), "vips");

        let unrelated = PermissionChange::UserPermission {
            player: PlayerId(7),
            permission: "chat.color".into(),
        };
        assert!(resolver.affected_players(&perms, &unrelated).is_empty());

        let group_change = PermissionChange::GroupPermission {
            group: "vips".into(),
            permission: "vip".into(),
        };
        let mut affected = resolver.affected_players(&perms, &group_change);
        affected.sort();
        assert_eq!(affected, vec![PlayerId(7), PlayerId(8)]);

        let joined = PermissionChange::UserGroup {
            player: PlayerId(9),
            group: "vips".into(),
        };
        assert_eq!(resolver.affected_players(&perms, &joined), vec![PlayerId(9)]);
    }
}
