//! Object type → tracked category mapping, plus the id↔name table for categories.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::config::LimitsConfig;
use crate::host::TrackableType;
use crate::ids::{CategoryId, ObjectTypeId};

/// Synthetic group ids start this far above the largest catalog type id.
pub const GROUP_ID_OFFSET: u32 = 10_000;

/// A configuration entry that was skipped. Issues never abort startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("group '{group}' has no valid members and was skipped")]
    EmptyGroup { group: String },
    #[error("group names must be unique, skipped duplicate '{group}'")]
    DuplicateGroup { group: String },
    #[error("group '{group}' lists unknown or untracked type '{member}'")]
    UnknownGroupMember { group: String, member: String },
    #[error("type '{member}' is already in group '{first}', ignored in group '{second}'")]
    TypeInMultipleGroups {
        member: String,
        first: String,
        second: String,
    },
    #[error(
        "tier '{tier}' limits '{name}' individually but it belongs to a group; use the group name"
    )]
    GroupedTypeListedIndividually { tier: String, name: String },
    #[error("tier '{tier}' limits unknown or untracked type '{name}'")]
    UnknownLimitEntry { tier: String, name: String },
    #[error("tier #{index} has an empty permission and was skipped")]
    EmptyPermission { index: usize },
}

impl ConfigIssue {
    /// Skipped structural entries are errors; dropped list members are warnings.
    pub fn is_error(&self) -> bool {
        !matches!(self, ConfigIssue::UnknownGroupMember { .. })
    }

    pub(crate) fn log(&self) {
        if self.is_error() {
            log::error!("{self}");
        } else {
            log::warn!("{self}");
        }
    }
}

/// Why a limit key could not be resolved to a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKeyError {
    Grouped,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    pub short_name: String,
    pub full_name: Option<String>,
    pub structural: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectClassifier {
    tracked: BTreeMap<ObjectTypeId, TypeEntry>,
    type_by_name: HashMap<String, ObjectTypeId>,
    groups: HashMap<ObjectTypeId, CategoryId>,
    group_by_name: HashMap<String, CategoryId>,
    category_names: HashMap<CategoryId, String>,
}

impl ObjectClassifier {
    pub fn build(types: &[TrackableType], config: &LimitsConfig) -> (Self, Vec<ConfigIssue>) {
        let mut classifier = ObjectClassifier::default();
        let mut issues = Vec::new();

        for ty in types {
            let excluded = config.excluded.iter().any(|name| {
                *name == ty.short_name || ty.full_name.as_deref() == Some(name.as_str())
            });
            if excluded {
                log::debug!("type {} ({}) excluded from tracking", ty.type_id, ty.short_name);
                continue;
            }
            classifier.tracked.insert(
                ty.type_id,
                TypeEntry {
                    short_name: ty.short_name.clone(),
                    full_name: ty.full_name.clone(),
                    structural: ty.structural,
                },
            );
            for name in std::iter::once(&ty.short_name).chain(ty.full_name.as_ref()) {
                classifier
                    .type_by_name
                    .entry(name.clone())
                    .or_insert(ty.type_id);
            }
            classifier
                .category_names
                .insert(ty.type_id.into(), ty.short_name.clone());
        }
        log::debug!("{} object types tracked", classifier.tracked.len());

        let mut next_id = classifier
            .tracked
            .keys()
            .next_back()
            .map(|id| id.0)
            .unwrap_or(0)
            .saturating_add(GROUP_ID_OFFSET);
        let mut group_of: HashMap<ObjectTypeId, String> = HashMap::new();

        for group in &config.groups {
            if classifier.group_by_name.contains_key(&group.name) {
                issues.push(ConfigIssue::DuplicateGroup {
                    group: group.name.clone(),
                });
                continue;
            }
            let mut members = Vec::new();
            for member in &group.members {
                let Some(&type_id) = classifier.type_by_name.get(member) else {
                    issues.push(ConfigIssue::UnknownGroupMember {
                        group: group.name.clone(),
                        member: member.clone(),
                    });
                    continue;
                };
                if let Some(first) = group_of.get(&type_id) {
                    issues.push(ConfigIssue::TypeInMultipleGroups {
                        member: member.clone(),
                        first: first.clone(),
                        second: group.name.clone(),
                    });
                    continue;
                }
                if !members.contains(&type_id) {
                    members.push(type_id);
                }
            }
            if members.is_empty() {
                issues.push(ConfigIssue::EmptyGroup {
                    group: group.name.clone(),
                });
                continue;
            }

            loop {
                next_id = next_id.saturating_add(1);
                if !classifier.tracked.contains_key(&ObjectTypeId(next_id)) {
                    break;
                }
            }
            let category = CategoryId(next_id);
            for type_id in members {
                classifier.groups.insert(type_id, category);
                group_of.insert(type_id, group.name.clone());
            }
            classifier
                .group_by_name
                .insert(group.name.clone(), category);
            classifier
                .category_names
                .insert(category, group.name.clone());
            log::debug!("group '{}' assigned category {category}", group.name);
        }

        for issue in &issues {
            issue.log();
        }
        (classifier, issues)
    }

    /// The category an object type counts against, or `None` for untracked types.
    pub fn resolve_category(&self, type_id: ObjectTypeId) -> Option<CategoryId> {
        if !self.tracked.contains_key(&type_id) {
            return None;
        }
        Some(
            self.groups
                .get(&type_id)
                .copied()
                .unwrap_or_else(|| type_id.into()),
        )
    }

    pub fn is_tracked(&self, type_id: ObjectTypeId) -> bool {
        self.tracked.contains_key(&type_id)
    }

    pub fn is_structural(&self, type_id: ObjectTypeId) -> bool {
        self.tracked
            .get(&type_id)
            .is_some_and(|entry| entry.structural)
    }

    pub fn is_group(&self, category: CategoryId) -> bool {
        self.group_by_name.values().any(|id| *id == category)
    }

    pub fn category_name(&self, category: CategoryId) -> Option<&str> {
        self.category_names.get(&category).map(String::as_str)
    }

    /// Display label for logs and reports; falls back to the numeric id.
    pub fn label(&self, category: CategoryId) -> String {
        self.category_name(category)
            .map(str::to_string)
            .unwrap_or_else(|| category.to_string())
    }

    pub fn group_id(&self, name: &str) -> Option<CategoryId> {
        self.group_by_name.get(name).copied()
    }

    /// Resolve a limit key from the config: group names first, then type names.
    pub fn resolve_limit_key(&self, key: &str) -> Result<CategoryId, LimitKeyError> {
        if let Some(group) = self.group_by_name.get(key) {
            return Ok(*group);
        }
        match self.type_by_name.get(key) {
            Some(type_id) if self.groups.contains_key(type_id) => Err(LimitKeyError::Grouped),
            Some(type_id) => Ok((*type_id).into()),
            None => Err(LimitKeyError::Unknown),
        }
    }

    /// Tracked types in id order.
    pub fn tracked_types(&self) -> impl Iterator<Item = (ObjectTypeId, &TypeEntry)> {
        self.tracked.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;

    fn ty(id: u32, name: &str, structural: bool) -> TrackableType {
        TrackableType {
            type_id: ObjectTypeId(id),
            structural,
            short_name: name.into(),
            full_name: Some(format!("assets/{name}.prefab")),
        }
    }

    fn catalog() -> Vec<TrackableType> {
        vec![
            ty(10, "foundation", true),
            ty(11, "foundation.triangle", true),
            ty(20, "furnace", false),
            ty(21, "furnace.large", false),
            ty(30, "ladder", false),
        ]
    }

    fn group(name: &str, members: &[&str]) -> GroupConfig {
        GroupConfig {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn ungrouped_type_is_its_own_category() {
        let (classifier, issues) = ObjectClassifier::build(&catalog(), &LimitsConfig::default());
        assert!(issues.is_empty());
        assert_eq!(
            classifier.resolve_category(ObjectTypeId(20)),
            Some(CategoryId(20))
        );
        assert_eq!(classifier.resolve_category(ObjectTypeId(99)), None);
    }

    #[test]
    fn grouped_types_share_a_synthetic_category() {
        let config = LimitsConfig {
            groups: vec![group("Furnaces", &["furnace", "assets/furnace.large.prefab"])],
            ..LimitsConfig::default()
        };
        let (classifier, issues) = ObjectClassifier::build(&catalog(), &config);
        assert!(issues.is_empty());
        let a = classifier.resolve_category(ObjectTypeId(20)).unwrap();
        let b = classifier.resolve_category(ObjectTypeId(21)).unwrap();
        assert_eq!(a, b);
        assert!(a.0 > 30 + GROUP_ID_OFFSET);
        assert!(classifier.is_group(a));
        assert_eq!(classifier.category_name(a), Some("Furnaces"));
        assert_eq!(classifier.resolve_limit_key("Furnaces"), Ok(a));
        assert_eq!(
            classifier.resolve_limit_key("furnace"),
            Err(LimitKeyError::Grouped)
        );
    }

    #[test]
    fn excluded_types_are_not_tracked() {
        let config = LimitsConfig {
            excluded: vec!["ladder".into()],
            ..LimitsConfig::default()
        };
        let (classifier, _) = ObjectClassifier::build(&catalog(), &config);
        assert!(!classifier.is_tracked(ObjectTypeId(30)));
        assert_eq!(classifier.tracked_len(), 4);
    }

    #[test]
    fn bad_groups_are_reported_and_skipped() {
        let config = LimitsConfig {
            groups: vec![
                group("Furnaces", &["furnace", "nonsense"]),
                group("Furnaces", &["furnace.large"]),
                group("Heat", &["furnace", "furnace.large"]),
                group("Empty", &["nothing"]),
            ],
            ..LimitsConfig::default()
        };
        let (classifier, issues) = ObjectClassifier::build(&catalog(), &config);
        assert!(issues.contains(&ConfigIssue::UnknownGroupMember {
            group: "Furnaces".into(),
            member: "nonsense".into()
        }));
        assert!(issues.contains(&ConfigIssue::DuplicateGroup {
            group: "Furnaces".into()
        }));
        assert!(issues.contains(&ConfigIssue::TypeInMultipleGroups {
            member: "furnace".into(),
            first: "Furnaces".into(),
            second: "Heat".into()
        }));
        assert!(issues.contains(&ConfigIssue::EmptyGroup {
            group: "Empty".into()
        }));
        // "Heat" keeps furnace.large, which no other group claimed.
        let heat = classifier.group_id("Heat").unwrap();
        assert_eq!(classifier.resolve_category(ObjectTypeId(21)), Some(heat));
        assert!(classifier.group_id("Empty").is_none());
    }

    #[test]
    fn group_ids_never_collide_with_type_ids() {
        let mut types = catalog();
        types.push(ty(GROUP_ID_OFFSET + 40, "colliding", false));
        let config = LimitsConfig {
            groups: vec![group("Furnaces", &["furnace"]), group("Ladders", &["ladder"])],
            ..LimitsConfig::default()
        };
        let (classifier, _) = ObjectClassifier::build(&types, &config);
        let furnaces = classifier.group_id("Furnaces").unwrap();
        let ladders = classifier.group_id("Ladders").unwrap();
        assert_ne!(furnaces, ladders);
        for id in [furnaces, ladders] {
            assert!(!classifier.is_tracked(ObjectTypeId(id.0)));
        }
    }
}
