//! JSON configuration schema. Missing fields fall back to documented defaults.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    #[default]
    Off,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Directive understood by `log`/`tracing` env filters.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub log_level: LogLevel,
    pub notifications: NotificationConfig,
    /// Chat command aliases for the limits report; the first one is advertised in help text.
    pub commands: Vec<String>,
    /// Object type names (short or full) that are never tracked.
    pub excluded: Vec<String>,
    pub groups: Vec<GroupConfig>,
    pub tiers: Vec<TierConfig>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Off,
            notifications: NotificationConfig::default(),
            commands: vec!["limits".into(), "limit".into()],
            excluded: Vec::new(),
            groups: Vec::new(),
            tiers: Vec::new(),
        }
    }
}

impl LimitsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KernelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, KernelError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, KernelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub chat: bool,
    pub toast: bool,
    /// Usage percentage at which an advisory notice is produced.
    pub warn_percent: f32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            chat: false,
            toast: false,
            warn_percent: 80.0,
        }
    }
}

impl NotificationConfig {
    pub fn enabled(&self) -> bool {
        (self.chat || self.toast) && self.warn_percent > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub permission: String,
    /// Higher wins. A tier without a priority loses to every tier that has one.
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub global: LimitSetConfig,
    #[serde(default)]
    pub structure: LimitSetConfig,
    #[serde(default)]
    pub merge_guard: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSetConfig {
    /// `0` on the global set means "may not build at all".
    pub total: u32,
    /// Category name (group name or object type name) to cap.
    pub categories: IndexMap<String, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LimitsConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LimitsConfig::default());
        assert_eq!(config.notifications.warn_percent, 80.0);
        assert_eq!(config.commands[0], "limits");
    }

    #[test]
    fn tier_fields_parse() {
        let config = LimitsConfig::from_json_str(
            r#"{
                "log_level": "Debug",
                "notifications": { "chat": true },
                "groups": [{ "name": "Furnaces", "members": ["furnace", "furnace.large"] }],
                "tiers": [{
                    "permission": "limitentities.default",
                    "priority": 10,
                    "global": { "total": 500, "categories": { "Furnaces": 4 } },
                    "structure": { "total": 200 },
                    "merge_guard": true
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.notifications.enabled());
        let tier = &config.tiers[0];
        assert_eq!(tier.priority, Some(10));
        assert_eq!(tier.global.categories.get("Furnaces"), Some(&4));
        assert_eq!(tier.structure.total, 200);
        assert!(tier.structure.categories.is_empty());
        assert!(tier.merge_guard);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = LimitsConfig::from_json_str(r#"{ "tiers": [{ "priority": 1 }] }"#).unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
