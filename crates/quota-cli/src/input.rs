//! Reading config, catalog and scenario files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use quota_kernel::{LimitsConfig, StaticCatalog};
use serde::de::DeserializeOwned;

pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {what} {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {what} {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<LimitsConfig> {
    match path {
        Some(path) => {
            LimitsConfig::load(path).with_context(|| format!("load config {}", path.display()))
        }
        None => Ok(LimitsConfig::default()),
    }
}

pub fn load_catalog(path: &Path) -> Result<StaticCatalog> {
    read_json(path, "catalog")
}
