use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::reconcile::CleanupPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `sqlite` or `postgres`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file path (sqlite backend).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Connection URL (postgres backend).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_table() -> String {
    // Default table name inherited from the upsertion-record convention.
    "upsertion_records".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.store.backend.as_str() {
        "sqlite" => {
            if config.store.path.is_none() {
                anyhow::bail!("store.path must be set for the sqlite backend");
            }
        }
        "postgres" => {
            if config.store.url.is_none() {
                anyhow::bail!("store.url must be set for the postgres backend");
            }
        }
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be sqlite or postgres.",
            other
        ),
    }

    if config.index.namespace.is_empty() {
        anyhow::bail!("index.namespace must not be empty");
    }

    Ok(config)
}
