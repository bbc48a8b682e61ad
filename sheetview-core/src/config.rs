//! Application configuration loaded from a TOML file

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::{DEFAULT_QUOTA_BYTES, DEFAULT_RETENTION_DAYS};

/// Viewer configuration; every field falls back to its default when the file
/// or the key is missing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where session state lives; defaults to the platform config directory
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Size cap on the fallback storage tier
    #[serde(default = "default_quota_bytes")]
    pub fallback_quota_bytes: usize,
    /// Days a fallback entry stays readable
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Prefix applied to export file names
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

fn default_quota_bytes() -> usize {
    DEFAULT_QUOTA_BYTES
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_export_prefix() -> String {
    "sheetview".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            fallback_quota_bytes: default_quota_bytes(),
            retention_days: default_retention_days(),
            export_prefix: default_export_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
