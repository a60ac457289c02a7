//! Refresher configuration stored in `<project>/refresher.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::retrieve::DEFAULT_MAX_ATTEMPTS;

/// Refresher configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Upper bound on retrieve attempts.
    pub max_attempts: u32,

    /// Executable used for every platform CLI call.
    pub sf_bin: String,

    /// Wall-clock limit for a single retrieve attempt.
    pub retrieve_timeout_secs: u64,

    /// Wall-clock limit for scaffolding, login, and discovery commands.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Pin the API version instead of asking the org for its newest one.
    pub api_version: Option<String>,

    /// Types excluded from the very first manifest.
    pub seed_exclusions: Vec<String>,

    /// Types appended to the discovered list when absent.
    pub supplemental_types: Vec<String>,

    pub overrides: OverrideConfig,
}

/// Which per-type member enumerations run before the retrieve loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OverrideConfig {
    /// List standard objects explicitly under `CustomObject` (plus a wildcard).
    pub standard_objects: bool,

    /// List `CustomNotificationType` members explicitly.
    pub notification_types: bool,

    /// Folder-scoped types whose items are listed folder by folder.
    pub folder_types: Vec<FolderTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderTypeConfig {
    /// Item type written to the manifest (e.g. `Report`).
    pub item_type: String,
    /// Type used to list its folders (e.g. `ReportFolder`).
    pub folder_type: String,
}

impl FolderTypeConfig {
    fn new(item_type: &str, folder_type: &str) -> Self {
        Self {
            item_type: item_type.to_string(),
            folder_type: folder_type.to_string(),
        }
    }
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            standard_objects: true,
            notification_types: true,
            folder_types: vec![
                FolderTypeConfig::new("Report", "ReportFolder"),
                FolderTypeConfig::new("Dashboard", "DashboardFolder"),
                FolderTypeConfig::new("Document", "DocumentFolder"),
                FolderTypeConfig::new("EmailTemplate", "EmailFolder"),
            ],
        }
    }
}

/// Lightning and related types that type discovery has been seen to omit.
pub const DEFAULT_SUPPLEMENTAL_TYPES: &[&str] = &[
    "AuraDefinitionBundle",
    "LightningComponentBundle",
    "LightningMessageChannel",
    "LightningExperienceTheme",
    "FlexiPage",
    "CustomNotificationType",
    "ExperienceBundle",
];

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sf_bin: "sf".to_string(),
            retrieve_timeout_secs: 60 * 60,
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 50 * 1024 * 1024,
            api_version: None,
            seed_exclusions: Vec::new(),
            supplemental_types: DEFAULT_SUPPLEMENTAL_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            overrides: OverrideConfig::default(),
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.sf_bin.trim().is_empty() {
            return Err(anyhow!("sf_bin must be non-empty"));
        }
        if self.retrieve_timeout_secs == 0 {
            return Err(anyhow!("retrieve_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if let Some(version) = &self.api_version
            && version.trim().is_empty()
        {
            return Err(anyhow!("api_version must be non-empty when set"));
        }
        for folder in &self.overrides.folder_types {
            if folder.item_type.trim().is_empty() || folder.folder_type.trim().is_empty() {
                return Err(anyhow!(
                    "overrides.folder_types entries need item_type and folder_type"
                ));
            }
        }
        Ok(())
    }

    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieve_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefreshConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefreshConfig> {
    if !path.exists() {
        let cfg = RefreshConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefreshConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
