//! Daemon configuration, read from a TOML file.
//!
//! ```toml
//! [maintenance]
//! interval_secs = 900
//! projects = ["api", "web"]
//!
//! [keeper.propagation]
//! stale_threshold_hours = 12.0
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use ctxkeep_core::KeeperConfig;
use serde::{Deserialize, Serialize};

/// Schedule and scope of the maintenance loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between cycles.
    pub interval_secs: u64,
    /// Projects whose predictions are refreshed each cycle.
    pub projects: Vec<String>,
    pub prune_enabled: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            projects: Vec::new(),
            prune_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub keeper: KeeperConfig,
    pub maintenance: MaintenanceConfig,
}

impl DaemonConfig {
    /// Parse a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        anyhow::ensure!(
            config.maintenance.interval_secs > 0,
            "maintenance.interval_secs must be positive"
        );
        Ok(config)
    }
}
