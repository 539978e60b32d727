//! dockd.toml configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dockgrid_rollout::DeployerConfig;

pub const DEFAULT_DATA_DIR: &str = "/var/lib/dockgrid";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DockdConfig {
    pub state: StateConfig,
    pub deployer: DeployerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding `dockgrid.redb`.
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl DockdConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DockdConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.state.data_dir.join("dockgrid.redb")
    }
}
