use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Parameters for the session orchestrator's state machine and watch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub overlay_binary_name: String,
    pub game_launcher_binary_name: String,
    pub poll_interval_ms: u64,
    pub stability_samples: u32,
    pub recording_timeout_secs: u64,
    pub duration_buffer_secs: u64,
    pub gpu_pci_address: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            overlay_binary_name: "mangohud".to_string(),
            game_launcher_binary_name: "steam".to_string(),
            poll_interval_ms: 500,
            stability_samples: 3,
            recording_timeout_secs: 1800,
            duration_buffer_secs: 1,
            gpu_pci_address: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn load_or_default(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"))
            .join("linuxbench")
            .join("config.toml")
    }
}

/// Parameters for the storage engine's on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("benchmark_results"),
        }
    }
}
