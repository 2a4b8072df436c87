//! Daemon configuration.
//!
//! Every field has a default, so a missing file is a valid configuration.
//! Chord tables are fixed per variant and deliberately absent here.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "NEOCONTROLLER_CONFIG";
const CONFIG_DIR: &str = "neocontroller";
const CONFIG_FILE: &str = "config.toml";
const SYSTEM_CONFIG: &str = "/etc/neocontroller/config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub retry: RetryConfig,
    /// Where grabbed device nodes are moved while the daemon runs.
    pub conceal_dir: PathBuf,
    pub sink: SinkConfig,
    pub reaper: ReaperConfig,
    pub motion: MotionConfig,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub board_id_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            conceal_dir: PathBuf::from("/dev/input/.hidden"),
            sink: SinkConfig::default(),
            reaper: ReaperConfig::default(),
            motion: MotionConfig::default(),
            log_level: "info".to_string(),
            board_id_path: PathBuf::from(crate::variant::BOARD_ID_PATH),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SinkConfig {
    pub name: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: "Handheld Controller".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_ms: u64,
    /// 0 sweeps until shutdown.
    pub sweeps: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            sweeps: 12,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MotionConfig {
    pub enabled: bool,
    pub i2c_bus: String,
    /// Overrides the variant's sensor address.
    pub address: Option<u8>,
    pub poll_interval_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            i2c_bus: "/dev/i2c-1".to_string(),
            address: None,
            poll_interval_ms: 50,
        }
    }
}

impl ReaperConfig {
    pub fn sweep_limit(&self) -> Option<u32> {
        (self.sweeps > 0).then_some(self.sweeps)
    }
}

impl DaemonConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))
    }

    /// Reads `path`; a missing file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if {} exists: {}", path.display(), e))?
        {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| eyre!("{}: {}", path.display(), e))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads the first config file found in the usual places.
    pub async fn load() -> Result<Self> {
        for path in candidate_paths() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Self::load_from(&path).await;
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }
    if let Some(mut path) = dirs::config_dir() {
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        paths.push(path);
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.reaper.sweep_limit(), Some(12));
        assert_eq!(config.motion.address, None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = DaemonConfig::from_toml_str(
            r#"
            log_level = "debug"

            [retry]
            attempts = 5

            [motion]
            enabled = false
            address = 0x69
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.backoff_ms, 1000);
        assert!(!config.motion.enabled);
        assert_eq!(config.motion.address, Some(0x69));
        assert_eq!(config.motion.poll_interval_ms, 50);
        assert_eq!(config.sink.name, "Handheld Controller");
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(DaemonConfig::from_toml_str("[retry]\nattempts = \"three\"").is_err());
    }

    #[tokio::test]
    async fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        assert_eq!(
            DaemonConfig::load_from(&missing).await.unwrap(),
            DaemonConfig::default()
        );

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reaper]\ninterval_ms = 250\n").unwrap();
        let config = DaemonConfig::load_from(&path).await.unwrap();
        assert_eq!(config.reaper.interval_ms, 250);
        // `sweeps` omitted in a present section still takes the default.
        assert_eq!(config.reaper.sweeps, 12);

        std::fs::write(&path, "[reaper]\nsweeps = 0\n").unwrap();
        let config = DaemonConfig::load_from(&path).await.unwrap();
        assert_eq!(config.reaper.sweep_limit(), None);
    }
}
