use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DetectorConfig {
    /// External detector command and arguments. The worker pipes image
    /// bytes to its stdin and reads detected faces as JSON from its
    /// stdout. Empty means no detector is configured.
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the local object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facedex")
        .join("objects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum Euclidean distance for two encodings to belong to the
    /// same identity. Calibrate to the embedding model in use.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
}

fn default_tolerance() -> f32 {
    0.6
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending entries claimed per lease request.
    #[serde(default = "default_lease_batch_size")]
    pub lease_batch_size: usize,

    /// How often the worker polls for pending entries (seconds).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Optional hour of day to start processing (0-23).
    #[serde(default)]
    pub hours_start: Option<u8>,

    /// Optional hour of day to stop processing (0-23).
    #[serde(default)]
    pub hours_end: Option<u8>,
}

fn default_lease_batch_size() -> usize {
    100
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_batch_size: default_lease_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            hours_start: None,
            hours_end: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Maximum edge length of generated face thumbnails.
    #[serde(default = "default_thumbnail_size")]
    pub max_size: u32,
}

fn default_thumbnail_size() -> u32 {
    200
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_size: default_thumbnail_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facedex")
        .join("facedex.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            matching: MatchingConfig::default(),
            queue: QueueConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facedex")
    }

    pub fn config_path() -> PathBuf {
        // Environment variable overrides the default location
        if let Ok(path) = std::env::var("FACEDEX_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
