//! Application configuration management.
//!
//! Settings are layered with figment:
//!
//! 1. Built-in defaults
//! 2. TOML file (platform config dir, or `--config PATH`)
//! 3. `MEDIAVAULT_*` environment variables, `__` separating nested keys
//!
//! Command-line flags are applied on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::{Hasher, SAMPLE_BUFFER_SIZE, SAMPLE_CHUNKS, SMALL_FILE_THRESHOLD};
use crate::sync::DEFAULT_TEMP_DIR_NAME;

/// Prefix of the environment variables read into [`Config`].
pub const ENV_PREFIX: &str = "MEDIAVAULT_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archive (master) directory.
    pub archive_root: Option<PathBuf>,
    /// Mirror targets used by `sync` when none are given.
    pub sync_targets: Vec<PathBuf>,
    /// Hashing threads; `None` uses every core.
    pub threads: Option<usize>,
    /// Descend into subdirectories when collecting.
    pub recurse: bool,
    /// Name of the temp-work directory in the archive root.
    pub temp_dir_name: String,
    /// Files at or below this size are hashed in full.
    pub small_file_threshold: u64,
    /// Number of sampled regions for large files.
    pub sample_chunks: u64,
    /// Bytes read per sampled region.
    pub sample_buffer_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_root: None,
            sync_targets: Vec::new(),
            threads: None,
            recurse: true,
            temp_dir_name: DEFAULT_TEMP_DIR_NAME.to_string(),
            small_file_threshold: SMALL_FILE_THRESHOLD,
            sample_chunks: SAMPLE_CHUNKS,
            sample_buffer_size: SAMPLE_BUFFER_SIZE as u64,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults on any error.
    ///
    /// `path` overrides the platform-specific config file.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an environment variable holds an
    /// invalid value.
    pub fn try_load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_path().ok(),
        };
        if let Some(file) = file {
            log::debug!("Reading config from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .context("Invalid mediavault configuration")
    }

    /// Save the configuration as TOML to `path`, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Get the default platform-specific configuration path.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "mediavault", "mediavault")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Hasher tuned by this configuration.
    #[must_use]
    pub fn hasher(&self) -> Hasher {
        Hasher::new()
            .with_small_file_threshold(self.small_file_threshold)
            .with_sample_chunks(self.sample_chunks)
            .with_sample_buffer_size(usize::try_from(self.sample_buffer_size).unwrap_or(usize::MAX))
    }
}
