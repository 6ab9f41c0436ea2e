//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory, or an explicit path
//! 3. `COPYALL_`-prefixed environment variables (`COPYALL_IO_THREADS=8`)
//! 4. CLI flags, applied with [`Config::merge_cli`]
//!
//! # Example
//!
//! ```no_run
//! use copyall::config::Config;
//!
//! let config = Config::load();
//! println!("Using {} I/O threads", config.io_threads);
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{TransferConfig, TransferMode};
use crate::cli::Cli;
use crate::duplicates::FinderConfig;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "COPYALL_";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file or environment could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A setting is out of range.
    #[error("Invalid configuration: {field} must be at least 1")]
    Zero {
        /// Offending key
        field: &'static str,
    },

    /// The config could not be written.
    #[error("Failed to save configuration to {path}: {message}")]
    Save {
        /// Target file
        path: PathBuf,
        /// Reason
        message: String,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads for stat, hash and transfer batches.
    pub io_threads: usize,
    /// Numbered names tried per name conflict.
    pub max_rename_retries: usize,
    /// Files per stat batch.
    pub stat_batch_size: usize,
    /// Files per hashing batch.
    pub hash_batch_size: usize,
    /// Files per transfer batch.
    pub transfer_batch_size: usize,
    /// Only report duplicates that share an extension.
    pub match_extensions: bool,
    /// Width of the text progress bar.
    pub bar_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: 4,
            max_rename_retries: 100,
            stat_batch_size: 20_000,
            hash_batch_size: 256,
            transfer_batch_size: 512,
            match_extensions: true,
            bar_width: 100,
        }
    }
}

impl Config {
    /// Load from the default platform path, falling back to defaults on any
    /// error.
    #[must_use]
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from_path(path),
            None => {
                log::debug!("No platform config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`, falling back to defaults on any error.
    #[must_use]
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        match Self::try_load_from_path(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load and validate from `path`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] for malformed TOML or environment values,
    /// [`ConfigError::Zero`] for out-of-range settings.
    pub fn try_load_from_path(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        let config: Self = Self::figment(path).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider stack for `path`.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// `config.toml` in the platform config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "copyall", "copyall")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject zero thread and batch counts.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Zero`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("io_threads", self.io_threads),
            ("stat_batch_size", self.stat_batch_size),
            ("hash_batch_size", self.hash_batch_size),
            ("transfer_batch_size", self.transfer_batch_size),
            ("bar_width", self.bar_width),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    /// Apply global CLI overrides.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(threads) = cli.io_threads {
            self.io_threads = threads;
        }
    }

    /// Write as TOML to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Save`] if serialisation or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let save_err = |message: String| ConfigError::Save {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_err(e.to_string()))
    }

    /// Detector settings.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_io_threads(self.io_threads)
            .with_stat_batch_size(self.stat_batch_size)
            .with_hash_batch_size(self.hash_batch_size)
            .with_match_extensions(self.match_extensions)
    }

    /// Transfer settings for `mode`.
    #[must_use]
    pub fn transfer_config(&self, mode: TransferMode) -> TransferConfig {
        TransferConfig::new(mode)
            .with_io_threads(self.io_threads)
            .with_batch_size(self.transfer_batch_size)
            .with_max_retries(self.max_rename_retries)
    }
}
