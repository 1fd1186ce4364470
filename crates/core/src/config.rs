//! Configuration via `docsync.toml`
//!
//! All settings are passed explicitly into component constructors. The
//! environment name in particular is a plain config value; nothing is read
//! from process-global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "docsync.toml";

/// Match modes understood by the search daemon
pub const MATCH_MODES: &[&str] = &[
    "all", "any", "phrase", "boolean", "extended", "extended2", "fullscan",
];

/// Docsync configuration loaded from `docsync.toml`.
///
/// # Example
///
/// ```toml
/// environment = "production"
/// address = "10.0.0.5"
/// port = 9312
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsyncConfig {
    /// Environment name used in derived paths
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Application root that derived paths hang off
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,
    /// Search daemon address
    #[serde(default = "default_address")]
    pub address: String,
    /// Search daemon port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server-side cap on matches kept per query
    #[serde(default = "default_max_matches")]
    pub max_matches: u32,
    /// Default match mode for queries
    #[serde(default = "default_match_mode")]
    pub match_mode: String,
    /// Records fetched per store page while streaming a feed
    #[serde(default = "default_feed_batch_size")]
    pub feed_batch_size: usize,
    /// Background indexer worker threads
    #[serde(default = "default_indexer_threads")]
    pub indexer_threads: usize,
    /// Maximum queued rebuild jobs
    #[serde(default = "default_indexer_queue_depth")]
    pub indexer_queue_depth: usize,
    /// Directory holding the indexer binary (uses `PATH` when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_path: Option<PathBuf>,
    /// Indexer executable name
    #[serde(default = "default_indexer_binary_name")]
    pub indexer_binary_name: String,
    /// Pass `--rotate` so a running daemon picks up rebuilt partitions
    #[serde(default = "default_rotate")]
    pub rotate: bool,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9312
}

fn default_max_matches() -> u32 {
    1000
}

fn default_match_mode() -> String {
    "extended".to_string()
}

fn default_feed_batch_size() -> usize {
    500
}

fn default_indexer_threads() -> usize {
    1
}

fn default_indexer_queue_depth() -> usize {
    64
}

fn default_indexer_binary_name() -> String {
    "indexer".to_string()
}

fn default_rotate() -> bool {
    true
}

impl Default for DocsyncConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            app_root: default_app_root(),
            address: default_address(),
            port: default_port(),
            max_matches: default_max_matches(),
            match_mode: default_match_mode(),
            feed_batch_size: default_feed_batch_size(),
            indexer_threads: default_indexer_threads(),
            indexer_queue_depth: default_indexer_queue_depth(),
            bin_path: None,
            indexer_binary_name: default_indexer_binary_name(),
            rotate: default_rotate(),
        }
    }
}

impl DocsyncConfig {
    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an unknown match mode, an empty environment or
    /// address, or a zero batch size, thread count or queue depth.
    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(Error::InvalidConfig("environment must not be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }
        if !MATCH_MODES.contains(&self.match_mode.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "Invalid match_mode '{}'. Expected one of: {}",
                self.match_mode,
                MATCH_MODES.join(", ")
            )));
        }
        if self.feed_batch_size == 0 {
            return Err(Error::InvalidConfig("feed_batch_size must be at least 1".to_string()));
        }
        if self.indexer_threads == 0 {
            return Err(Error::InvalidConfig("indexer_threads must be at least 1".to_string()));
        }
        if self.indexer_queue_depth == 0 {
            return Err(Error::InvalidConfig(
                "indexer_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding feed files and index data:
    /// `<app_root>/db/docsync/<environment>`
    pub fn searchd_file_path(&self) -> PathBuf {
        self.app_root
            .join("db")
            .join("docsync")
            .join(&self.environment)
    }

    /// Daemon config file passed to the indexer:
    /// `<app_root>/config/<environment>.docsync.conf`
    pub fn config_file(&self) -> PathBuf {
        self.app_root
            .join("config")
            .join(format!("{}.docsync.conf", self.environment))
    }

    /// Full path of the indexer executable
    pub fn indexer_command(&self) -> PathBuf {
        match &self.bin_path {
            Some(dir) => dir.join(&self.indexer_binary_name),
            None => PathBuf::from(&self.indexer_binary_name),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Docsync configuration
#
# Environment name, used in derived paths:
#   <app_root>/db/docsync/<environment>          feed files and index data
#   <app_root>/config/<environment>.docsync.conf daemon config for the indexer
environment = "development"
app_root = "."

# Search daemon
address = "127.0.0.1"
port = 9312
max_matches = 1000

# Default match mode: all, any, phrase, boolean, extended, extended2, fullscan
match_mode = "extended"

# Records fetched per store page while streaming a feed
feed_batch_size = 500

# Background rebuilds
indexer_threads = 1
indexer_queue_depth = 64
# bin_path = "/usr/local/bin"
indexer_binary_name = "indexer"
rotate = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Parse and validate config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DocsyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
