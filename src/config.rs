//! Configuration Module
//!
//! Handles loading backend settings from environment variables and
//! building the configured adapter.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::filesystem::{FileCache, DEFAULT_EXTENSION, DEFAULT_PROBABILITY};
use crate::local::LocalCache;
use crate::network::{NetworkCache, NetworkConfig};

// == Constants ==
/// Subdirectory of the system temp dir used when no directory is configured
pub const DEFAULT_DIRECTORY_NAME: &str = "polycache";

/// Default cache directory. Never the temp dir itself: `clear` and the
/// expired sweep remove every regular file in the cache directory.
pub fn default_directory() -> PathBuf {
    env::temp_dir().join(DEFAULT_DIRECTORY_NAME)
}

// == Backend ==
/// Storage substrate behind the cache contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Filesystem,
    Network,
}

impl FromStr for Backend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "memory" => Ok(Backend::Local),
            "filesystem" | "fs" | "file" => Ok(Backend::Filesystem),
            "network" | "redis" => Ok(Backend::Network),
            other => Err(CacheError::Configuration(format!("unknown backend \"{other}\""))),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend the facade is built over
    pub backend: Backend,
    /// Filesystem backend: cache directory
    pub directory: PathBuf,
    /// Filesystem backend: artifact extension
    pub extension: String,
    /// Filesystem backend: garbage collection probability denominator
    pub probability: u32,
    /// Network backend settings
    pub network: NetworkConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `POLYCACHE_BACKEND` - `local`, `filesystem` or `network` (default: filesystem)
    /// - `POLYCACHE_DIR` - Cache directory (default: `polycache` under the system temp dir)
    /// - `POLYCACHE_EXTENSION` - Artifact extension (default: .cache)
    /// - `POLYCACHE_GC_PROBABILITY` - Collection denominator, 0 disables (default: 5)
    /// - `POLYCACHE_HOST` - Server host or socket path (default: 127.0.0.1)
    /// - `POLYCACHE_PORT` - Server port; empty or `none` selects a unix socket (default: 6379)
    /// - `POLYCACHE_PASSWORD` - Server password (default: none)
    /// - `POLYCACHE_TIMEOUT` - Connect timeout in seconds (default: 2.5)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let backend = match env::var("POLYCACHE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.backend,
        };

        let port = match env::var("POLYCACHE_PORT") {
            Ok(v) if v.trim().is_empty() || v.trim().eq_ignore_ascii_case("none") => None,
            Ok(v) => Some(v.trim().parse().map_err(|_| {
                CacheError::Configuration(format!("invalid POLYCACHE_PORT \"{v}\""))
            })?),
            Err(_) => defaults.network.port,
        };

        Ok(Self {
            backend,
            directory: env::var("POLYCACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
            extension: env::var("POLYCACHE_EXTENSION").unwrap_or(defaults.extension),
            probability: env::var("POLYCACHE_GC_PROBABILITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probability),
            network: NetworkConfig {
                host: env::var("POLYCACHE_HOST").unwrap_or(defaults.network.host),
                port,
                password: env::var("POLYCACHE_PASSWORD").ok().filter(|p| !p.is_empty()),
                timeout: env::var("POLYCACHE_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64)
                    .unwrap_or(defaults.network.timeout),
            },
        })
    }

    /// Builds the filesystem adapter from these settings.
    ///
    /// The default directory is created on demand; a configured directory
    /// must already exist.
    pub fn open_filesystem(&self) -> Result<FileCache> {
        if self.directory == default_directory() {
            fs::create_dir_all(&self.directory)?;
        }
        Ok(FileCache::new(&self.directory)?
            .with_extension(&self.extension)
            .with_probability(self.probability))
    }

    /// Builds the configured adapter behind the cache contract.
    pub fn open(&self) -> Result<Box<dyn Cache>> {
        Ok(match self.backend {
            Backend::Local => Box::new(LocalCache::new()?),
            Backend::Filesystem => Box::new(self.open_filesystem()?),
            Backend::Network => Box::new(NetworkCache::new(self.network.clone())),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Filesystem,
            directory: default_directory(),
            extension: DEFAULT_EXTENSION.to_string(),
            probability: DEFAULT_PROBABILITY,
            network: NetworkConfig::default(),
        }
    }
}
