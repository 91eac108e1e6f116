//! Configuration for the adaptive memory store
//!
//! All tunable parameters in one place with environment variable overrides.
//! The configuration is passed explicitly at construction; there is no
//! process-wide mutable state.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::constants::{DEFAULT_DECAY_LAMBDA, DEFAULT_MAX_CAPACITY, DEFAULT_WAL_BATCH_SIZE};

/// Store configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Confinement root for persistence paths. Any snapshot, log, or legacy
    /// file must resolve under this directory or the system temp directory.
    pub base_dir: PathBuf,

    /// Directory holding the snapshot, write-ahead log, and legacy files.
    /// Defaults to `base_dir`; pointing it elsewhere is rejected by the
    /// path guard unless the target is under `base_dir` or the temp dir.
    pub storage_dir: PathBuf,

    /// Exponential decay rate per hour for temporal weighting (>= 0)
    pub decay_lambda: f32,

    /// Soft ceiling on stored event count (> 0). Advisory: exceeding it
    /// triggers an age-based prune, not a size-targeted eviction.
    pub max_capacity: usize,

    /// Records buffered before the write-ahead log auto-flushes (> 0)
    pub wal_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dir = PathBuf::from("./astra_memory_data");
        Self {
            base_dir: dir.clone(),
            storage_dir: dir,
            decay_lambda: DEFAULT_DECAY_LAMBDA,
            max_capacity: DEFAULT_MAX_CAPACITY,
            wal_batch_size: DEFAULT_WAL_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("ASTRA_MEMORY_PATH") {
            let dir = PathBuf::from(val);
            config.base_dir = dir.clone();
            config.storage_dir = dir;
        }

        if let Ok(val) = env::var("ASTRA_DECAY_LAMBDA") {
            if let Ok(n) = val.parse::<f32>() {
                config.decay_lambda = n.max(0.0);
            }
        }

        if let Ok(val) = env::var("ASTRA_MAX_CAPACITY") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_capacity = n.max(1);
            }
        }

        if let Ok(val) = env::var("ASTRA_WAL_BATCH_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.wal_batch_size = n.max(1);
            }
        }

        config
    }

    /// Build a config rooted at one directory, for the common case where
    /// the confinement root and the storage directory coincide.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            base_dir: dir.clone(),
            storage_dir: dir,
            ..Self::default()
        }
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!("Memory store configuration:");
        info!("   Base dir: {:?}", self.base_dir);
        info!("   Storage dir: {:?}", self.storage_dir);
        info!("   Decay lambda: {}/hour", self.decay_lambda);
        info!("   Max capacity: {} events (advisory)", self.max_capacity);
        info!("   WAL batch size: {} records", self.wal_batch_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.decay_lambda, DEFAULT_DECAY_LAMBDA);
        assert_eq!(config.max_capacity, DEFAULT_MAX_CAPACITY);
        assert_eq!(config.wal_batch_size, DEFAULT_WAL_BATCH_SIZE);
        assert_eq!(config.base_dir, config.storage_dir);
    }

    #[test]
    fn test_rooted_at() {
        let config = StoreConfig::rooted_at("/tmp/astra-test");
        assert_eq!(config.base_dir, PathBuf::from("/tmp/astra-test"));
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/astra-test"));
    }

    #[test]
    fn test_env_override() {
        env::set_var("ASTRA_DECAY_LAMBDA", "0.25");
        env::set_var("ASTRA_MAX_CAPACITY", "500");

        let config = StoreConfig::from_env();
        assert_eq!(config.decay_lambda, 0.25);
        assert_eq!(config.max_capacity, 500);

        env::remove_var("ASTRA_DECAY_LAMBDA");
        env::remove_var("ASTRA_MAX_CAPACITY");
    }
}
