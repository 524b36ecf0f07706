//! REVENANT - Engine Configuration
//! Defines tunable parameters for the key-value engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RevenantError};

/// When appended AOF records are flushed to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsyncPolicy {
    /// fsync after every appended record.
    Always,
    /// A background ticker fsyncs once per second.
    EverySecond,
    /// Leave flushing to the operating system.
    Never,
}

/// Configuration for the Revenant engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for the AOF file.
    pub data_dir: PathBuf,

    /// File name of the append-only log inside `data_dir`.
    pub aof_file: String,

    /// Durability policy for AOF appends.
    pub fsync: FsyncPolicy,

    /// Number of logical database partitions (SELECT targets).
    pub max_db: usize,

    /// Number of lock-guarded shards per partition map.
    pub shard_count: usize,

    /// Maximum level count of the sorted-set skip lists.
    pub skiplist_height: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            aof_file: "revenant.aof".to_string(),
            fsync: FsyncPolicy::EverySecond,
            max_db: 16,
            shard_count: 16,
            skiplist_height: 4,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load a Config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: Config = serde_json::from_slice(&bytes)
            .map_err(|e| RevenantError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the fsync policy.
    pub fn with_fsync(mut self, fsync: FsyncPolicy) -> Self {
        self.fsync = fsync;
        self
    }

    /// Set the shard count per partition.
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Set the number of logical database partitions.
    pub fn with_max_db(mut self, max_db: usize) -> Self {
        self.max_db = max_db;
        self
    }

    /// Full path of the append-only log file.
    pub fn aof_path(&self) -> PathBuf {
        self.data_dir.join(&self.aof_file)
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    fn validate(&self) -> Result<()> {
        if self.max_db == 0 || self.shard_count == 0 || self.skiplist_height == 0 {
            return Err(RevenantError::Config(
                "max_db, shard_count and skiplist_height must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
