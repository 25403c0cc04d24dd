use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtseekError, Result};

/// How the persistence engine maps store files into memory.
///
/// Parsed from user input; an unknown name is a configuration error and is
/// never silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingMode {
    /// Plain buffered file IO
    FileIo,
    /// Memory-mapped reads
    MemoryMap,
}

impl FromStr for LoadingMode {
    type Err = ProtseekError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file-io" | "fileio" => Ok(LoadingMode::FileIo),
            "memory-map" | "mmap" => Ok(LoadingMode::MemoryMap),
            other => Err(ProtseekError::config(
                "loading_mode",
                format!("unknown loading mode '{}', expected 'file-io' or 'memory-map'", other),
            )),
        }
    }
}

/// Settings for one batched store instance.
///
/// Loading mode, flush thresholds and the GC budget are explicit construction
/// parameters rather than process-global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Loading mode handed to the persistence engine
    pub loading_mode: LoadingMode,
    /// Pending entries per shard before an automatic batch commit
    pub flush_threshold: usize,
    /// Number of sharded pending maps (one per writer thread)
    pub shard_count: usize,
    /// Fraction of store size that must be reclaimed for a GC pass to count
    /// as progress
    pub gc_ratio: f64,
    /// Iteration budget for one garbage collection call
    pub gc_max_iterations: usize,
    /// Capacity of the streaming-insert queue
    pub queue_capacity: usize,
    /// Consumer tasks draining the streaming-insert queue
    pub stream_workers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            loading_mode: LoadingMode::FileIo,
            flush_threshold: 10_000,
            shard_count: 4,
            gc_ratio: 0.1,
            gc_max_iterations: 5,
            queue_capacity: 4_096,
            stream_workers: 4,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(ProtseekError::config("flush_threshold", "must be greater than 0"));
        }
        if self.shard_count == 0 {
            return Err(ProtseekError::config("shard_count", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.gc_ratio) {
            return Err(ProtseekError::config("gc_ratio", "must be within 0.0..=1.0"));
        }
        if self.queue_capacity == 0 || self.stream_workers == 0 {
            return Err(ProtseekError::config(
                "streaming",
                "queue capacity and worker count must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for a whole database: the root directory holding the three
/// sub-stores plus the ingestion knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root directory; sub-stores live in `kmers/`, `proteins/` and
    /// `combinations/` beneath it
    pub root: PathBuf,
    /// Shared store settings
    pub store: StoreConfig,
    /// Worker tasks used by the build pipeline
    pub build_workers: usize,
    /// Proteins processed between periodic GC passes during bulk loads
    pub gc_interval: u64,
}

impl DatabaseConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            store: StoreConfig::default(),
            build_workers: 4,
            gc_interval: 100_000,
        }
    }

    pub fn builder(root: impl Into<PathBuf>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder { config: DatabaseConfig::new(root) }
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        if self.build_workers == 0 {
            return Err(ProtseekError::config("build_workers", "must be greater than 0"));
        }
        if self.gc_interval == 0 {
            return Err(ProtseekError::config("gc_interval", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`DatabaseConfig`]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    pub fn loading_mode(mut self, mode: LoadingMode) -> Self {
        self.config.store.loading_mode = mode;
        self
    }

    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.config.store.flush_threshold = threshold;
        self
    }

    pub fn shard_count(mut self, shards: usize) -> Self {
        self.config.store.shard_count = shards;
        self
    }

    pub fn gc_ratio(mut self, ratio: f64) -> Self {
        self.config.store.gc_ratio = ratio;
        self
    }

    pub fn build_workers(mut self, workers: usize) -> Self {
        self.config.build_workers = workers;
        self
    }

    pub fn gc_interval(mut self, interval: u64) -> Self {
        self.config.gc_interval = interval;
        self
    }

    pub fn build(self) -> Result<DatabaseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Search-time settings.
///
/// The relative-score filter and the ORF overlap tolerance are empirically
/// chosen defaults, exposed as tunables rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidates scoring below this fraction of the best candidate are
    /// dropped before alignment
    pub relative_score_threshold: f64,
    /// Accepted ORFs may overlap by at most this many base pairs
    pub orf_overlap_tolerance: usize,
    /// Minimum coding-sequence length in amino acids
    pub min_orf_length: usize,
    /// Substitution matrix name
    pub matrix: String,
    /// Gap opening penalty
    pub gap_open: i32,
    /// Gap extension penalty
    pub gap_extend: i32,
    /// Worker tasks resolving seed lookups
    pub seed_workers: usize,
    /// Capacity of the seed lookup queue
    pub queue_capacity: usize,
    /// Record per-position hit bitmaps for positional diagnostics
    pub track_positions: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            relative_score_threshold: 0.2,
            orf_overlap_tolerance: 60,
            min_orf_length: 21,
            matrix: "BLOSUM62".to_string(),
            gap_open: 11,
            gap_extend: 1,
            seed_workers: 4,
            queue_capacity: 1_024,
            track_positions: true,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.relative_score_threshold) {
            return Err(ProtseekError::config(
                "relative_score_threshold",
                "must be within 0.0..=1.0",
            ));
        }
        if self.min_orf_length == 0 {
            return Err(ProtseekError::config("min_orf_length", "must be greater than 0"));
        }
        if self.seed_workers == 0 || self.queue_capacity == 0 {
            return Err(ProtseekError::config(
                "seeding",
                "queue capacity and worker count must be greater than 0",
            ));
        }
        Ok(())
    }
}
