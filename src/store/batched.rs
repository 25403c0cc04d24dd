//! Batched write layer over the persistence engine.
//!
//! Writers never touch the engine directly: each worker owns one pending
//! map, and a map is committed as a single atomic batch when it reaches the
//! flush threshold or on an explicit flush. Reads consult every pending map
//! before the engine so in-flight writes stay visible across workers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::errors::{ProtseekError, Result};
use crate::store::engine::{StoreEngine, WriteOp};

type PendingMap = HashMap<Vec<u8>, Vec<u8>>;

/// One key/value tuple on the streaming-insert queue. `unique` selects a
/// "replace any earlier version" write, used for combination pointers that
/// must not accumulate superseded versions.
pub struct StreamEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub unique: bool,
}

/// Batched key-value store with sharded pending maps and a streaming-channel
/// insertion mode.
pub struct BatchedStore {
    engine: Arc<StoreEngine>,
    shards: Vec<Mutex<PendingMap>>,
    config: StoreConfig,
}

impl BatchedStore {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let engine = Arc::new(StoreEngine::open(path, config)?);
        let shards = (0..config.shard_count).map(|_| Mutex::new(PendingMap::new())).collect();
        Ok(Self { engine, shards, config: config.clone() })
    }

    pub fn engine(&self) -> &StoreEngine {
        &self.engine
    }

    /// Insert through the given worker's shard. If the key is already
    /// pending with a different value, the batch is flushed first so the
    /// conflict is never silently collapsed; the new value wins afterwards.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, shard: usize) -> Result<()> {
        self.put_inner(key, value, shard, false)
    }

    /// Insert, discarding any earlier pending version of the key outright.
    pub fn put_unique(&self, key: Vec<u8>, value: Vec<u8>, shard: usize) -> Result<()> {
        self.put_inner(key, value, shard, true)
    }

    fn put_inner(&self, key: Vec<u8>, value: Vec<u8>, shard: usize, unique: bool) -> Result<()> {
        let shard = &self.shards[shard % self.shards.len()];
        let mut pending = shard.lock();

        if !unique {
            if let Some(existing) = pending.get(&key) {
                if *existing != value {
                    Self::commit_map(&self.engine, &mut pending)?;
                }
            }
        }

        pending.insert(key, value);
        if pending.len() >= self.config.flush_threshold {
            Self::commit_map(&self.engine, &mut pending)?;
        }
        Ok(())
    }

    /// Read a key, checking every shard's pending entries before the engine.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.try_get(key)?.ok_or(ProtseekError::KeyNotFound)
    }

    pub fn try_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        for shard in &self.shards {
            if let Some(value) = shard.lock().get(key) {
                return Ok(Some(value.clone()));
            }
        }
        self.engine.try_get(key)
    }

    /// Commit every shard's pending entries.
    pub fn flush(&self) -> Result<()> {
        for shard in &self.shards {
            Self::commit_map(&self.engine, &mut shard.lock())?;
        }
        Ok(())
    }

    fn commit_map(engine: &StoreEngine, pending: &mut PendingMap) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        engine.commit(pending.drain().map(|(k, v)| WriteOp::Put(k, v)))
    }

    /// Streaming-channel insertion: `producer` feeds a bounded queue while a
    /// fixed pool of consumers drain it, each owning one pending map with
    /// the usual threshold rule. Returns once the queue is drained and every
    /// consumer's remainder is committed.
    pub fn stream<F>(&self, producer: F) -> Result<()>
    where
        F: FnOnce(&Sender<StreamEntry>) -> Result<()>,
    {
        let (tx, rx) = crossbeam_channel::bounded::<StreamEntry>(self.config.queue_capacity);
        let threshold = self.config.flush_threshold;

        thread::scope(|scope| {
            let mut consumers = Vec::with_capacity(self.config.stream_workers);
            for _ in 0..self.config.stream_workers {
                let rx = rx.clone();
                let engine = Arc::clone(&self.engine);
                consumers.push(scope.spawn(move || -> Result<()> {
                    let mut pending = PendingMap::new();
                    for entry in rx.iter() {
                        if !entry.unique {
                            if let Some(existing) = pending.get(&entry.key) {
                                if *existing != entry.value {
                                    Self::commit_map(&engine, &mut pending)?;
                                }
                            }
                        }
                        pending.insert(entry.key, entry.value);
                        if pending.len() >= threshold {
                            Self::commit_map(&engine, &mut pending)?;
                        }
                    }
                    Self::commit_map(&engine, &mut pending)
                }));
            }
            drop(rx);

            let produced = producer(&tx);
            drop(tx);

            for consumer in consumers {
                consumer
                    .join()
                    .map_err(|_| ProtseekError::Pipeline("stream consumer panicked".into()))??;
            }
            produced
        })
    }

    /// Bounded garbage collection: flush, then reclaim until a pass stops
    /// making progress or the iteration budget runs out. Returns the number
    /// of passes that made progress.
    pub fn garbage_collect(&self, max_iterations: usize, ratio: f64) -> Result<usize> {
        self.flush()?;
        for iteration in 0..max_iterations {
            if !self.engine.reclaim(ratio)? {
                debug!(iteration, "garbage collection settled");
                return Ok(iteration);
            }
        }
        Ok(max_iterations)
    }

    /// Flush and eliminate intermediate levels; run after bulk loads.
    pub fn flatten(&self) -> Result<()> {
        self.flush()?;
        self.engine.flatten()
    }

    /// Flush, sync and run a final collection pass.
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.engine.sync()?;
        let passes = self.garbage_collect(self.config.gc_max_iterations, self.config.gc_ratio)?;
        info!(path = %self.engine.path().display(), passes, "store closed");
        Ok(())
    }
}
