//! Thin wrapper around the embedded ordered persistence engine.
//!
//! The rest of the crate only relies on the contract exposed here: durable
//! open/close under an explicit loading mode, atomic batched commits,
//! key-ordered full-table iteration with per-prefix grouping, explicit
//! compaction ("flatten") and bounded space reclamation.

use std::path::{Path, PathBuf};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::debug;

use crate::config::{LoadingMode, StoreConfig};
use crate::errors::{ProtseekError, Result};

/// One physical sub-store. Opening failures are fatal to the caller; this
/// layer does not attempt recovery.
pub struct StoreEngine {
    db: DB,
    path: PathBuf,
}

/// A single operation inside an atomic commit.
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl StoreEngine {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        match config.loading_mode {
            LoadingMode::FileIo => {}
            LoadingMode::MemoryMap => {
                opts.set_allow_mmap_reads(true);
            }
        }

        let db = DB::open(&opts, path)?;
        debug!(path = %path.display(), "opened store");
        Ok(Self { db, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a key, reporting a missing key distinctly from an engine failure.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.try_get(key)?.ok_or(ProtseekError::KeyNotFound)
    }

    pub fn try_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    /// Apply a set of operations as one atomic commit. A commit failure is
    /// fatal: the durability invariant cannot be trusted afterwards.
    pub fn commit<I>(&self, ops: I) -> Result<()>
    where
        I: IntoIterator<Item = WriteOp>,
    {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put(key, value) => batch.put(key, value),
                WriteOp::Delete(key) => batch.delete(key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Key-ordered iteration over the full table.
    pub fn iter(&self) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + '_ {
        self.db.iterator(IteratorMode::Start).map(|item| item.map_err(ProtseekError::from))
    }

    /// Key-ordered iteration over all keys sharing a prefix.
    pub fn prefix_iter<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + 'a {
        self.db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|item| item.map_err(ProtseekError::from))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => true,
            })
    }

    /// Stream the full table grouped by the first `prefix_len` key bytes.
    /// The engine's native key ordering makes this a single forward pass.
    pub fn for_each_group<F>(&self, prefix_len: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[(Box<[u8]>, Box<[u8]>)]) -> Result<()>,
    {
        let mut group: Vec<(Box<[u8]>, Box<[u8]>)> = Vec::new();
        let mut prefix: Vec<u8> = Vec::new();

        for item in self.iter() {
            let (key, value) = item?;
            if key.len() < prefix_len {
                // Keys narrower than the grouping prefix (e.g. well-known
                // metadata keys) form their own singleton groups.
                if !group.is_empty() {
                    f(&prefix, &group)?;
                    group.clear();
                }
                prefix = key.to_vec();
                f(&prefix, &[(key, value)])?;
                continue;
            }

            if group.is_empty() || key[..prefix_len] != prefix[..] {
                if !group.is_empty() {
                    f(&prefix, &group)?;
                    group.clear();
                }
                prefix = key[..prefix_len].to_vec();
            }
            group.push((key, value));
        }

        if !group.is_empty() {
            f(&prefix, &group)?;
        }
        Ok(())
    }

    /// Eliminate intermediate levels with a full-range compaction.
    pub fn flatten(&self) -> Result<()> {
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        Ok(())
    }

    /// One reclamation pass. Returns whether the pass made progress, i.e.
    /// the on-disk footprint shrank by at least `ratio`.
    pub fn reclaim(&self, ratio: f64) -> Result<bool> {
        let before = self.disk_usage()?;
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        let after = self.disk_usage()?;

        if before == 0 {
            return Ok(false);
        }
        let reclaimed = before.saturating_sub(after) as f64 / before as f64;
        debug!(path = %self.path.display(), before, after, "reclaim pass");
        Ok(reclaimed >= ratio)
    }

    fn disk_usage(&self) -> Result<u64> {
        Ok(self.db.property_int_value("rocksdb.total-sst-files-size")?.unwrap_or(0))
    }

    /// Force memtable contents down to the persistent layer.
    pub fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_engine(dir: &TempDir) -> StoreEngine {
        StoreEngine::open(&dir.path().join("store"), &StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_commit_and_get() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        engine
            .commit(vec![
                WriteOp::Put(b"a".to_vec(), b"1".to_vec()),
                WriteOp::Put(b"b".to_vec(), b"2".to_vec()),
            ])
            .unwrap();

        assert_eq!(engine.get(b"a").unwrap(), b"1");
        assert!(matches!(engine.get(b"missing"), Err(ProtseekError::KeyNotFound)));
        assert_eq!(engine.try_get(b"missing").unwrap(), None);

        engine.commit(vec![WriteOp::Delete(b"a".to_vec())]).unwrap();
        assert!(engine.try_get(b"a").unwrap().is_none());
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        engine
            .commit(vec![
                WriteOp::Put(vec![2, 0], vec![]),
                WriteOp::Put(vec![1, 1], vec![]),
                WriteOp::Put(vec![1, 0], vec![]),
            ])
            .unwrap();

        let keys: Vec<Vec<u8>> =
            engine.iter().map(|item| item.unwrap().0.to_vec()).collect();
        assert_eq!(keys, vec![vec![1, 0], vec![1, 1], vec![2, 0]]);
    }

    #[test]
    fn test_prefix_grouping() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        engine
            .commit(vec![
                WriteOp::Put(vec![1, 0, 0, 0, 9], vec![]),
                WriteOp::Put(vec![1, 0, 0, 0, 7], vec![]),
                WriteOp::Put(vec![2, 0, 0, 0, 1], vec![]),
            ])
            .unwrap();

        let mut groups = Vec::new();
        engine
            .for_each_group(4, |prefix, entries| {
                groups.push((prefix.to_vec(), entries.len()));
                Ok(())
            })
            .unwrap();

        assert_eq!(groups, vec![(vec![1, 0, 0, 0], 2), (vec![2, 0, 0, 0], 1)]);
    }

    #[test]
    fn test_reclaim_is_bounded_and_safe() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        engine.commit(vec![WriteOp::Put(b"k".to_vec(), vec![0u8; 1024])]).unwrap();
        engine.sync().unwrap();
        engine.flatten().unwrap();

        // A fresh compacted store has nothing to reclaim
        assert!(!engine.reclaim(0.5).unwrap());
    }
}
