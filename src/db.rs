//! Database handle tying the three sub-stores together.
//!
//! A database is a directory with three independently openable sub-stores:
//! `kmers/` (postings and combination pointers), `proteins/` (records plus
//! the statistics key) and `combinations/` (content-addressed id sets).

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::record::DatabaseStatistics;
use crate::store::{BatchedStore, CombinationStore, ProteinStore};
use crate::types::{CombinationKey, KmerKey, ProteinId};

pub struct Database {
    config: DatabaseConfig,
    kmers: BatchedStore,
    proteins: ProteinStore,
    combinations: CombinationStore,
}

impl Database {
    /// Open (creating if absent) the database at the configured root.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.root)?;

        let kmers = BatchedStore::open(&config.root.join("kmers"), &config.store)?;
        let proteins = ProteinStore::open(&config.root.join("proteins"), &config.store)?;
        let combinations =
            CombinationStore::open(&config.root.join("combinations"), &config.store)?;

        info!(root = %config.root.display(), "opened database");
        Ok(Self { config, kmers, proteins, combinations })
    }

    /// Convenience open with default settings.
    pub fn open_path<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(DatabaseConfig::new(root.as_ref()))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn kmers(&self) -> &BatchedStore {
        &self.kmers
    }

    pub fn proteins(&self) -> &ProteinStore {
        &self.proteins
    }

    pub fn combinations(&self) -> &CombinationStore {
        &self.combinations
    }

    pub fn statistics(&self) -> Result<DatabaseStatistics> {
        self.proteins.statistics()
    }

    /// Protein ids indexed under a k-mer. A k-mer may hold raw postings, a
    /// combination pointer, or both at once (merging shards in different
    /// indexing states leaves a pointer next to live postings), so the two
    /// sources are always unioned.
    pub fn resolve_kmer(&self, kmer: KmerKey) -> Result<Vec<ProteinId>> {
        let mut ids: BTreeSet<ProteinId> = BTreeSet::new();

        if let Some(pointer) = self.kmers.try_get(&kmer.to_be_bytes())? {
            let key = CombinationKey::from_bytes(&pointer)?;
            ids.extend(self.combinations.get_members(&key)?);
        }
        for item in self.kmers.engine().prefix_iter(&kmer.to_be_bytes()) {
            let (key, _) = item?;
            if key.len() == 8 {
                ids.insert(ProteinId::from_key(&key[4..])?);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Flush all pending writes in every sub-store.
    pub fn flush(&self) -> Result<()> {
        self.kmers.flush()?;
        self.proteins.flush()?;
        self.combinations.flush()
    }

    /// Compact every sub-store down to a single level.
    pub fn flatten(&self) -> Result<()> {
        self.kmers.flatten()?;
        self.proteins.flatten()?;
        self.combinations.flatten()
    }

    /// One bounded GC round across all sub-stores.
    pub fn garbage_collect(&self) -> Result<()> {
        let budget = self.config.store.gc_max_iterations;
        let ratio = self.config.store.gc_ratio;
        self.kmers.garbage_collect(budget, ratio)?;
        self.proteins.garbage_collect(budget, ratio)?;
        self.combinations.garbage_collect(budget, ratio)?;
        Ok(())
    }

    /// Flush, sync and garbage collect every sub-store. The handle stays
    /// usable afterwards; actual file handles close on drop.
    pub fn close(&self) -> Result<()> {
        self.kmers.close()?;
        self.proteins.close()?;
        self.combinations.close()?;
        info!(root = %self.config.root.display(), "closed database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProteinRecord;
    use crate::types::{KmerKey, ProteinId};
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_sub_stores() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("db");
        let db = Database::open_path(&root)?;

        assert!(root.join("kmers").is_dir());
        assert!(root.join("proteins").is_dir());
        assert!(root.join("combinations").is_dir());
        assert_eq!(db.statistics()?.protein_count, 0);
        Ok(())
    }

    #[test]
    fn test_sub_stores_are_independent() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = Database::open_path(dir.path().join("db"))?;

        let id = ProteinId(0);
        db.proteins().put_record(id, &ProteinRecord::new("P1", "ACDEFGH"), 0)?;
        db.kmers().put(KmerKey(7).posting_key(id).to_vec(), Vec::new(), 0)?;
        db.flush()?;

        assert_eq!(db.proteins().get_record(id)?.entry, "P1");
        assert!(db.kmers().try_get(&KmerKey(7).posting_key(id))?.is_some());
        // The protein key does not leak into the k-mer store
        assert!(db.kmers().try_get(&id.to_be_bytes())?.is_none());
        Ok(())
    }
}
