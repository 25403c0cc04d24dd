//! Protein record storage keyed by sequential id.
//!
//! Also owns the single well-known statistics key for the database
//! generation; the statistics record lives here rather than in a side file
//! so a copied database directory stays self-describing.

use std::path::Path;

use crossbeam_channel::Sender;

use crate::config::StoreConfig;
use crate::errors::Result;
use crate::record::{DatabaseStatistics, ProteinRecord, STATISTICS_KEY};
use crate::store::batched::{BatchedStore, StreamEntry};
use crate::store::engine::StoreEngine;
use crate::types::ProteinId;

pub struct ProteinStore {
    store: BatchedStore,
}

impl ProteinStore {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Ok(Self { store: BatchedStore::open(path, config)? })
    }

    pub fn put_record(&self, id: ProteinId, record: &ProteinRecord, shard: usize) -> Result<()> {
        self.store.put(id.to_be_bytes().to_vec(), record.to_bytes()?, shard)
    }

    pub fn get_record(&self, id: ProteinId) -> Result<ProteinRecord> {
        ProteinRecord::from_bytes(&self.store.get(&id.to_be_bytes())?)
    }

    pub fn try_get_record(&self, id: ProteinId) -> Result<Option<ProteinRecord>> {
        match self.store.try_get(&id.to_be_bytes())? {
            Some(bytes) => Ok(Some(ProteinRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rewrite a stored record with extra features, keeping the same id.
    /// Enrichment passes use this to fold in annotations from a second
    /// source after the initial build.
    pub fn enrich<F>(&self, id: ProteinId, shard: usize, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut ProteinRecord),
    {
        let mut record = self.get_record(id)?;
        apply(&mut record);
        self.store.put(id.to_be_bytes().to_vec(), record.to_bytes()?, shard)
    }

    pub fn put_statistics(&self, statistics: &DatabaseStatistics) -> Result<()> {
        self.store.put_unique(STATISTICS_KEY.to_vec(), statistics.to_bytes()?, 0)
    }

    /// Statistics for this generation; a database that never finished a
    /// build pass reads as all-zero.
    pub fn statistics(&self) -> Result<DatabaseStatistics> {
        match self.store.try_get(STATISTICS_KEY)? {
            Some(bytes) => DatabaseStatistics::from_bytes(&bytes),
            None => Ok(DatabaseStatistics::default()),
        }
    }

    /// Stream every stored record in id order, skipping the statistics key.
    pub fn for_each_record<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(ProteinId, ProteinRecord) -> Result<()>,
    {
        for item in self.store.engine().iter() {
            let (key, value) = item?;
            if key.as_ref() == STATISTICS_KEY {
                continue;
            }
            f(ProteinId::from_key(&key)?, ProteinRecord::from_bytes(&value)?)?;
        }
        Ok(())
    }

    pub fn engine(&self) -> &StoreEngine {
        self.store.engine()
    }

    /// Streaming-channel insertion, used by shard merges.
    pub fn stream<F>(&self, producer: F) -> Result<()>
    where
        F: FnOnce(&Sender<StreamEntry>) -> Result<()>,
    {
        self.store.stream(producer)
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn flatten(&self) -> Result<()> {
        self.store.flatten()
    }

    pub fn garbage_collect(&self, max_iterations: usize, ratio: f64) -> Result<usize> {
        self.store.garbage_collect(max_iterations, ratio)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> ProteinStore {
        ProteinStore::open(&dir.path().join("proteins"), &StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_record_round_trip_through_store() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = open_store(&dir);

        let record = ProteinRecord::new("P12345", "ACDEFGHIKLMN")
            .with_feature("organism", "Escherichia coli");
        store.put_record(ProteinId(0), &record, 0)?;

        assert_eq!(store.get_record(ProteinId(0))?, record);
        assert!(store.try_get_record(ProteinId(99))?.is_none());
        Ok(())
    }

    #[test]
    fn test_enrich_adds_features_in_place() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = open_store(&dir);

        store.put_record(ProteinId(3), &ProteinRecord::new("Q1", "ACDEFGH"), 0)?;
        store.enrich(ProteinId(3), 0, |record| {
            record.features.insert("pathway".to_string(), "glycolysis".to_string());
        })?;

        let record = store.get_record(ProteinId(3))?;
        assert_eq!(record.sequence, "ACDEFGH");
        assert_eq!(record.features["pathway"], "glycolysis");
        Ok(())
    }

    #[test]
    fn test_statistics_key_is_invisible_to_record_scans() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = open_store(&dir);

        store.put_record(ProteinId(0), &ProteinRecord::new("P1", "ACDEFGH"), 0)?;
        store.put_record(ProteinId(1), &ProteinRecord::new("P2", "IKLMNPQ"), 0)?;
        store.put_statistics(&DatabaseStatistics {
            protein_count: 2,
            residue_count: 14,
            ..DatabaseStatistics::default()
        })?;
        store.flush()?;

        let mut seen = Vec::new();
        store.for_each_record(|id, record| {
            seen.push((id, record.entry));
            Ok(())
        })?;
        assert_eq!(seen, vec![(ProteinId(0), "P1".to_string()), (ProteinId(1), "P2".to_string())]);
        assert_eq!(store.statistics()?.protein_count, 2);
        Ok(())
    }
}
