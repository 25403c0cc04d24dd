use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Well-known key inside the protein store holding the database statistics
/// record. Longer than the 4-byte protein id keys, so it can never collide
/// with one.
pub const STATISTICS_KEY: &[u8] = b"__database_statistics__";

/// One protein entry: identifier, residue sequence and an open feature map.
///
/// The feature key set varies by input format; parsers normalize their fields
/// into this map before the store ever sees a record. Records are immutable
/// once written except for enrichment passes that add derived features under
/// the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinRecord {
    /// Entry identifier from the source database, e.g. an accession
    pub entry: String,
    /// Amino-acid sequence
    pub sequence: String,
    /// Sequence length in residues
    pub length: u32,
    /// Open feature map: organism, gene ontology terms, pathway, EC number...
    pub features: BTreeMap<String, String>,
}

impl ProteinRecord {
    pub fn new(entry: impl Into<String>, sequence: impl Into<String>) -> Self {
        let sequence = sequence.into();
        let length = sequence.len() as u32;
        Self { entry: entry.into(), sequence, length, features: BTreeMap::new() }
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Aggregate counts for one database generation, computed once per ingestion
/// run and consumed by alignment scoring to derive e-values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStatistics {
    /// Proteins stored
    pub protein_count: u64,
    /// Total residues across all stored proteins
    pub residue_count: u64,
    /// Postings written (one per k-mer occurrence)
    pub kmer_count: u64,
    /// Records skipped as malformed or undersized
    pub skipped_records: u64,
    /// Feature keys observed across all records
    pub feature_keys: BTreeSet<String>,
}

impl DatabaseStatistics {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Fold another generation's counts into this one (used by shard merges).
    pub fn absorb(&mut self, other: &DatabaseStatistics) {
        self.protein_count += other.protein_count;
        self.residue_count += other.residue_count;
        self.kmer_count += other.kmer_count;
        self.skipped_records += other.skipped_records;
        self.feature_keys.extend(other.feature_keys.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let record = ProteinRecord::new("P12345", "ACDEFGHIKLMNPQRSTVWY")
            .with_feature("organism", "Escherichia coli")
            .with_feature("ec", "1.1.1.1");

        assert_eq!(record.length, 20);

        let bytes = record.to_bytes().unwrap();
        let decoded = ProteinRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.features["organism"], "Escherichia coli");
    }

    #[test]
    fn test_statistics_absorb() {
        let mut base = DatabaseStatistics {
            protein_count: 10,
            residue_count: 1000,
            kmer_count: 940,
            skipped_records: 1,
            feature_keys: BTreeSet::from(["organism".to_string()]),
        };
        let donor = DatabaseStatistics {
            protein_count: 5,
            residue_count: 500,
            kmer_count: 470,
            skipped_records: 0,
            feature_keys: BTreeSet::from(["pathway".to_string()]),
        };

        base.absorb(&donor);
        assert_eq!(base.protein_count, 15);
        assert_eq!(base.residue_count, 1500);
        assert_eq!(base.feature_keys.len(), 2);
    }
}
