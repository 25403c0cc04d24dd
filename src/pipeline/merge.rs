//! Shard merging.
//!
//! The first database is the base; each donor streams its protein records
//! and k-mer entries into the base through the streaming-channel insertion
//! mode. Donor protein ids are remapped by a fixed offset (the base's
//! protein count at the time the donor is absorbed), so the merged id space
//! stays dense. The merge is a set union: no cross-shard ordering matters,
//! and merging the same shards in any order yields the same record and
//! posting sets.

use std::path::Path;

use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::errors::{ProtseekError, Result};
use crate::record::{DatabaseStatistics, STATISTICS_KEY};
use crate::store::StreamEntry;
use crate::types::{CombinationKey, ProteinId};

/// Absorb each donor database into `base`, in order. Returns the merged
/// statistics.
pub fn merge<P: AsRef<Path>>(base: &Database, donor_roots: &[P]) -> Result<DatabaseStatistics> {
    for root in donor_roots {
        let mut config = DatabaseConfig::new(root.as_ref());
        config.store = base.config().store.clone();
        let donor = Database::open(config)?;
        absorb(base, &donor)?;
        base.garbage_collect()?;
    }

    base.flatten()?;
    base.garbage_collect()?;

    let statistics = base.statistics()?;
    info!(
        donors = donor_roots.len(),
        proteins = statistics.protein_count,
        "merge finished"
    );
    Ok(statistics)
}

fn absorb(base: &Database, donor: &Database) -> Result<()> {
    let offset = u32::try_from(base.statistics()?.protein_count)
        .map_err(|_| ProtseekError::Pipeline("merged protein count exceeds id space".into()))?;
    let remap = |id: ProteinId| ProteinId(offset + id.get());

    // Protein records: raw value copy under the remapped id key.
    base.proteins().stream(|tx| {
        for item in donor.proteins().engine().iter() {
            let (key, value) = item?;
            if key.as_ref() == STATISTICS_KEY {
                continue;
            }
            let id = remap(ProteinId::from_key(&key)?);
            let entry =
                StreamEntry { key: id.to_be_bytes().to_vec(), value: value.to_vec(), unique: false };
            tx.send(entry).map_err(|e| ProtseekError::Pipeline(e.to_string()))?;
        }
        Ok(())
    })?;

    // K-mer entries: postings are remapped in place; combination pointers
    // are re-derived against the base's combination store, merging with any
    // pointer the base already holds for the same k-mer.
    base.kmers().stream(|tx| {
        for item in donor.kmers().engine().iter() {
            let (key, value) = item?;
            let entry = match key.len() {
                8 => {
                    let id = remap(ProteinId::from_key(&key[4..])?);
                    let mut posting = key.to_vec();
                    posting[4..].copy_from_slice(&id.to_be_bytes());
                    StreamEntry { key: posting, value: Vec::new(), unique: false }
                }
                4 => {
                    let donor_key = CombinationKey::from_bytes(&value)?;
                    let members: Vec<ProteinId> = donor
                        .combinations()
                        .get_members(&donor_key)?
                        .into_iter()
                        .map(remap)
                        .collect();
                    let rebased = base.combinations().insert(&members, 0)?;

                    let pointer = match base.kmers().try_get(&key)? {
                        Some(existing) => {
                            let existing = CombinationKey::from_bytes(&existing)?;
                            base.combinations()
                                .merge_combination_keys(&[existing, rebased], 0)?
                        }
                        None => rebased,
                    };
                    StreamEntry {
                        key: key.to_vec(),
                        value: pointer.as_bytes().to_vec(),
                        unique: true,
                    }
                }
                other => {
                    return Err(ProtseekError::Input(format!(
                        "k-mer store key of width {}",
                        other
                    )))
                }
            };
            tx.send(entry).map_err(|e| ProtseekError::Pipeline(e.to_string()))?;
        }
        Ok(())
    })?;

    base.combinations().flush()?;

    let mut statistics = base.statistics()?;
    statistics.absorb(&donor.statistics()?);
    base.proteins().put_statistics(&statistics)?;
    base.proteins().flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta::FastaSource;
    use crate::kmer::KmerCodec;
    use crate::pipeline::{build, index_combinations};
    use std::collections::BTreeSet;
    use std::io::{BufReader, Cursor};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn build_db(root: PathBuf, fasta: &str) -> Database {
        let db = Database::open(DatabaseConfig::new(root)).unwrap();
        let mut source =
            FastaSource::from_reader(Box::new(BufReader::new(Cursor::new(fasta.as_bytes().to_vec()))));
        build(&db, &mut source).unwrap();
        db
    }

    /// Entries indexed under a k-mer, by name rather than id, so databases
    /// merged in different orders can be compared.
    fn entries_for(db: &Database, kmer_str: &str) -> BTreeSet<String> {
        let kmer = KmerCodec::new().encode(kmer_str).unwrap();
        db.resolve_kmer(kmer)
            .unwrap()
            .into_iter()
            .map(|id| db.proteins().get_record(id).unwrap().entry)
            .collect()
    }

    fn all_entries(db: &Database) -> BTreeSet<String> {
        let mut entries = BTreeSet::new();
        db.proteins()
            .for_each_record(|_, record| {
                entries.insert(record.entry);
                Ok(())
            })
            .unwrap();
        entries
    }

    const SHARD_A: &str = ">A1\nACDEFGHIK\n";
    const SHARD_B: &str = ">B1\nACDEFGHLM\n>B2\nNPQRSTV\n";
    const SHARD_C: &str = ">C1\nACDEFGH\n";

    #[test]
    fn test_merge_remaps_ids_and_unions_postings() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let base = build_db(dir.path().join("base"), SHARD_A);
        build_db(dir.path().join("donor"), SHARD_B);

        let statistics = merge(&base, &[dir.path().join("donor")])?;
        assert_eq!(statistics.protein_count, 3);
        assert_eq!(statistics.residue_count, 9 + 9 + 7);

        assert_eq!(
            all_entries(&base),
            BTreeSet::from(["A1".to_string(), "B1".to_string(), "B2".to_string()])
        );
        // The shared leading 7-mer now resolves to proteins from both shards
        assert_eq!(
            entries_for(&base, "ACDEFGH"),
            BTreeSet::from(["A1".to_string(), "B1".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_merge_is_associative_as_sets() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        let left = build_db(dir.path().join("l_base"), SHARD_A);
        build_db(dir.path().join("l_b"), SHARD_B);
        build_db(dir.path().join("l_c"), SHARD_C);
        merge(&left, &[dir.path().join("l_b"), dir.path().join("l_c")])?;

        let right = build_db(dir.path().join("r_base"), SHARD_A);
        build_db(dir.path().join("r_b"), SHARD_B);
        build_db(dir.path().join("r_c"), SHARD_C);
        merge(&right, &[dir.path().join("r_c"), dir.path().join("r_b")])?;

        assert_eq!(all_entries(&left), all_entries(&right));
        for kmer in ["ACDEFGH", "CDEFGHI", "NPQRSTV"] {
            assert_eq!(entries_for(&left, kmer), entries_for(&right, kmer), "kmer {}", kmer);
        }
        assert_eq!(left.statistics()?, right.statistics()?);
        Ok(())
    }

    #[test]
    fn test_merge_with_mixed_indexing_states_keeps_all_postings() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        // Base still holds raw postings; donor was combination-indexed, so
        // its side of the shared k-mer arrives as a pointer key.
        let base = build_db(dir.path().join("base"), SHARD_A);
        {
            let donor = build_db(dir.path().join("donor"), SHARD_C);
            index_combinations(&donor)?;
        }

        merge(&base, &[dir.path().join("donor")])?;
        assert_eq!(
            entries_for(&base, "ACDEFGH"),
            BTreeSet::from(["A1".to_string(), "C1".to_string()])
        );
        // Base-only k-mers are untouched by the donor's pointer
        assert_eq!(entries_for(&base, "CDEFGHI"), BTreeSet::from(["A1".to_string()]));

        // The opposite split: indexed base, raw donor
        let indexed_base = build_db(dir.path().join("base2"), SHARD_A);
        index_combinations(&indexed_base)?;
        build_db(dir.path().join("donor2"), SHARD_C);

        merge(&indexed_base, &[dir.path().join("donor2")])?;
        assert_eq!(
            entries_for(&indexed_base, "ACDEFGH"),
            BTreeSet::from(["A1".to_string(), "C1".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_merge_resolves_pointer_conflicts_losslessly() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let base = build_db(dir.path().join("base"), SHARD_A);
        build_db(dir.path().join("donor"), SHARD_C);

        // Both sides hold a combination pointer for the shared k-mer
        index_combinations(&base)?;
        {
            let donor = Database::open(DatabaseConfig::new(dir.path().join("donor")))?;
            index_combinations(&donor)?;
        }

        merge(&base, &[dir.path().join("donor")])?;
        assert_eq!(
            entries_for(&base, "ACDEFGH"),
            BTreeSet::from(["A1".to_string(), "C1".to_string()])
        );
        Ok(())
    }
}
