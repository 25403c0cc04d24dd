//! Combination compression of a built k-mer store.
//!
//! One ordered pass groups postings by their 4-byte k-mer prefix. Each
//! group's protein-id list becomes a combination record and the group is
//! rewritten atomically as a single pointer key, bounding per-k-mer storage
//! for promiscuous k-mers. Groups that already hold a lone pointer are left
//! untouched, so re-running over an indexed store is a fixed point. A
//! background task reclaims space from both stores while the pass runs.

use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info};

use crate::db::Database;
use crate::errors::{ProtseekError, Result};
use crate::store::engine::WriteOp;
use crate::types::{CombinationKey, ProteinId};

const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Compress every k-mer's postings into combination pointers. Returns the
/// number of k-mer groups rewritten.
pub fn index_combinations(db: &Database) -> Result<u64> {
    db.kmers().flush()?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

    let rewritten = thread::scope(|scope| -> Result<u64> {
        let reclaimer = scope.spawn(move || -> Result<()> {
            loop {
                match stop_rx.recv_timeout(RECLAIM_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {
                        debug!("background space reclaim");
                        db.kmers().garbage_collect(1, db.config().store.gc_ratio)?;
                        db.combinations().garbage_collect(1, db.config().store.gc_ratio)?;
                    }
                    _ => return Ok(()),
                }
            }
        });

        let result = compress_groups(db);
        drop(stop_tx);
        reclaimer
            .join()
            .map_err(|_| ProtseekError::Pipeline("reclaim task panicked".into()))??;
        result
    })?;

    db.combinations().flush()?;
    db.kmers().flatten()?;
    db.combinations().flatten()?;
    db.garbage_collect()?;
    info!(rewritten, "combination indexing finished");
    Ok(rewritten)
}

fn compress_groups(db: &Database) -> Result<u64> {
    let mut rewritten: u64 = 0;

    db.kmers().engine().for_each_group(4, |prefix, entries| {
        // Already a lone combination pointer: fixed point, skip.
        if entries.len() == 1 && entries[0].0.len() == 4 {
            return Ok(());
        }

        let mut members: Vec<ProteinId> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match key.len() {
                8 => members.push(ProteinId::from_key(&key[4..])?),
                // A pointer mixed with fresh postings: fold its member set
                // back in so the rewrite stays lossless.
                4 => {
                    let pointer = CombinationKey::from_bytes(value)?;
                    members.extend(db.combinations().get_members(&pointer)?);
                }
                other => {
                    return Err(ProtseekError::Input(format!(
                        "k-mer store key of width {}",
                        other
                    )))
                }
            }
        }

        let combination = db.combinations().insert(&members, 0)?;

        let mut ops: Vec<WriteOp> =
            entries.iter().map(|(key, _)| WriteOp::Delete(key.to_vec())).collect();
        ops.push(WriteOp::Put(prefix.to_vec(), combination.as_bytes().to_vec()));
        db.kmers().engine().commit(ops)?;

        rewritten += 1;
        Ok(())
    })?;

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::kmer::KmerCodec;
    use crate::types::KmerKey;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> Database {
        Database::open(DatabaseConfig::new(dir.path().join("db"))).unwrap()
    }

    fn put_posting(db: &Database, kmer: KmerKey, id: u32) {
        db.kmers().put(kmer.posting_key(ProteinId(id)).to_vec(), Vec::new(), 0).unwrap();
    }

    #[test]
    fn test_postings_collapse_to_pointers() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = open_db(&dir);
        let codec = KmerCodec::new();

        let shared = codec.encode("ACDEFGH")?;
        let lonely = codec.encode("IKLMNPQ")?;
        for id in [1, 2, 3] {
            put_posting(&db, shared, id);
        }
        put_posting(&db, lonely, 9);

        assert_eq!(index_combinations(&db)?, 2);

        // Each k-mer now owns a single 4-byte key holding a pointer
        let pointer = db.kmers().get(&shared.to_be_bytes())?;
        let key = CombinationKey::from_bytes(&pointer)?;
        assert_eq!(
            db.combinations().get_members(&key)?,
            vec![ProteinId(1), ProteinId(2), ProteinId(3)]
        );
        assert!(db.kmers().try_get(&shared.posting_key(ProteinId(1)))?.is_none());

        let pointer = db.kmers().get(&lonely.to_be_bytes())?;
        let key = CombinationKey::from_bytes(&pointer)?;
        assert_eq!(db.combinations().get_members(&key)?, vec![ProteinId(9)]);
        Ok(())
    }

    #[test]
    fn test_reindex_is_a_fixed_point() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = open_db(&dir);
        let codec = KmerCodec::new();

        let kmer = codec.encode("ACDEFGH")?;
        for id in [5, 6] {
            put_posting(&db, kmer, id);
        }

        assert_eq!(index_combinations(&db)?, 1);
        let first = db.kmers().get(&kmer.to_be_bytes())?;

        // Second run rewrites nothing and resolves identically
        assert_eq!(index_combinations(&db)?, 0);
        assert_eq!(db.kmers().get(&kmer.to_be_bytes())?, first);
        Ok(())
    }

    #[test]
    fn test_pointer_mixed_with_new_postings_stays_lossless() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = open_db(&dir);
        let codec = KmerCodec::new();

        let kmer = codec.encode("ACDEFGH")?;
        put_posting(&db, kmer, 1);
        index_combinations(&db)?;

        // A later load adds postings for the same k-mer
        put_posting(&db, kmer, 2);
        index_combinations(&db)?;

        let pointer = db.kmers().get(&kmer.to_be_bytes())?;
        let key = CombinationKey::from_bytes(&pointer)?;
        assert_eq!(db.combinations().get_members(&key)?, vec![ProteinId(1), ProteinId(2)]);
        Ok(())
    }
}
