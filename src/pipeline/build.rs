//! Initial database build from a record stream.
//!
//! The reader runs on the calling thread and feeds a bounded queue; a pool
//! of workers validates each record, assigns it the next sequential id and
//! writes the protein record plus one posting per sliding 7-mer. Ids are
//! only consumed by records that pass validation, so the id space stays
//! dense. Every `gc_interval` accepted proteins the reader triggers a
//! bounded GC round to keep disk growth in check during very large loads.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::errors::{ProtseekError, Result};
use crate::fasta::RecordSource;
use crate::kmer::KmerCodec;
use crate::metrics::MetricsCollector;
use crate::record::{DatabaseStatistics, ProteinRecord};
use crate::types::ProteinId;

/// Ingest every record from `source`, returning the statistics written to
/// the database. Building into a populated database appends: ids continue
/// after the existing protein count and statistics accumulate.
pub fn build(db: &Database, source: &mut dyn RecordSource) -> Result<DatabaseStatistics> {
    let config = db.config().clone();
    let metrics = MetricsCollector::new();
    let first_id = u32::try_from(db.statistics()?.protein_count)
        .map_err(|_| ProtseekError::Pipeline("protein count exceeds id space".into()))?;
    let next_id = AtomicU32::new(first_id);
    let feature_keys: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

    let (tx, rx) = crossbeam_channel::bounded::<ProteinRecord>(config.store.queue_capacity);

    thread::scope(|scope| -> Result<()> {
        let mut workers = Vec::with_capacity(config.build_workers);
        for worker in 0..config.build_workers {
            let rx = rx.clone();
            let metrics = &metrics;
            let next_id = &next_id;
            let feature_keys = &feature_keys;
            workers.push(scope.spawn(move || -> Result<()> {
                let codec = KmerCodec::new();
                for record in rx.iter() {
                    // Validate before consuming an id
                    let keys = match codec.encode_sequence(&record.sequence) {
                        Ok(keys) => keys,
                        Err(
                            ProtseekError::UndersizedSequence(_)
                            | ProtseekError::InvalidResidue(..),
                        ) => {
                            warn!(entry = %record.entry, "skipping unencodable record");
                            metrics.record_skipped();
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let id = ProteinId(next_id.fetch_add(1, Ordering::SeqCst));
                    db.proteins().put_record(id, &record, worker)?;
                    for key in &keys {
                        db.kmers().put(key.posting_key(id).to_vec(), Vec::new(), worker)?;
                    }

                    if !record.features.is_empty() {
                        feature_keys.lock().extend(record.features.keys().cloned());
                    }
                    metrics.record_protein(u64::from(record.length), keys.len() as u64);
                }
                Ok(())
            }));
        }
        drop(rx);

        // Reader stays on this thread; malformed records are skipped and
        // counted, end of input closes the queue.
        let mut sent: u64 = 0;
        loop {
            match source.next_record() {
                Ok(Some(record)) => {
                    tx.send(record).map_err(|e| ProtseekError::Pipeline(e.to_string()))?;
                    sent += 1;
                    if sent % config.gc_interval == 0 {
                        debug!(sent, "periodic garbage collection");
                        db.garbage_collect()?;
                    }
                }
                Ok(None) => break,
                Err(ProtseekError::MalformedRecord { line, message }) => {
                    warn!(line, %message, "skipping malformed record");
                    metrics.record_skipped();
                }
                Err(e) => return Err(e),
            }
        }
        drop(tx);

        for worker in workers {
            worker
                .join()
                .map_err(|_| ProtseekError::Pipeline("build worker panicked".into()))??;
        }
        Ok(())
    })?;

    db.flush()?;

    let mut statistics = db.statistics()?;
    metrics.snapshot().apply_to(&mut statistics);
    statistics.feature_keys.extend(feature_keys.into_inner());
    db.proteins().put_statistics(&statistics)?;
    db.proteins().flush()?;

    db.flatten()?;
    db.garbage_collect()?;
    info!(
        proteins = statistics.protein_count,
        kmers = statistics.kmer_count,
        skipped = statistics.skipped_records,
        "build finished"
    );
    Ok(statistics)
}
