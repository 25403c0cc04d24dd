//! Query seeding: k-mer lookups fanned out over a worker pool, hit counts
//! aggregated per candidate protein.

use std::thread;

use dashmap::DashMap;
use tracing::debug;

use crate::config::SearchConfig;
use crate::db::Database;
use crate::errors::{ProtseekError, Result};
use crate::types::{KmerKey, ProteinId};

/// One candidate protein with its aggregated seed hits.
#[derive(Debug, Clone)]
pub struct SeedMatch {
    pub id: ProteinId,
    /// Matched query k-mer positions ("Kmatch")
    pub matches: usize,
    /// First query k-mer position this candidate matched
    pub first_position: usize,
    /// Per-position hit bitmap, one bit per query k-mer position
    pub positions: Option<Vec<u64>>,
    /// Total query k-mer count
    pub total: usize,
}

impl SeedMatch {
    /// Shift all positional state right by `delta` query positions, used
    /// when an ORF grows upstream and its k-mer window re-anchors.
    pub fn shift_positions(&mut self, delta: usize, new_total: usize) {
        let old_total = self.total;
        self.first_position += delta;
        self.total = new_total;
        if let Some(bits) = &self.positions {
            let mut shifted = vec![0u64; new_total.div_ceil(64)];
            for position in 0..old_total.min(new_total.saturating_sub(delta)) {
                if bits[position / 64] & (1 << (position % 64)) != 0 {
                    let target = position + delta;
                    shifted[target / 64] |= 1 << (target % 64);
                }
            }
            self.positions = Some(shifted);
        }
    }
}

struct HitState {
    matches: usize,
    first_position: usize,
    positions: Option<Vec<u64>>,
}

/// Resolve every query k-mer against the index and aggregate per-protein
/// hit counts. Output is sorted by match count descending, ties broken by
/// first matched position and then id, so results are deterministic.
pub fn seed(db: &Database, query_kmers: &[KmerKey], config: &SearchConfig) -> Result<Vec<SeedMatch>> {
    let total = query_kmers.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let hits: DashMap<ProteinId, HitState> = DashMap::new();
    let (tx, rx) = crossbeam_channel::bounded::<(KmerKey, usize)>(config.queue_capacity);

    thread::scope(|scope| -> Result<()> {
        let mut workers = Vec::with_capacity(config.seed_workers);
        for _ in 0..config.seed_workers {
            let rx = rx.clone();
            let hits = &hits;
            workers.push(scope.spawn(move || -> Result<()> {
                for (kmer, position) in rx.iter() {
                    for id in db.resolve_kmer(kmer)? {
                        let mut state = hits.entry(id).or_insert_with(|| HitState {
                            matches: 0,
                            first_position: position,
                            positions: config
                                .track_positions
                                .then(|| vec![0u64; total.div_ceil(64)]),
                        });
                        state.matches += 1;
                        state.first_position = state.first_position.min(position);
                        if let Some(bits) = &mut state.positions {
                            bits[position / 64] |= 1 << (position % 64);
                        }
                    }
                }
                Ok(())
            }));
        }
        drop(rx);

        for (position, &kmer) in query_kmers.iter().enumerate() {
            tx.send((kmer, position)).map_err(|e| ProtseekError::Pipeline(e.to_string()))?;
        }
        drop(tx);

        for worker in workers {
            worker
                .join()
                .map_err(|_| ProtseekError::Pipeline("seed worker panicked".into()))??;
        }
        Ok(())
    })?;

    let mut matches: Vec<SeedMatch> = hits
        .into_iter()
        .map(|(id, state)| SeedMatch {
            id,
            matches: state.matches,
            first_position: state.first_position,
            positions: state.positions,
            total,
        })
        .collect();
    matches.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then(a.first_position.cmp(&b.first_position))
            .then(a.id.cmp(&b.id))
    });
    debug!(kmers = total, candidates = matches.len(), "seeding finished");
    Ok(matches)
}

/// Drop candidates scoring below `threshold` times the best candidate's
/// match count. Expects the sorted output of [`seed`].
pub fn apply_relative_filter(matches: &mut Vec<SeedMatch>, threshold: f64) {
    let Some(best) = matches.first().map(|m| m.matches) else { return };
    let floor = best as f64 * threshold;
    matches.retain(|m| m.matches as f64 >= floor);
}
