//! Lightweight counters for long-running pipeline passes.
//!
//! Workers bump atomics; the driver thread snapshots them for periodic
//! progress logging and for the final statistics record.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::record::DatabaseStatistics;

#[derive(Debug, Default)]
pub struct MetricsCollector {
    proteins: AtomicU64,
    residues: AtomicU64,
    kmers: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub proteins: u64,
    pub residues: u64,
    pub kmers: u64,
    pub skipped: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_protein(&self, residues: u64, kmers: u64) {
        self.proteins.fetch_add(1, Ordering::Relaxed);
        self.residues.fetch_add(residues, Ordering::Relaxed);
        self.kmers.fetch_add(kmers, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            proteins: self.proteins.load(Ordering::Relaxed),
            residues: self.residues.load(Ordering::Relaxed),
            kmers: self.kmers.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Fold the counters into a statistics record, keeping any feature keys
    /// already accumulated there.
    pub fn apply_to(&self, statistics: &mut DatabaseStatistics) {
        statistics.protein_count += self.proteins;
        statistics.residue_count += self.residues;
        statistics.kmer_count += self.kmers;
        statistics.skipped_records += self.skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_protein(120, 114);
        metrics.record_protein(80, 74);
        metrics.record_skipped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.proteins, 2);
        assert_eq!(snapshot.residues, 200);
        assert_eq!(snapshot.kmers, 188);
        assert_eq!(snapshot.skipped, 1);

        let mut statistics = DatabaseStatistics::default();
        snapshot.apply_to(&mut statistics);
        assert_eq!(statistics.protein_count, 2);
        assert_eq!(statistics.kmer_count, 188);
    }
}
