//! Query execution: seeding, ORF handling for nucleotide queries, and final
//! alignment scoring.

pub mod align;
pub mod orf;
pub mod seed;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::db::Database;
use crate::errors::{ProtseekError, Result};
use crate::kmer::{KmerCodec, KMER_LENGTH};
use crate::types::ProteinId;

pub use align::{Alignment, KarlinAltschul, MatrixRegistry, ScoringScheme};
pub use orf::{Orf, Strand};
pub use seed::SeedMatch;

use align::align;
use orf::{accept_non_overlapping, find_orfs, reverse_complement, set_best_start_codon};
use seed::{apply_relative_filter, seed};

/// One reported hit, in production order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    /// Query (or ORF) label
    pub query: String,
    /// Matched protein entry identifier
    pub entry: String,
    /// Matched protein id
    pub id: u32,
    /// Matched query k-mer positions
    pub kmatch: usize,
    /// Total query k-mer count
    pub total_kmers: usize,
    pub identity: f64,
    pub similarity: f64,
    pub mismatches: usize,
    pub gap_opens: usize,
    pub aligned_length: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub raw_score: i32,
    pub bit_score: f64,
    pub e_value: f64,
}

/// A database handle plus resolved search settings.
pub struct SearchEngine<'a> {
    db: &'a Database,
    config: SearchConfig,
    codec: KmerCodec,
    scheme: ScoringScheme,
    database_residues: u64,
}

impl<'a> SearchEngine<'a> {
    /// Resolve the configuration against the matrix registry; unknown
    /// matrix/penalty combinations fail here, before any query runs.
    pub fn new(db: &'a Database, config: SearchConfig) -> Result<Self> {
        Self::with_registry(db, config, &MatrixRegistry::standard())
    }

    pub fn with_registry(
        db: &'a Database,
        config: SearchConfig,
        registry: &MatrixRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let scheme = registry.scheme(&config.matrix, config.gap_open, config.gap_extend)?;
        let database_residues = db.statistics()?.residue_count.max(1);
        Ok(Self { db, config, codec: KmerCodec::new(), scheme, database_residues })
    }

    /// Search with a protein query.
    pub fn search_protein(&self, name: &str, sequence: &str) -> Result<Vec<SearchHit>> {
        let sequence = sequence.trim().to_ascii_uppercase();
        let kmers = self.codec.encode_sequence(&sequence)?;

        let mut matches = seed(self.db, &kmers, &self.config)?;
        apply_relative_filter(&mut matches, self.config.relative_score_threshold);
        info!(query = name, candidates = matches.len(), "protein query seeded");

        self.align_candidates(name, &sequence, &matches)
    }

    /// Search with a nucleotide query: discover ORFs, seed each, resolve a
    /// non-overlapping ORF set and align the survivors' candidates.
    pub fn search_nucleotide(&self, name: &str, sequence: &str) -> Result<Vec<SearchHit>> {
        let forward = sequence.trim().to_ascii_uppercase();
        let orfs = find_orfs(&forward, self.config.min_orf_length)?;
        let reverse = reverse_complement(&forward);

        // Seed every ORF that is long enough to carry a k-mer
        let mut scored: Vec<(Orf, Vec<SeedMatch>)> = Vec::with_capacity(orfs.len());
        for orf in orfs {
            let matches = match self.codec.encode_sequence(&orf.sequence) {
                Ok(kmers) => {
                    let mut matches = seed(self.db, &kmers, &self.config)?;
                    apply_relative_filter(&mut matches, self.config.relative_score_threshold);
                    matches
                }
                Err(ProtseekError::UndersizedSequence(_)) => Vec::new(),
                Err(e) => return Err(e),
            };
            scored.push((orf, matches));
        }

        // Best-supported ORFs claim their genomic span first; zero-hit ORFs
        // sort last and only fill leftover space.
        scored.sort_by(|a, b| {
            let best_a = a.1.first().map_or(0, |m| m.matches);
            let best_b = b.1.first().map_or(0, |m| m.matches);
            best_b.cmp(&best_a)
        });

        for (orf, matches) in &mut scored {
            let Some(best) = matches.first() else { continue };
            let strand_seq = match orf.strand {
                Strand::Forward => &forward,
                Strand::Reverse => &reverse,
            };
            let grown = set_best_start_codon(orf, strand_seq, best.first_position);
            if grown > 0 {
                let new_total = orf.sequence.len() + 1 - KMER_LENGTH;
                for m in matches.iter_mut() {
                    m.shift_positions(grown, new_total);
                }
                debug!(start = orf.start, grown, "re-anchored orf start");
            }
        }

        let intervals: Vec<(usize, usize)> =
            scored.iter().map(|(orf, _)| orf.interval(forward.len())).collect();
        let accepted = accept_non_overlapping(&intervals, self.config.orf_overlap_tolerance);
        info!(query = name, orfs = scored.len(), accepted = accepted.len(), "orfs resolved");

        let mut hits = Vec::new();
        for index in accepted {
            let (orf, matches) = &scored[index];
            if matches.is_empty() {
                continue;
            }
            let label = format!(
                "{}|{}-{}({})",
                name,
                orf.start,
                orf.end,
                orf.strand.symbol()
            );
            hits.extend(self.align_candidates(&label, &orf.sequence, matches)?);
        }
        Ok(hits)
    }

    fn align_candidates(
        &self,
        query: &str,
        sequence: &str,
        matches: &[SeedMatch],
    ) -> Result<Vec<SearchHit>> {
        let query_length = sequence.len() as u64;
        matches
            .par_iter()
            .map(|m| {
                let record = self.db.proteins().get_record(m.id)?;
                let alignment = align(sequence, &record.sequence, &self.scheme)?;
                Ok(self.hit(query, &record.entry, m, &alignment, query_length))
            })
            .collect()
    }

    fn hit(
        &self,
        query: &str,
        entry: &str,
        m: &SeedMatch,
        alignment: &Alignment,
        query_length: u64,
    ) -> SearchHit {
        SearchHit {
            query: query.to_string(),
            entry: entry.to_string(),
            id: m.id.get(),
            kmatch: m.matches,
            total_kmers: m.total,
            identity: alignment.identity,
            similarity: alignment.similarity,
            mismatches: alignment.mismatches,
            gap_opens: alignment.gap_opens,
            aligned_length: alignment.aligned_length,
            query_start: alignment.query_start,
            query_end: alignment.query_end,
            target_start: alignment.target_start,
            target_end: alignment.target_end,
            raw_score: alignment.raw_score,
            bit_score: alignment.bit_score,
            e_value: alignment.e_value(query_length, self.database_residues),
        }
    }

    /// Protein ids behind one encoded k-mer, exposed for diagnostics.
    pub fn resolve(&self, kmer: crate::types::KmerKey) -> Result<Vec<ProteinId>> {
        self.db.resolve_kmer(kmer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::fasta::FastaSource;
    use crate::pipeline::build;
    use std::io::{BufReader, Cursor};
    use tempfile::TempDir;

    fn built_db(dir: &TempDir, fasta: &str) -> Database {
        let db = Database::open(DatabaseConfig::new(dir.path().join("db"))).unwrap();
        let mut source =
            FastaSource::from_reader(Box::new(BufReader::new(Cursor::new(fasta.as_bytes().to_vec()))));
        build(&db, &mut source).unwrap();
        db
    }

    #[test]
    fn test_protein_query_finds_and_ranks_hits() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = built_db(
            &dir,
            ">TARGET\nMKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQ\n>DECOY\nWWWWWWWCCCCCCC\n",
        );

        let engine = SearchEngine::new(&db, SearchConfig::default())?;
        let hits = engine.search_protein("q1", "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQ")?;

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.entry, "TARGET");
        assert_eq!(hit.query, "q1");
        assert_eq!(hit.kmatch, hit.total_kmers);
        assert_eq!(hit.identity, 100.0);
        assert!(hit.bit_score > 0.0);
        assert!(hit.e_value < 1e-3);
        Ok(())
    }

    #[test]
    fn test_unknown_matrix_fails_at_construction() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = built_db(&dir, ">P\nACDEFGHIK\n");

        let config = SearchConfig { matrix: "PAM250".to_string(), ..SearchConfig::default() };
        assert!(matches!(
            SearchEngine::new(&db, config),
            Err(ProtseekError::Configuration { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_nucleotide_query_goes_through_orfs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        // 24 alanines: the database protein and the ORF translation agree
        let protein = format!("M{}", "A".repeat(24));
        let db = built_db(&dir, &format!(">ALA\n{}\n", protein));

        let coding: String = ["ATG", &"GCT".repeat(24), "TAA"].concat();
        let engine = SearchEngine::new(&db, SearchConfig::default())?;
        let hits = engine.search_nucleotide("read1", &coding)?;

        assert!(!hits.is_empty());
        assert_eq!(hits[0].entry, "ALA");
        assert!(hits[0].query.starts_with("read1|"));
        assert_eq!(hits[0].identity, 100.0);
        Ok(())
    }

    #[test]
    fn test_undersized_protein_query_is_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db = built_db(&dir, ">P\nACDEFGHIK\n");
        let engine = SearchEngine::new(&db, SearchConfig::default())?;
        assert!(matches!(
            engine.search_protein("q", "ACD"),
            Err(ProtseekError::UndersizedSequence(3))
        ));
        Ok(())
    }
}
