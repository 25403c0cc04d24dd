//! End-to-end pipeline coverage: build, combination indexing, merge and
//! search against real on-disk databases.

use std::collections::BTreeSet;
use std::io::{BufReader, Cursor};
use std::path::PathBuf;

use tempfile::TempDir;

use protseek::config::{DatabaseConfig, SearchConfig};
use protseek::db::Database;
use protseek::fasta::FastaSource;
use protseek::kmer::KmerCodec;
use protseek::pipeline::{build, index_combinations, merge};
use protseek::search::SearchEngine;

fn source_from(fasta: &str) -> FastaSource {
    FastaSource::from_reader(Box::new(BufReader::new(Cursor::new(fasta.as_bytes().to_vec()))))
}

fn build_db(root: PathBuf, fasta: &str) -> anyhow::Result<Database> {
    let config = DatabaseConfig::builder(root)
        .build_workers(2)
        .flush_threshold(16)
        .build()?;
    let db = Database::open(config)?;
    build(&db, &mut source_from(fasta))?;
    Ok(db)
}

const CORPUS: &str = "\
>SPIKE kinase domain
MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQ
>HELIX membrane protein
MSTNPKPQRKTKRNTNRRPQDVKFPGG
>TAIL short tail fiber
MADIKTGIFAKRAVIAIT
";

#[test]
fn test_build_index_search_round_trip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = build_db(dir.path().join("db"), CORPUS)?;

    let statistics = db.statistics()?;
    assert_eq!(statistics.protein_count, 3);
    assert_eq!(statistics.skipped_records, 0);

    // A full-length query hits its own protein across the whole k-mer range
    let engine = SearchEngine::new(&db, SearchConfig::default())?;
    let query = "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQ";
    let hits = engine.search_protein("q", query)?;
    assert_eq!(hits[0].entry, "SPIKE");
    assert_eq!(hits[0].kmatch, hits[0].total_kmers);
    assert_eq!(hits[0].identity, 100.0);

    // Combination indexing must not change what a query resolves to
    index_combinations(&db)?;
    let engine = SearchEngine::new(&db, SearchConfig::default())?;
    let indexed_hits = engine.search_protein("q", query)?;
    assert_eq!(indexed_hits.len(), hits.len());
    assert_eq!(indexed_hits[0].entry, "SPIKE");
    assert_eq!(indexed_hits[0].kmatch, hits[0].kmatch);
    Ok(())
}

#[test]
fn test_search_survives_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("db");
    {
        let db = build_db(root.clone(), CORPUS)?;
        db.close()?;
    }

    let db = Database::open_path(&root)?;
    assert_eq!(db.statistics()?.protein_count, 3);

    let engine = SearchEngine::new(&db, SearchConfig::default())?;
    let hits = engine.search_protein("q", "MSTNPKPQRKTKRNTNRRPQDVKFPGG")?;
    assert_eq!(hits[0].entry, "HELIX");
    Ok(())
}

#[test]
fn test_merged_shards_answer_like_one_database() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    // The same corpus split across two shards versus built whole
    let whole = build_db(dir.path().join("whole"), CORPUS)?;
    let base = build_db(
        dir.path().join("base"),
        ">SPIKE kinase domain\nMKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQ\n",
    )?;
    build_db(
        dir.path().join("donor"),
        ">HELIX membrane protein\nMSTNPKPQRKTKRNTNRRPQDVKFPGG\n>TAIL short tail fiber\nMADIKTGIFAKRAVIAIT\n",
    )?
    .close()?;

    merge(&base, &[dir.path().join("donor")])?;
    assert_eq!(base.statistics()?.protein_count, whole.statistics()?.protein_count);
    assert_eq!(base.statistics()?.residue_count, whole.statistics()?.residue_count);

    let codec = KmerCodec::new();
    for query in ["MKTAYIAKQRQISFVKSH", "MSTNPKPQRKTKRNTNRR"] {
        for kmer in codec.encode_sequence(query)? {
            let from_whole: BTreeSet<String> = whole
                .resolve_kmer(kmer)?
                .into_iter()
                .map(|id| whole.proteins().get_record(id).map(|r| r.entry))
                .collect::<protseek::Result<_>>()?;
            let from_merged: BTreeSet<String> = base
                .resolve_kmer(kmer)?
                .into_iter()
                .map(|id| base.proteins().get_record(id).map(|r| r.entry))
                .collect::<protseek::Result<_>>()?;
            assert_eq!(from_whole, from_merged);
        }
    }

    let engine = SearchEngine::new(&base, SearchConfig::default())?;
    let hits = engine.search_protein("q", "MADIKTGIFAKRAVIAIT")?;
    assert_eq!(hits[0].entry, "TAIL");
    Ok(())
}

#[test]
fn test_nucleotide_query_end_to_end() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let protein = format!("M{}", "KTAYIAQR".repeat(4));
    let db = build_db(dir.path().join("db"), &format!(">REP\n{}\n", protein))?;

    // Back-translate the protein into an exact coding sequence
    let codons: String = protein
        .bytes()
        .map(|aa| match aa {
            b'M' => "ATG",
            b'K' => "AAA",
            b'T' => "ACT",
            b'A' => "GCT",
            b'Y' => "TAT",
            b'I' => "ATT",
            b'Q' => "CAA",
            b'R' => "CGT",
            _ => unreachable!(),
        })
        .collect();
    let query = format!("{}TAA", codons);

    let engine = SearchEngine::new(&db, SearchConfig::default())?;
    let hits = engine.search_nucleotide("read", &query)?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].entry, "REP");
    assert_eq!(hits[0].identity, 100.0);
    assert_eq!(hits[0].kmatch, hits[0].total_kmers);
    Ok(())
}
