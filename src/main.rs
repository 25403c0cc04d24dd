use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use protseek::config::{DatabaseConfig, LoadingMode, SearchConfig};
use protseek::db::Database;
use protseek::fasta::{FastaSource, RecordSource};
use protseek::pipeline;
use protseek::search::SearchEngine;

#[derive(Parser)]
#[command(name = "protseek", version, about = "K-mer indexed protein database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryType {
    Protein,
    Nucleotide,
    /// Short nucleotide reads, one query per input record
    Reads,
}

#[derive(Subcommand)]
enum Command {
    /// Build a database from a FASTA file (optionally compressed, '-' reads stdin)
    Build {
        /// Database directory
        #[arg(long)]
        db: PathBuf,
        /// Input FASTA path
        input: PathBuf,
        /// Worker threads
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Pending entries per shard before a batch commit
        #[arg(long, default_value_t = 10_000)]
        flush_threshold: usize,
        /// Engine loading mode: file-io or memory-map
        #[arg(long, default_value = "file-io")]
        loading_mode: String,
        /// Proteins between periodic GC passes
        #[arg(long, default_value_t = 100_000)]
        gc_interval: u64,
    },
    /// Compress postings into combination records
    Index {
        #[arg(long)]
        db: PathBuf,
    },
    /// Merge donor databases into a base database
    Merge {
        /// Base database directory, receives the donors
        #[arg(long)]
        db: PathBuf,
        /// Donor database directories
        donors: Vec<PathBuf>,
    },
    /// Search the database, writing CSV hits in production order
    Search {
        #[arg(long)]
        db: PathBuf,
        /// Query FASTA path ('-' reads stdin)
        query: PathBuf,
        #[arg(long, value_enum, default_value_t = QueryType::Protein)]
        query_type: QueryType,
        /// Substitution matrix
        #[arg(long, default_value = "BLOSUM62")]
        matrix: String,
        #[arg(long, default_value_t = 11)]
        gap_open: i32,
        #[arg(long, default_value_t = 1)]
        gap_extend: i32,
        /// Relative seed-score threshold
        #[arg(long, default_value_t = 0.2)]
        threshold: f64,
        /// Output CSV path; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run garbage collection across all sub-stores
    Gc {
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Build { db, input, workers, flush_threshold, loading_mode, gc_interval } => {
            let config = DatabaseConfig::builder(db)
                .loading_mode(LoadingMode::from_str(&loading_mode)?)
                .flush_threshold(flush_threshold)
                .build_workers(workers)
                .gc_interval(gc_interval)
                .build()?;
            let database = Database::open(config)?;
            let mut source = FastaSource::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;

            let statistics = pipeline::build(&database, &mut source)?;
            database.close()?;
            info!(
                proteins = statistics.protein_count,
                kmers = statistics.kmer_count,
                skipped = statistics.skipped_records,
                "database built"
            );
        }
        Command::Index { db } => {
            let database = Database::open_path(&db)?;
            let rewritten = pipeline::index_combinations(&database)?;
            database.close()?;
            info!(rewritten, "combination index written");
        }
        Command::Merge { db, donors } => {
            anyhow::ensure!(!donors.is_empty(), "at least one donor database is required");
            let database = Database::open_path(&db)?;
            let statistics = pipeline::merge(&database, &donors)?;
            database.close()?;
            info!(proteins = statistics.protein_count, "merge complete");
        }
        Command::Search { db, query, query_type, matrix, gap_open, gap_extend, threshold, output } => {
            let database = Database::open_path(&db)?;
            let config = SearchConfig {
                matrix,
                gap_open,
                gap_extend,
                relative_score_threshold: threshold,
                ..SearchConfig::default()
            };
            let engine = SearchEngine::new(&database, config)?;

            let sink: Box<dyn Write> = match output {
                Some(path) => Box::new(std::fs::File::create(path)?),
                None => Box::new(std::io::stdout()),
            };
            let mut writer = csv::Writer::from_writer(sink);

            let mut source = FastaSource::open(&query)
                .with_context(|| format!("opening {}", query.display()))?;
            loop {
                let record = match source.next_record() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!(error = %e, "skipping malformed query record");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let hits = match query_type {
                    QueryType::Protein => engine.search_protein(&record.entry, &record.sequence)?,
                    QueryType::Nucleotide | QueryType::Reads => {
                        engine.search_nucleotide(&record.entry, &record.sequence)?
                    }
                };
                // Hits are written as they are produced, not re-sorted
                for hit in hits {
                    writer.serialize(hit)?;
                }
            }
            writer.flush()?;
        }
        Command::Gc { db } => {
            let database = Database::open_path(&db)?;
            database.garbage_collect()?;
            info!("garbage collection complete");
        }
    }
    Ok(())
}
