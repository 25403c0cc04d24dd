//! protseek builds and queries a k-mer indexed protein database.
//!
//! Ingestion derives every 7-residue k-mer from each protein sequence and
//! stores an inverted index from encoded k-mer to protein identifiers inside
//! an embedded rocksdb store, writing through a batching layer that amortizes
//! commits. Promiscuous k-mers are compressed through a content-addressed
//! combination store. Search seeds candidate proteins from shared k-mers,
//! discovers open reading frames for nucleotide queries, and ranks the final
//! candidates with affine-gap local alignment statistics.

pub mod config;
pub mod db;
pub mod errors;
pub mod fasta;
pub mod io;
pub mod kmer;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod search;
pub mod store;
pub mod types;

pub use config::{DatabaseConfig, LoadingMode, SearchConfig, StoreConfig};
pub use db::Database;
pub use errors::{ProtseekError, Result};
pub use record::{DatabaseStatistics, ProteinRecord};
pub use types::{CombinationKey, KmerKey, ProteinId};

/// Current version of protseek
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
