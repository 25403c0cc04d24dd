use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtseekError>;

/// Unified error type for protseek operations.
///
/// Persistence failures are fatal to the owning run: a half-written index is
/// not a usable state, so they propagate instead of being retried. Reads
/// distinguish a missing key from an engine failure. Malformed input records
/// are recoverable: the pipeline skips them and surfaces a count.
#[derive(Debug, Error)]
pub enum ProtseekError {
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),

    #[error("key not found")]
    KeyNotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input error: {0}")]
    Input(String),

    #[error("configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("invalid residue '{0}' at position {1}")]
    InvalidResidue(char, usize),

    #[error("invalid k-mer length {0}, expected {1}")]
    InvalidKmerLength(usize, usize),

    #[error("sequence too short for a single k-mer: {0} residues")]
    UndersizedSequence(usize),

    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl ProtseekError {
    /// Shorthand for a configuration error on a named field.
    pub fn config(field: &str, message: impl Into<String>) -> Self {
        ProtseekError::Configuration { field: field.to_string(), message: message.into() }
    }

    /// Whether this error represents a record worth skipping rather than a
    /// fatal condition.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtseekError::MalformedRecord { .. }
                | ProtseekError::InvalidResidue(_, _)
                | ProtseekError::UndersizedSequence(_)
        )
    }
}
