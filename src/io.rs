//! Compressed input handling for sequence files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::errors::{ProtseekError, Result};

/// Opens a file with automatic compression detection.
///
/// niffler autodetects gzip, bzip2, xz, zstd and plain files, so callers can
/// hand over whatever the sequence archive happens to be compressed with.
pub fn open_maybe_compressed<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let (reader, _format) = niffler::get_reader(Box::new(file))
        .map_err(|e| ProtseekError::Input(format!("decompression failed: {}", e)))?;
    Ok(Box::new(BufReader::new(reader)))
}

/// Opens either a file path or stdin when the path is `-`.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    if path.as_ref().to_string_lossy() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        open_maybe_compressed(path)
    }
}
