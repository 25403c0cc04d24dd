//! Record source boundary and the FASTA implementation of it.
//!
//! Format parsers sit outside the indexing core: whatever the input format,
//! a parser yields one [`ProteinRecord`] at a time with its fields
//! normalized into the open feature map, and signals end-of-input and
//! malformed records distinctly so the pipeline can skip and count the
//! latter.

use std::io::BufRead;
use std::path::Path;

use crate::errors::{ProtseekError, Result};
use crate::io::open_input;
use crate::record::ProteinRecord;

/// A stream of parsed protein records.
///
/// `Ok(Some(record))` yields the next record, `Ok(None)` signals end of
/// input, and `Err(ProtseekError::MalformedRecord { .. })` reports a record
/// the caller may skip before pulling the next one.
pub trait RecordSource {
    fn next_record(&mut self) -> Result<Option<ProteinRecord>>;
}

/// FASTA-backed record source. The header word becomes the entry identifier;
/// any remainder of the header line is kept as the `description` feature.
pub struct FastaSource {
    reader: Box<dyn BufRead>,
    pending_header: Option<String>,
    line: usize,
}

impl FastaSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_reader(open_input(path)?))
    }

    pub fn from_reader(reader: Box<dyn BufRead>) -> Self {
        Self { reader, pending_header: None, line: 0 }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(buf.trim_end().to_string()))
    }

    fn record_from(&self, header: &str, sequence: String) -> Result<ProteinRecord> {
        let header = header.trim_start_matches('>');
        let mut parts = header.splitn(2, char::is_whitespace);
        let entry = parts.next().unwrap_or("").to_string();
        if entry.is_empty() {
            return Err(ProtseekError::MalformedRecord {
                line: self.line,
                message: "empty FASTA header".to_string(),
            });
        }
        if sequence.is_empty() {
            return Err(ProtseekError::MalformedRecord {
                line: self.line,
                message: format!("entry '{}' has no sequence", entry),
            });
        }

        let mut record = ProteinRecord::new(entry, sequence);
        if let Some(description) = parts.next() {
            let description = description.trim();
            if !description.is_empty() {
                record.features.insert("description".to_string(), description.to_string());
            }
        }
        Ok(record)
    }
}

impl RecordSource for FastaSource {
    fn next_record(&mut self) -> Result<Option<ProteinRecord>> {
        let header = match self.pending_header.take() {
            Some(header) => header,
            None => loop {
                match self.read_line()? {
                    None => return Ok(None),
                    Some(line) if line.is_empty() => continue,
                    Some(line) if line.starts_with('>') => break line,
                    Some(line) => {
                        return Err(ProtseekError::MalformedRecord {
                            line: self.line,
                            message: format!("sequence data before any header: '{}'", line),
                        })
                    }
                }
            },
        };

        let mut sequence = String::new();
        loop {
            match self.read_line()? {
                None => break,
                Some(line) if line.starts_with('>') => {
                    self.pending_header = Some(line);
                    break;
                }
                Some(line) => sequence.push_str(line.trim()),
            }
        }

        self.record_from(&header, sequence).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn source_from(data: &str) -> FastaSource {
        FastaSource::from_reader(Box::new(BufReader::new(Cursor::new(data.as_bytes().to_vec()))))
    }

    #[test]
    fn test_parses_records_with_descriptions() -> anyhow::Result<()> {
        let mut source = source_from(">P1 dehydrogenase\nACDEFGH\nIKLMN\n>P2\nPQRSTVWY\n");

        let first = source.next_record()?.unwrap();
        assert_eq!(first.entry, "P1");
        assert_eq!(first.sequence, "ACDEFGHIKLMN");
        assert_eq!(first.length, 12);
        assert_eq!(first.features["description"], "dehydrogenase");

        let second = source.next_record()?.unwrap();
        assert_eq!(second.entry, "P2");
        assert!(second.features.is_empty());

        assert!(source.next_record()?.is_none());
        Ok(())
    }

    #[test]
    fn test_malformed_is_distinct_from_eof() {
        let mut source = source_from("ACDEFGH\n");
        assert!(matches!(
            source.next_record(),
            Err(ProtseekError::MalformedRecord { line: 1, .. })
        ));

        let mut source = source_from(">P1\n>P2\nACDEFGH\n");
        // P1 has no sequence: malformed, but the stream continues
        assert!(matches!(source.next_record(), Err(ProtseekError::MalformedRecord { .. })));
        let next = source.next_record().unwrap().unwrap();
        assert_eq!(next.entry, "P2");
    }

    #[test]
    fn test_empty_input_is_end_of_stream() {
        let mut source = source_from("");
        assert!(source.next_record().unwrap().is_none());
    }
}
