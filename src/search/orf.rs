//! Open reading frame discovery and genome-wide resolution.
//!
//! Nucleotide queries are translated in all six frames. Within a frame an
//! ORF opens at the first `ATG` after the previous stop; `GTG`/`TTG`
//! codons seen before that opening are remembered as alternate starts, so
//! resolution can later extend a well-supported ORF upstream. An ORF is
//! only emitted once a stop codon (or the frame end) is reached and the
//! translated length meets the minimum CDS length.

use tracing::debug;

use crate::errors::{ProtseekError, Result};

/// Strand of the source sequence an ORF was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// One open reading frame. `start` and `end` are strand-relative nucleotide
/// offsets (`end` exclusive, including the stop codon when present);
/// `alternate_starts` holds strand-relative offsets of upstream `GTG`/`TTG`
/// codons in the same frame.
#[derive(Debug, Clone)]
pub struct Orf {
    pub sequence: String,
    pub strand: Strand,
    pub frame: usize,
    pub start: usize,
    pub end: usize,
    pub alternate_starts: Vec<usize>,
}

impl Orf {
    /// Interval on the forward strand, for overlap comparison across
    /// strands.
    pub fn interval(&self, sequence_length: usize) -> (usize, usize) {
        match self.strand {
            Strand::Forward => (self.start, self.end),
            Strand::Reverse => (sequence_length - self.end, sequence_length - self.start),
        }
    }
}

const START: &[u8; 3] = b"ATG";
const ALTERNATE_STARTS: [&[u8; 3]; 2] = [b"GTG", b"TTG"];
const STOPS: [&[u8; 3]; 3] = [b"TAA", b"TAG", b"TGA"];

/// Standard genetic code; ambiguous codons translate to `X`.
pub fn translate_codon(codon: &[u8]) -> u8 {
    match codon {
        b"TTT" | b"TTC" => b'F',
        b"TTA" | b"TTG" | b"CTT" | b"CTC" | b"CTA" | b"CTG" => b'L',
        b"ATT" | b"ATC" | b"ATA" => b'I',
        b"ATG" => b'M',
        b"GTT" | b"GTC" | b"GTA" | b"GTG" => b'V',
        b"TCT" | b"TCC" | b"TCA" | b"TCG" | b"AGT" | b"AGC" => b'S',
        b"CCT" | b"CCC" | b"CCA" | b"CCG" => b'P',
        b"ACT" | b"ACC" | b"ACA" | b"ACG" => b'T',
        b"GCT" | b"GCC" | b"GCA" | b"GCG" => b'A',
        b"TAT" | b"TAC" => b'Y',
        b"TAA" | b"TAG" | b"TGA" => b'*',
        b"CAT" | b"CAC" => b'H',
        b"CAA" | b"CAG" => b'Q',
        b"AAT" | b"AAC" => b'N',
        b"AAA" | b"AAG" => b'K',
        b"GAT" | b"GAC" => b'D',
        b"GAA" | b"GAG" => b'E',
        b"TGT" | b"TGC" => b'C',
        b"TGG" => b'W',
        b"CGT" | b"CGC" | b"CGA" | b"CGG" | b"AGA" | b"AGG" => b'R',
        b"GGT" | b"GGC" | b"GGA" | b"GGG" => b'G',
        _ => b'X',
    }
}

pub fn reverse_complement(sequence: &str) -> String {
    sequence
        .bytes()
        .rev()
        .map(|base| match base {
            b'A' => 'T',
            b'T' => 'A',
            b'G' => 'C',
            b'C' => 'G',
            _ => 'N',
        })
        .collect()
}

/// Discover every ORF of at least `min_length` amino acids across all six
/// reading frames. The input is validated as a nucleotide sequence first.
pub fn find_orfs(sequence: &str, min_length: usize) -> Result<Vec<Orf>> {
    let normalized = sequence.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(ProtseekError::Input("empty nucleotide query".to_string()));
    }
    if let Some(bad) = normalized.bytes().find(|b| !matches!(b, b'A' | b'C' | b'G' | b'T' | b'N')) {
        return Err(ProtseekError::Input(format!(
            "'{}' is not a nucleotide base",
            bad as char
        )));
    }

    let reverse = reverse_complement(&normalized);
    let mut orfs = Vec::new();
    for (strand, strand_seq) in [(Strand::Forward, &normalized), (Strand::Reverse, &reverse)] {
        for frame in 0..3 {
            scan_frame(strand_seq, strand, frame, min_length, &mut orfs);
        }
    }
    debug!(orfs = orfs.len(), length = normalized.len(), "orf discovery");
    Ok(orfs)
}

fn scan_frame(strand_seq: &str, strand: Strand, frame: usize, min_length: usize, out: &mut Vec<Orf>) {
    let bytes = strand_seq.as_bytes();
    let mut open_at: Option<usize> = None;
    let mut alternates: Vec<usize> = Vec::new();
    let mut amino_acids = String::new();

    let mut offset = frame;
    while offset + 3 <= bytes.len() {
        let codon = &bytes[offset..offset + 3];

        match open_at {
            None => {
                if codon == START {
                    open_at = Some(offset);
                    amino_acids.clear();
                    amino_acids.push('M');
                } else if ALTERNATE_STARTS.iter().any(|&alt| codon == alt) {
                    alternates.push(offset);
                }
            }
            Some(start) => {
                if STOPS.iter().any(|&stop| codon == stop) {
                    emit(&amino_acids, strand, frame, start, offset + 3, &alternates, min_length, out);
                    open_at = None;
                    alternates.clear();
                } else {
                    amino_acids.push(translate_codon(codon) as char);
                }
            }
        }
        offset += 3;
    }

    // Frame ran out while open
    if let Some(start) = open_at {
        emit(&amino_acids, strand, frame, start, offset, &alternates, min_length, out);
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    amino_acids: &str,
    strand: Strand,
    frame: usize,
    start: usize,
    end: usize,
    alternates: &[usize],
    min_length: usize,
    out: &mut Vec<Orf>,
) {
    if amino_acids.len() < min_length {
        return;
    }
    out.push(Orf {
        sequence: amino_acids.to_string(),
        strand,
        frame,
        start,
        end,
        alternate_starts: alternates.to_vec(),
    });
}

/// Re-anchor an ORF to its earliest recorded alternate start, bounded by
/// the best hit: the upstream growth may not exceed the hit's first matched
/// position, so a match anchored right at the current start pins it in
/// place. Returns the number of amino acids the ORF grew by, so the caller
/// can re-slice positional state.
pub fn set_best_start_codon(orf: &mut Orf, strand_seq: &str, first_hit_position: usize) -> usize {
    let chosen = orf
        .alternate_starts
        .iter()
        .copied()
        .filter(|&alt| {
            (orf.start - alt) % 3 == 0 && (orf.start - alt) / 3 <= first_hit_position
        })
        .min();

    let Some(new_start) = chosen else { return 0 };

    let bytes = strand_seq.as_bytes();
    let mut extension = String::with_capacity((orf.start - new_start) / 3);
    // The alternate codon itself reads as the initiator
    extension.push('M');
    let mut offset = new_start + 3;
    while offset < orf.start {
        extension.push(translate_codon(&bytes[offset..offset + 3]) as char);
        offset += 3;
    }

    let grown = extension.len();
    extension.push_str(&orf.sequence);
    orf.sequence = extension;
    orf.start = new_start;
    orf.alternate_starts.clear();
    grown
}

/// Greedily accept ORFs into a non-overlapping set. The input order is the
/// acceptance priority. Two accepted intervals may overlap by at most
/// `tolerance` base pairs; containment in either direction always rejects.
pub fn accept_non_overlapping(
    intervals: &[(usize, usize)],
    tolerance: usize,
) -> Vec<usize> {
    let mut accepted: Vec<usize> = Vec::new();
    'candidates: for (index, &(start, end)) in intervals.iter().enumerate() {
        for &prior in &accepted {
            let (p_start, p_end) = intervals[prior];
            let contains = (start <= p_start && end >= p_end) || (p_start <= start && p_end >= end);
            if contains {
                continue 'candidates;
            }
            let overlap = end.min(p_end).saturating_sub(start.max(p_start));
            if overlap > tolerance {
                continue 'candidates;
            }
        }
        accepted.push(index);
    }
    accepted
}
