//! Bidirectional mapping between 7-residue amino-acid k-mers and 32-bit keys.
//!
//! The alphabet (20 standard residues plus the `X` placeholder) and a pairing
//! sentinel are enumerated once into two injective tables: pair to integer
//! and integer back to pair. A pair code is `idx(a) + 22 * idx(b)` with the
//! sentinel at index 0, so a lone residue paired with the sentinel fits in
//! the 5 low bits while a full pair needs 9. Encoding packs three full pairs
//! at bit offsets 23, 14 and 5 and the final lone residue below them.

use crate::errors::{ProtseekError, Result};
use crate::types::KmerKey;

/// Fixed k-mer length in residues
pub const KMER_LENGTH: usize = 7;

/// Supported residues; `X` stands in for ambiguous or unknown residues
pub const ALPHABET: &[u8; 21] = b"ACDEFGHIKLMNPQRSTVWYX";

const TABLE_WIDTH: u32 = 22;
const PAIR_MASK: u32 = 0x1ff;
const SINGLE_MASK: u32 = 0x1f;

/// Stateless k-mer codec. Construction builds the residue index tables; all
/// operations after that are pure.
pub struct KmerCodec {
    /// Residue byte to table index (1-based; 0 is the sentinel)
    index: [i8; 256],
    /// Table index back to residue byte
    residue: [u8; 22],
}

impl KmerCodec {
    pub fn new() -> Self {
        let mut index = [-1i8; 256];
        let mut residue = [0u8; 22];
        for (i, &aa) in ALPHABET.iter().enumerate() {
            index[aa as usize] = (i + 1) as i8;
            residue[i + 1] = aa;
        }
        Self { index, residue }
    }

    fn residue_index(&self, byte: u8, position: usize) -> Result<u32> {
        match self.index[byte as usize] {
            -1 => Err(ProtseekError::InvalidResidue(byte as char, position)),
            idx => Ok(idx as u32),
        }
    }

    /// Encode exactly [`KMER_LENGTH`] residues into a key. Shorter, longer or
    /// out-of-alphabet input is rejected, never truncated.
    pub fn encode(&self, kmer: &str) -> Result<KmerKey> {
        let bytes = kmer.as_bytes();
        if bytes.len() != KMER_LENGTH {
            return Err(ProtseekError::InvalidKmerLength(bytes.len(), KMER_LENGTH));
        }

        let mut indices = [0u32; KMER_LENGTH];
        for (pos, &byte) in bytes.iter().enumerate() {
            indices[pos] = self.residue_index(byte, pos)?;
        }

        let p0 = indices[0] + TABLE_WIDTH * indices[1];
        let p1 = indices[2] + TABLE_WIDTH * indices[3];
        let p2 = indices[4] + TABLE_WIDTH * indices[5];
        // The trailing residue pairs with the sentinel (index 0), so its code
        // collapses to the bare residue index.
        let single = indices[6];

        Ok(KmerKey((p0 << 23) | (p1 << 14) | (p2 << 5) | single))
    }

    /// Decode a key back to its residue string. Fails on keys whose bit
    /// groups decode outside the alphabet.
    pub fn decode(&self, key: KmerKey) -> Result<String> {
        let raw = key.get();
        let mut out = Vec::with_capacity(KMER_LENGTH);

        for shift in [23u32, 14, 5] {
            let pair = (raw >> shift) & PAIR_MASK;
            out.push(self.lookup(pair % TABLE_WIDTH)?);
            out.push(self.lookup(pair / TABLE_WIDTH)?);
        }
        out.push(self.lookup(raw & SINGLE_MASK)?);

        // The alphabet is ASCII, so the bytes are valid UTF-8 by construction
        Ok(String::from_utf8(out).map_err(|e| ProtseekError::Input(e.to_string()))?)
    }

    fn lookup(&self, idx: u32) -> Result<u8> {
        if idx == 0 || idx >= TABLE_WIDTH {
            return Err(ProtseekError::Input(format!("residue code {} out of range", idx)));
        }
        Ok(self.residue[idx as usize])
    }

    /// Encode every sliding window of a sequence. Rejects sequences shorter
    /// than one k-mer and sequences containing out-of-alphabet residues.
    pub fn encode_sequence(&self, sequence: &str) -> Result<Vec<KmerKey>> {
        if let Some((pos, ch)) = sequence.chars().enumerate().find(|(_, c)| !c.is_ascii()) {
            return Err(ProtseekError::InvalidResidue(ch, pos));
        }
        let bytes = sequence.as_bytes();
        if bytes.len() < KMER_LENGTH {
            return Err(ProtseekError::UndersizedSequence(bytes.len()));
        }

        let mut keys = Vec::with_capacity(bytes.len() - KMER_LENGTH + 1);
        for start in 0..=bytes.len() - KMER_LENGTH {
            keys.push(self.encode(&sequence[start..start + KMER_LENGTH])?);
        }
        Ok(keys)
    }
}

impl Default for KmerCodec {
    fn default() -> Self {
        Self::new()
    }
}
