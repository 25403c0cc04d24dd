use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtseekError, Result};

/// Sequential protein identifier, persisted as a 4-byte big-endian key so the
/// engine's key order matches numeric order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ProteinId(pub u32);

impl ProteinId {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        ProteinId(u32::from_be_bytes(bytes))
    }

    /// Parse an id from a stored key, rejecting keys of the wrong width.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = key
            .try_into()
            .map_err(|_| ProtseekError::Input(format!("protein key of width {}", key.len())))?;
        Ok(Self::from_be_bytes(bytes))
    }
}

impl fmt::Display for ProteinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded 7-residue k-mer. The mapping back to the amino-acid string is
/// reconstructible from the codec tables alone; no side table is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KmerKey(pub u32);

impl KmerKey {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        KmerKey(u32::from_be_bytes(bytes))
    }

    /// Composite posting key: k-mer prefix followed by the protein id, one
    /// entry per (k-mer, protein) occurrence.
    pub fn posting_key(self, id: ProteinId) -> [u8; 8] {
        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&self.to_be_bytes());
        key[4..].copy_from_slice(&id.to_be_bytes());
        key
    }
}

impl fmt::Display for KmerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Content hash over a deduplicated, sorted set of protein ids. The all-zero
/// key is reserved as the "no combination" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombinationKey(pub [u8; 16]);

impl CombinationKey {
    pub const NONE: CombinationKey = CombinationKey([0u8; 16]);

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| ProtseekError::Input(format!("combination key of width {}", bytes.len())))?;
        Ok(CombinationKey(bytes))
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
