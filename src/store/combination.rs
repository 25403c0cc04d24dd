//! Content-addressed storage for protein-id sets.
//!
//! Promiscuous k-mers can hit thousands of proteins; instead of keeping one
//! posting per protein per k-mer forever, the shared member set is stored
//! once under its content hash and every k-mer with that exact set points at
//! the same 16-byte key. The hash is a function of the member *set*, so
//! order and duplicates in the input never change the derived key.

use std::collections::BTreeSet;
use std::path::Path;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::StoreConfig;
use crate::errors::{ProtseekError, Result};
use crate::store::batched::BatchedStore;
use crate::types::{CombinationKey, ProteinId};

/// Width of the occurrence counter prefix in a stored combination value.
const COUNTER_WIDTH: usize = 4;

pub struct CombinationStore {
    store: BatchedStore,
    // Serializes the read-modify-write paths (counter bump, key merge).
    // One lock per store instance; conflicts are rare relative to inserts.
    write_lock: Mutex<()>,
}

impl CombinationStore {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Ok(Self { store: BatchedStore::open(path, config)?, write_lock: Mutex::new(()) })
    }

    /// Derive the content hash and stored value for an id set. Pure: the
    /// input is deduplicated and sorted first, so any ordering of the same
    /// members yields an identical pair. The returned value carries an
    /// occurrence counter of 1.
    pub fn create_value(ids: &[ProteinId]) -> (CombinationKey, Vec<u8>) {
        let members: BTreeSet<ProteinId> = ids.iter().copied().collect();

        let mut concat = Vec::with_capacity(members.len() * 4);
        for id in &members {
            concat.extend_from_slice(&id.to_be_bytes());
        }

        let digest = Sha256::digest(&concat);
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);

        let mut value = Vec::with_capacity(COUNTER_WIDTH + concat.len());
        value.extend_from_slice(&1u32.to_be_bytes());
        value.extend_from_slice(&concat);
        (CombinationKey(key), value)
    }

    /// Insert an id set, returning its combination key. If the set is
    /// already stored its occurrence counter is bumped instead.
    pub fn insert(&self, ids: &[ProteinId], shard: usize) -> Result<CombinationKey> {
        let (key, value) = Self::create_value(ids);

        let _guard = self.write_lock.lock();
        match self.store.try_get(key.as_bytes())? {
            Some(existing) => {
                let bumped = bump_counter(&existing)?;
                self.store.put_unique(key.as_bytes().to_vec(), bumped, shard)?;
            }
            None => {
                self.store.put_unique(key.as_bytes().to_vec(), value, shard)?;
            }
        }
        Ok(key)
    }

    /// Member ids stored under a combination key. The sentinel key reads as
    /// the empty set.
    pub fn get_members(&self, key: &CombinationKey) -> Result<Vec<ProteinId>> {
        if key.is_none() {
            return Ok(Vec::new());
        }
        let value = self.store.get(key.as_bytes())?;
        decode_members(&value)
    }

    /// Occurrence counter for a stored combination.
    pub fn get_count(&self, key: &CombinationKey) -> Result<u32> {
        let value = self.store.get(key.as_bytes())?;
        if value.len() < COUNTER_WIDTH {
            return Err(ProtseekError::Input("combination value too short".to_string()));
        }
        let mut counter = [0u8; 4];
        counter.copy_from_slice(&value[..COUNTER_WIDTH]);
        Ok(u32::from_be_bytes(counter))
    }

    /// Union the member sets behind the given keys into one fresh
    /// combination, returning the merged key. Used when previously distinct
    /// combinations are found to co-occur under one k-mer.
    pub fn merge_combination_keys(
        &self,
        keys: &[CombinationKey],
        shard: usize,
    ) -> Result<CombinationKey> {
        let mut union: BTreeSet<ProteinId> = BTreeSet::new();
        for key in keys {
            union.extend(self.get_members(key)?);
        }
        let members: Vec<ProteinId> = union.into_iter().collect();
        debug!(sources = keys.len(), members = members.len(), "merged combination keys");
        self.insert(&members, shard)
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn flatten(&self) -> Result<()> {
        self.store.flatten()
    }

    pub fn garbage_collect(&self, max_iterations: usize, ratio: f64) -> Result<usize> {
        self.store.garbage_collect(max_iterations, ratio)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

fn bump_counter(value: &[u8]) -> Result<Vec<u8>> {
    if value.len() < COUNTER_WIDTH {
        return Err(ProtseekError::Input("combination value too short".to_string()));
    }
    let mut counter = [0u8; 4];
    counter.copy_from_slice(&value[..COUNTER_WIDTH]);
    let count = u32::from_be_bytes(counter).saturating_add(1);

    let mut bumped = value.to_vec();
    bumped[..COUNTER_WIDTH].copy_from_slice(&count.to_be_bytes());
    Ok(bumped)
}

fn decode_members(value: &[u8]) -> Result<Vec<ProteinId>> {
    let ids = &value[COUNTER_WIDTH.min(value.len())..];
    if value.len() < COUNTER_WIDTH || ids.len() % 4 != 0 {
        return Err(ProtseekError::Input("combination value too short".to_string()));
    }
    ids.chunks_exact(4).map(ProteinId::from_key).collect()
}
