//! The header store.
//!
//! Headers are owned by the store and keyed by block hash; parent links
//! are non-owning hash lookups, so branches form a DAG without cyclic
//! ownership. Orphaned branches are reaped by explicit epoch GC.

use animica_consensus::ControllerState;
use animica_types::block::Header;
use animica_types::{BlockHash, Nullifier};
use std::collections::{BTreeMap, HashMap};

/// A header enriched with everything admission computed for it.
#[derive(Debug, Clone)]
pub struct StoredHeader {
    /// The sealed header.
    pub header: Header,
    /// The header's hash, computed once at insertion.
    pub hash: BlockHash,
    /// This block's effective work `w = clamp(S, Θ, Θ + Δ_cap)`, µ-nats.
    pub work: u64,
    /// Cumulative work along the path from genesis, µ-nats.
    pub cumulative_work: u64,
    /// Controller state after this block; `.theta` binds the child.
    pub controller: ControllerState,
    /// Nullifiers this block consumed, in envelope order.
    pub nullifiers_added: Vec<Nullifier>,
}

/// Hash-keyed storage for all known headers, canonical or not.
#[derive(Default)]
pub struct HeaderStore {
    headers: HashMap<BlockHash, StoredHeader>,
    by_number: BTreeMap<u64, Vec<BlockHash>>,
}

impl HeaderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Whether `hash` is known.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.headers.contains_key(hash)
    }

    /// Looks up a stored header.
    pub fn get(&self, hash: &BlockHash) -> Option<&StoredHeader> {
        self.headers.get(hash)
    }

    /// Inserts a stored header; the caller has already validated it.
    pub fn insert(&mut self, stored: StoredHeader) {
        self.by_number
            .entry(stored.header.number)
            .or_default()
            .push(stored.hash);
        self.headers.insert(stored.hash, stored);
    }

    /// Walks parent links from `from` to the ancestor at `height`.
    pub fn ancestor_at(&self, from: &BlockHash, height: u64) -> Option<&StoredHeader> {
        let mut current = self.get(from)?;
        if height > current.header.number {
            return None;
        }
        while current.header.number > height {
            current = self.get(&current.header.parent_hash)?;
        }
        Some(current)
    }

    /// Finds the common ancestor of two stored blocks.
    pub fn fork_point(&self, a: &BlockHash, b: &BlockHash) -> Option<&StoredHeader> {
        let a = self.get(a)?;
        let b = self.get(b)?;
        let common = a.header.number.min(b.header.number);
        let mut a = self.ancestor_at(&a.hash, common)?;
        let mut b = self.ancestor_at(&b.hash, common)?;
        while a.hash != b.hash {
            a = self.get(&a.header.parent_hash)?;
            b = self.get(&b.header.parent_hash)?;
        }
        Some(a)
    }

    /// The path from (exclusive) `ancestor` to (inclusive) `descendant`,
    /// ordered parent-to-child.
    pub fn path_from(
        &self,
        ancestor: &BlockHash,
        descendant: &BlockHash,
    ) -> Option<Vec<BlockHash>> {
        let mut path = Vec::new();
        let mut current = self.get(descendant)?;
        while current.hash != *ancestor {
            path.push(current.hash);
            if current.header.number == 0 {
                return None;
            }
            current = self.get(&current.header.parent_hash)?;
        }
        path.reverse();
        Some(path)
    }

    /// Drops every header strictly below `height`. Reachability from live
    /// tips is the caller's concern; this is the epoch GC primitive.
    pub fn prune_below(&mut self, height: u64) {
        let doomed: Vec<u64> = self.by_number.range(..height).map(|(n, _)| *n).collect();
        for number in doomed {
            if let Some(hashes) = self.by_number.remove(&number) {
                for hash in hashes {
                    self.headers.remove(&hash);
                }
            }
        }
    }
}
