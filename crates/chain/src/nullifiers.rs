//! The live nullifier set.
//!
//! An ordered map from nullifier to expiry height. Reorg handling stages
//! removals and insertions as one transaction: the switch either fully
//! applies or leaves the set untouched.

use animica_types::Nullifier;
use std::collections::BTreeMap;

/// The set of nullifiers that are live on the canonical chain.
#[derive(Default, Clone)]
pub struct NullifierSet {
    live: BTreeMap<Nullifier, u64>,
}

impl NullifierSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Whether `nullifier` is live as of `height`.
    pub fn is_live(&self, nullifier: &Nullifier, height: u64) -> bool {
        self.live.get(nullifier).is_some_and(|expiry| *expiry >= height)
    }

    /// Inserts a nullifier that expires after `expiry` (inclusive).
    pub fn insert(&mut self, nullifier: Nullifier, expiry: u64) {
        self.live.insert(nullifier, expiry);
    }

    /// Reclaims every entry that expired before `height`.
    pub fn expire_below(&mut self, height: u64) {
        self.live.retain(|_, expiry| *expiry >= height);
    }

    /// Applies a reorg transaction: remove the orphaned branch's entries,
    /// then insert the new branch's. Fails without mutating when an
    /// insertion would collide with an entry that survives the removals.
    pub fn apply_switch(
        &mut self,
        removals: &[Nullifier],
        insertions: &[(Nullifier, u64)],
        height: u64,
    ) -> Result<(), Nullifier> {
        let mut staged = self.live.clone();
        for nullifier in removals {
            staged.remove(nullifier);
        }
        for (nullifier, expiry) in insertions {
            if staged.get(nullifier).is_some_and(|e| *e >= height) {
                return Err(*nullifier);
            }
            staged.insert(*nullifier, *expiry);
        }
        self.live = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_follows_ttl() {
        let mut set = NullifierSet::new();
        set.insert([1; 32], 100);
        assert!(set.is_live(&[1; 32], 50));
        assert!(set.is_live(&[1; 32], 100));
        assert!(!set.is_live(&[1; 32], 101));
        set.expire_below(101);
        assert!(set.is_empty());
    }

    #[test]
    fn switch_applies_atomically() {
        let mut set = NullifierSet::new();
        set.insert([1; 32], 100);
        set.insert([2; 32], 100);
        set.apply_switch(&[[1; 32]], &[([3; 32], 120)], 10).unwrap();
        assert!(!set.is_live(&[1; 32], 10));
        assert!(set.is_live(&[3; 32], 10));
    }

    #[test]
    fn conflicting_switch_leaves_set_untouched() {
        let mut set = NullifierSet::new();
        set.insert([1; 32], 100);
        set.insert([2; 32], 100);
        // Inserting [2] again collides with a surviving entry.
        let err = set
            .apply_switch(&[[1; 32]], &[([2; 32], 120)], 10)
            .unwrap_err();
        assert_eq!(err, [2; 32]);
        // The failed switch must not have removed [1].
        assert!(set.is_live(&[1; 32], 10));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn removed_then_reinserted_in_one_switch() {
        let mut set = NullifierSet::new();
        set.insert([1; 32], 100);
        // The new branch also consumes [1]; removal first makes this legal.
        set.apply_switch(&[[1; 32]], &[([1; 32], 200)], 10).unwrap();
        assert!(set.is_live(&[1; 32], 150));
    }
}
