//! Parallel transaction-signature verification.

use crate::error::CryptoError;
use crate::sign::{verify_transaction, SchemeRegistry};
use animica_types::policy::AlgPolicy;
use animica_types::tx::Transaction;
use rayon::prelude::*;

/// Verifies every transaction signature, fanning out across CPUs.
///
/// Returns the index and error of the first failing transaction in input
/// order; one bad signature rejects the whole batch.
pub fn verify_transactions(
    registry: &SchemeRegistry,
    alg_policy: &AlgPolicy,
    txs: &[Transaction],
) -> Result<(), (usize, CryptoError)> {
    let mut failures: Vec<(usize, CryptoError)> = txs
        .par_iter()
        .enumerate()
        .filter_map(|(idx, tx)| {
            verify_transaction(registry, alg_policy, tx)
                .err()
                .map(|e| (idx, e))
        })
        .collect();
    failures.sort_by_key(|(idx, _)| *idx);
    match failures.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}
