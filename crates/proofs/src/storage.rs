//! The storage heartbeat verifier.
//!
//! A heartbeat proves a dataset was held across a window of blocks. The
//! window must anchor to recent chain heights, and the opened leaves are
//! chosen by a beacon-derived seed so the provider cannot precompute a
//! sparse subset.

use crate::budget::{WorkBudget, COST_HASH, COST_PATH_NODE};
use crate::VerifyContext;
use animica_types::error::{SchemaError, VerifierError};
use animica_types::hashing::{hash_domain_parts, sha3_256, DomainTag};
use animica_types::proof::{ProofMetrics, StorageBody, StorageChallenge};
use animica_types::units::MUNAT_SCALE;

/// Derives the challenge seed for a window:
/// `H("storage-v1/challenge" || beacon(window_end) || dataset_root)`.
pub fn challenge_seed(beacon_anchor: &[u8; 32], dataset_root: &[u8; 32]) -> [u8; 32] {
    hash_domain_parts(
        DomainTag::StorageChallengeV1,
        &[beacon_anchor, dataset_root],
    )
}

/// The mandated leaf index for challenge slot `index` under `seed`.
pub fn challenge_index(seed: &[u8; 32], index: u64, leaf_count: u64) -> u64 {
    let digest = sha3_256(&[seed.as_slice(), &index.to_be_bytes()].concat());
    let raw = u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    raw % leaf_count.max(1)
}

/// Folds a Merkle opening; sibling side follows the index bits, and the
/// path must consume the index completely.
fn opening_anchors(challenge: &StorageChallenge, root: &[u8; 32]) -> bool {
    let mut node = sha3_256(&challenge.leaf);
    let mut idx = challenge.leaf_index;
    for sibling in &challenge.path {
        let mut joined = [0u8; 64];
        if idx & 1 == 1 {
            joined[..32].copy_from_slice(sibling);
            joined[32..].copy_from_slice(&node);
        } else {
            joined[..32].copy_from_slice(&node);
            joined[32..].copy_from_slice(sibling);
        }
        node = sha3_256(&joined);
        idx >>= 1;
    }
    idx == 0 && node == *root
}

/// Verifies a storage body and produces its metrics.
pub fn verify(
    body: &StorageBody,
    ctx: &VerifyContext<'_>,
    budget: &mut WorkBudget,
) -> Result<ProofMetrics, VerifierError> {
    let params = &ctx.policy.storage;

    // Window shape and anchoring.
    if body.window_end < body.window_start {
        return Err(SchemaError::InvalidValue("window ends before it starts".into()).into());
    }
    if body.window_end - body.window_start + 1 != params.window_blocks {
        return Err(VerifierError::Binding("window length".into()));
    }
    if body.window_end >= ctx.height {
        return Err(VerifierError::Binding("window not sealed".into()));
    }
    if ctx.height - body.window_end > params.anchor_max_lag {
        return Err(VerifierError::Binding("window anchor too old".into()));
    }
    if body.leaf_count == 0 {
        return Err(SchemaError::InvalidValue("empty dataset".into()).into());
    }
    if body.challenges.len() != params.challenge_count as usize {
        return Err(VerifierError::Binding("challenge count".into()));
    }

    let beacon_anchor = ctx
        .beacon
        .beacon(body.window_end)
        .ok_or_else(|| VerifierError::Binding("beacon unavailable".into()))?;
    let seed = challenge_seed(&beacon_anchor, &body.dataset_root);

    let total = (body.challenges.len() as u64).max(1);
    let mut passed = 0u64;
    for (slot, challenge) in body.challenges.iter().enumerate() {
        budget.charge(COST_HASH)?;
        budget.charge(COST_PATH_NODE * challenge.path.len() as u64)?;
        let mandated = challenge_index(&seed, slot as u64, body.leaf_count);
        if challenge.leaf_index == mandated
            && challenge.leaf_index < body.leaf_count
            && opening_anchors(challenge, &body.dataset_root)
        {
            passed += 1;
        }
    }
    let availability = passed * MUNAT_SCALE / total;

    Ok(ProofMetrics::Storage {
        redundancy: body.redundancy as u64 * MUNAT_SCALE,
        availability,
        capacity: body.capacity_bytes,
    })
}
