//! The hash-lottery share verifier.
//!
//! A share is valid only for the exact header it was mined against: the
//! body is a binding copy of the nonce domain, and the draw digest is
//! re-derived from the context rather than trusted from the prover.

use crate::VerifyContext;
use animica_types::error::VerifierError;
use animica_types::hashing::{hash_domain_parts, DomainTag};
use animica_types::proof::{HashShareBody, ProofMetrics};
use animica_types::units::MUNAT_SCALE;
use num_bigint::BigUint;

/// Derives the draw digest for a nonce domain:
/// `H("nonce-v1" || chain_id || height || parent_hash || mix_seed || nonce)`.
pub fn draw_for(
    chain_id: u32,
    height: u64,
    parent_hash: &[u8; 32],
    mix_seed: &[u8; 32],
    nonce: &[u8; 8],
) -> [u8; 32] {
    hash_domain_parts(
        DomainTag::NonceV1,
        &[
            &chain_id.to_be_bytes(),
            &height.to_be_bytes(),
            parent_hash,
            mix_seed,
            nonce,
        ],
    )
}

/// Re-derives the draw digest for the enclosing header's nonce domain.
pub fn draw_digest(ctx: &VerifyContext<'_>) -> [u8; 32] {
    draw_for(
        ctx.chain_id,
        ctx.height,
        &ctx.parent_hash,
        &ctx.mix_seed,
        &ctx.nonce,
    )
}

/// Verifies the binding and produces the share metrics.
pub fn verify(
    body: &HashShareBody,
    ctx: &VerifyContext<'_>,
) -> Result<ProofMetrics, VerifierError> {
    if body.chain_id != ctx.chain_id {
        return Err(VerifierError::Binding("chain id".into()));
    }
    if body.height != ctx.height {
        return Err(VerifierError::Binding("height".into()));
    }
    if body.parent_hash != ctx.parent_hash {
        return Err(VerifierError::Binding("parent hash".into()));
    }
    if body.mix_seed != ctx.mix_seed {
        return Err(VerifierError::Binding("mix seed".into()));
    }
    if body.nonce != ctx.nonce {
        return Err(VerifierError::Binding("nonce".into()));
    }

    let draw = draw_digest(ctx);
    // Byte-lexicographic order over big-endian digests is numeric order.
    let target_pass = draw <= ctx.policy.share_target;

    // d_ratio = (target + 1) / (draw + 1), µ-scaled and saturating.
    let target = BigUint::from_bytes_be(&ctx.policy.share_target) + 1u8;
    let value = BigUint::from_bytes_be(&draw) + 1u8;
    let ratio = (target * MUNAT_SCALE) / value;
    let d_ratio = u64::try_from(ratio).unwrap_or(u64::MAX);

    Ok(ProofMetrics::HashShare {
        draw,
        d_ratio,
        target_pass,
    })
}
