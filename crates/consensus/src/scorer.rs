//! The PoIES scorer.
//!
//! Maps verified metrics to ψ candidates under the pinned policy, applies
//! the three clamps in fixed order (per-kind cap, escort within a kind,
//! total cap Γ), assembles `S = −ln(u) + Σψ`, and emits the receipts
//! committed under `proofsRoot`. The scorer refuses outright when the
//! active policy's root does not match the header's commitment.

use animica_types::block::Header;
use animica_types::codec::to_bytes_canonical;
use animica_types::error::AdmitError;
use animica_types::hashing::merkle_root;
use animica_types::policy::PolicyBundle;
use animica_types::proof::{ProofKind, ProofMetrics, ProofReceipt, PsiSource};
use animica_types::units::{mul_div, mul_micro, neg_ln_from_draw, MUNAT_SCALE};
use animica_types::Nullifier;
use std::collections::BTreeMap;
use tracing::debug;

/// One envelope's contribution to scoring: its nullifier, its kind, and,
/// when the verifier succeeded, its metrics. A `None` is a skipped
/// envelope whose ψ is zero.
pub struct ScoredEnvelope {
    /// The envelope's nullifier.
    pub nullifier: Nullifier,
    /// The envelope's proof kind.
    pub kind: ProofKind,
    /// Verifier output, absent when the envelope failed verification.
    pub metrics: Option<ProofMetrics>,
}

/// The scorer's full output for one block.
pub struct ScoreBreakdown {
    /// The hash-lottery term `−ln(u)`, µ-nats.
    pub lottery: u64,
    /// Effective ψ per envelope after all clamps, in envelope order.
    pub psi_effective: Vec<u64>,
    /// `Σψ_effective`, µ-nats; never exceeds Γ.
    pub psi_total: u64,
    /// The block score `S`, µ-nats.
    pub score: u64,
    /// One receipt per envelope, in envelope order.
    pub receipts: Vec<ProofReceipt>,
    /// Merkle root of the canonical receipt encodings.
    pub proofs_root: [u8; 32],
}

/// Maps metrics to the pre-escort ψ candidate: `g_kind` is the policy
/// unit scaler applied to the verified unit count, clipped by the
/// per-kind cap. Monotone in the units by construction.
fn psi_candidate(policy: &PolicyBundle, metrics: &ProofMetrics) -> u64 {
    let inputs = metrics.psi_inputs();
    let scaler = policy.poies.unit_scalers.get(inputs.kind).unwrap_or(0);
    let cap = policy.poies.caps.get(inputs.kind).unwrap_or(0);
    inputs.units.saturating_mul(scaler).min(cap)
}

/// Scores a block and applies the acceptance predicate `S ≥ Θ`.
///
/// `draw` is the header's re-derived nonce-domain digest. Θ agreement
/// with the controller is the admission pipeline's check, not the
/// scorer's; here Θ is read from the header.
pub fn score_and_accept(
    bundle: &PolicyBundle,
    header: &Header,
    draw: &[u8; 32],
    envelopes: &[ScoredEnvelope],
) -> Result<ScoreBreakdown, AdmitError> {
    if !bundle.matches(&header.policy_roots) {
        return Err(AdmitError::PolicyRootMismatch);
    }

    let lottery = neg_ln_from_draw(draw);

    // Per-proof cap, then escort ordering within each kind.
    let capped: Vec<u64> = envelopes
        .iter()
        .map(|e| e.metrics.as_ref().map_or(0, |m| psi_candidate(bundle, m)))
        .collect();

    // Escort: the k-th proof of a kind, sorted by ψ descending with
    // insertion order as the tiebreak, is discounted by q^(k−1).
    let mut by_kind: BTreeMap<ProofKind, Vec<usize>> = BTreeMap::new();
    for (idx, envelope) in envelopes.iter().enumerate() {
        if envelope.metrics.is_some() {
            by_kind.entry(envelope.kind).or_default().push(idx);
        }
    }
    let mut escorted = capped.clone();
    let q = bundle.poies.escort_q;
    for indices in by_kind.values() {
        let mut order: Vec<usize> = indices.clone();
        order.sort_by(|a, b| capped[*b].cmp(&capped[*a]).then(a.cmp(b)));
        let mut q_pow = MUNAT_SCALE;
        for idx in order {
            escorted[idx] = mul_micro(capped[idx], q_pow);
            q_pow = mul_micro(q_pow, q);
        }
    }

    // Total cap: uniform scaling to Γ, floor-rounded per proof.
    let sum: u64 = escorted.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
    let gamma = bundle.poies.gamma;
    let psi_effective: Vec<u64> = if sum > gamma {
        escorted.iter().map(|v| mul_div(*v, gamma, sum)).collect()
    } else {
        escorted
    };
    let psi_total: u64 = psi_effective.iter().sum();

    let score = lottery.saturating_add(psi_total);

    // Receipts in envelope order; failed envelopes get an empty record so
    // the commitment still covers every envelope position.
    let receipts: Vec<ProofReceipt> = envelopes
        .iter()
        .zip(&capped)
        .map(|(envelope, capped_psi)| match &envelope.metrics {
            Some(metrics) => ProofReceipt {
                metrics: metrics.receipt_subset(),
                nullifier: envelope.nullifier,
                psi_input: *capped_psi,
                kind: envelope.kind,
                units: metrics.psi_inputs().units,
            },
            None => ProofReceipt {
                metrics: BTreeMap::new(),
                nullifier: envelope.nullifier,
                psi_input: 0,
                kind: envelope.kind,
                units: 0,
            },
        })
        .collect();
    let encoded: Vec<Vec<u8>> = receipts.iter().map(to_bytes_canonical).collect();
    let proofs_root = merkle_root(&encoded);

    if score < header.theta {
        debug!(score, theta = header.theta, "acceptance predicate failed");
        return Err(AdmitError::AcceptanceFailed {
            score,
            theta: header.theta,
        });
    }

    Ok(ScoreBreakdown {
        lottery,
        psi_effective,
        psi_total,
        score,
        receipts,
        proofs_root,
    })
}
