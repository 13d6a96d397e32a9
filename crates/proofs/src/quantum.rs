//! The quantum proof verifier.
//!
//! The provider signs a binding digest over everything the proof claims;
//! trap circuits are drawn from the public corpus by a beacon-derived
//! seed, so a provider cannot cherry-pick circuits it can simulate.

use crate::budget::{WorkBudget, COST_HASH, COST_SIGNATURE, COST_TRAP};
use crate::VerifyContext;
use animica_types::error::{ProofError, VerifierError};
use animica_types::hashing::{hash_domain_parts, sha3_256, DomainTag};
use animica_types::proof::{ProofMetrics, QuantumBody, QuantumTrap};
use animica_types::units::{ln_micro, mul_micro, MUNAT_SCALE};

/// Derives the trap-selection seed:
/// `H("quantum-v1/trap-seed" || beacon(height − 1) || task_id)`.
pub fn trap_seed(beacon_prev: &[u8; 32], task_id: &[u8; 32]) -> [u8; 32] {
    hash_domain_parts(DomainTag::QuantumTrapSeedV1, &[beacon_prev, task_id])
}

/// The mandated corpus index for trap slot `index` under `seed`.
pub fn trap_corpus_index(seed: &[u8; 32], index: u64, corpus_size: u64) -> u64 {
    let digest = sha3_256(&[seed.as_slice(), &index.to_be_bytes()].concat());
    let raw = u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    raw % corpus_size.max(1)
}

fn trap_passes(trap: &QuantumTrap, epsilon: u64, tau: u64) -> bool {
    if trap.expected.len() != trap.observed.len() || trap.expected.is_empty() {
        return false;
    }
    if trap.deterministic {
        // Exact match within ε per outcome.
        trap.expected
            .iter()
            .zip(&trap.observed)
            .all(|(e, o)| e.abs_diff(*o) <= epsilon)
    } else {
        // Total-variation distance ≤ τ.
        let l1: u64 = trap
            .expected
            .iter()
            .zip(&trap.observed)
            .map(|(e, o)| e.abs_diff(*o))
            .sum();
        l1 / 2 <= tau
    }
}

/// Verifies a quantum body and produces its metrics.
pub fn verify(
    body: &QuantumBody,
    ctx: &VerifyContext<'_>,
    budget: &mut WorkBudget,
) -> Result<ProofMetrics, VerifierError> {
    // Provider certificate pinned by key root.
    budget.charge(COST_HASH)?;
    let provider_root = sha3_256(&body.provider_pubkey);
    if !ctx.policy.qpu_roots.contains(&provider_root) {
        return Err(VerifierError::Attestation("provider root not pinned".into()));
    }

    // The α table must carry this hardware family; scoring without a
    // pinned α is refused outright.
    let alpha = *ctx
        .policy
        .alpha_families
        .get(&body.family)
        .ok_or_else(|| ProofError::UnknownFamily(body.family.clone()))?;

    // Provider signature over the binding digest.
    budget.charge(COST_SIGNATURE)?;
    let bind = body.bind_digest();
    ctx.registry
        .verify(body.alg_id, &body.provider_pubkey, &bind, &body.provider_sig)
        .map_err(|e| VerifierError::Attestation(e.to_string()))?;

    // Trap set re-derived from the prior beacon.
    let beacon_prev = ctx
        .beacon
        .beacon(ctx.height.wrapping_sub(1))
        .ok_or_else(|| VerifierError::Binding("beacon unavailable".into()))?;
    let params = &ctx.policy.quantum_traps;
    let total = body.traps.len() as u32;
    if total < params.count_min {
        return Err(VerifierError::TrapFail { passed: 0, total });
    }
    let seed = trap_seed(&beacon_prev, &body.task_id);
    let mut passed = 0u32;
    for (index, trap) in body.traps.iter().enumerate() {
        budget.charge(COST_TRAP)?;
        let mandated = trap_corpus_index(&seed, index as u64, params.corpus_size);
        if trap.corpus_index == mandated && trap_passes(trap, params.epsilon, params.tau) {
            passed += 1;
        }
    }
    // Every trap is a known-answer circuit; one miss fails the proof.
    if passed != total {
        return Err(VerifierError::TrapFail { passed, total });
    }

    // quantum_units = α · qubits · depth · ln(1 + shots).
    let circuit_volume =
        (body.resources.qubits as u64).saturating_mul(body.resources.depth as u64);
    let weighted = mul_micro(circuit_volume.saturating_mul(MUNAT_SCALE), alpha);
    let quantum_units = mul_micro(weighted, ln_micro(body.resources.shots.saturating_add(1)))
        / MUNAT_SCALE;

    Ok(ProofMetrics::Quantum {
        quantum_units,
        traps_ratio: MUNAT_SCALE,
    })
}
