#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

//! # Animica Proof Verifiers
//!
//! Per-kind validation of proof envelopes. Each verifier is a pure
//! function of `(body, context)`: the context carries the enclosing
//! header's binding material, the pinned policy, and a view of the beacon
//! history — never a wall clock or local randomness. Verification is
//! parallelizable per envelope; results return to the serial admission
//! task as owned records.

pub mod ai;
pub mod budget;
pub mod hashshare;
pub mod quantum;
pub mod storage;
pub mod vdf;

use animica_crypto::SchemeRegistry;
use animica_types::error::VerifierError;
use animica_types::policy::PoiesPolicy;
use animica_types::proof::{ProofBody, ProofEnvelope, ProofMetrics};
use animica_types::Nullifier;
use budget::WorkBudget;
use rayon::prelude::*;
use tracing::debug;

/// Read access to the beacon history the verifiers bind proofs to.
///
/// The chain state implements this over admitted headers' mix seeds; tests
/// use fixed tables.
pub trait BeaconView: Sync {
    /// The beacon output at `height`, if that height is known.
    fn beacon(&self, height: u64) -> Option<[u8; 32]>;
}

/// A beacon view over a fixed table, for tests and detached verification.
pub struct FixedBeacon {
    /// The height of the first entry.
    pub start: u64,
    /// Beacon outputs for consecutive heights from `start`.
    pub entries: Vec<[u8; 32]>,
}

impl BeaconView for FixedBeacon {
    fn beacon(&self, height: u64) -> Option<[u8; 32]> {
        let idx = height.checked_sub(self.start)? as usize;
        self.entries.get(idx).copied()
    }
}

/// The enclosing header's binding material plus pinned inputs.
pub struct VerifyContext<'a> {
    /// The local chain id.
    pub chain_id: u32,
    /// Height of the enclosing block.
    pub height: u64,
    /// Parent hash of the enclosing header.
    pub parent_hash: [u8; 32],
    /// Mix seed of the enclosing header.
    pub mix_seed: [u8; 32],
    /// Nonce of the enclosing header.
    pub nonce: [u8; 8],
    /// The active PoIES policy.
    pub policy: &'a PoiesPolicy,
    /// The signature scheme registry.
    pub registry: &'a SchemeRegistry,
    /// The beacon history.
    pub beacon: &'a dyn BeaconView,
}

/// Verifies one envelope: nullifier re-derivation first, then the
/// kind-specific checks, charging `budget` as work is done.
pub fn verify_envelope(
    envelope: &ProofEnvelope,
    ctx: &VerifyContext<'_>,
    budget: &mut WorkBudget,
) -> Result<ProofMetrics, VerifierError> {
    budget.charge(budget::COST_HASH)?;
    if envelope.body.nullifier() != envelope.nullifier {
        return Err(VerifierError::NullifierMismatch);
    }
    match &envelope.body {
        ProofBody::HashShare(body) => hashshare::verify(body, ctx),
        ProofBody::Ai(body) => ai::verify(body, ctx, budget),
        ProofBody::Quantum(body) => quantum::verify(body, ctx, budget),
        ProofBody::Storage(body) => storage::verify(body, ctx, budget),
        ProofBody::Vdf(body) => vdf::verify(body, ctx, budget),
    }
}

/// The outcome for one envelope, in block order.
pub struct EnvelopeOutcome {
    /// The envelope's position in the block.
    pub index: usize,
    /// The envelope's claimed nullifier.
    pub nullifier: Nullifier,
    /// Metrics on success; the typed failure otherwise.
    pub result: Result<ProofMetrics, VerifierError>,
}

/// Verifies every envelope of a block, fanning out across CPUs.
///
/// Each envelope gets its own fresh work budget of `budget_units`, so a
/// slow envelope cannot starve its neighbors. Outcomes are returned in
/// input order; failures are recorded, not raised, because an envelope
/// failure only zeroes that envelope's contribution.
pub fn verify_all(
    envelopes: &[ProofEnvelope],
    ctx: &VerifyContext<'_>,
    budget_units: u64,
) -> Vec<EnvelopeOutcome> {
    let mut outcomes: Vec<EnvelopeOutcome> = envelopes
        .par_iter()
        .enumerate()
        .map(|(index, envelope)| {
            let mut budget = WorkBudget::new(budget_units);
            let result = verify_envelope(envelope, ctx, &mut budget);
            if let Err(err) = &result {
                debug!(index, kind = envelope.body.kind().name(), %err, "envelope failed verification");
            }
            EnvelopeOutcome {
                index,
                nullifier: envelope.nullifier,
                result,
            }
        })
        .collect();
    outcomes.sort_by_key(|o| o.index);
    outcomes
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use animica_types::policy::PolicyBundle;

    /// A context over a dev policy and a three-entry beacon table.
    pub struct TestChain {
        pub policy: PoiesPolicy,
        pub registry: SchemeRegistry,
        pub beacon: FixedBeacon,
    }

    impl TestChain {
        pub fn new() -> Self {
            Self::with_policy(PolicyBundle::dev().poies)
        }

        pub fn with_policy(policy: PoiesPolicy) -> Self {
            Self {
                policy,
                registry: SchemeRegistry::standard(),
                beacon: FixedBeacon {
                    start: 0,
                    entries: (0..32u8).map(|i| [i; 32]).collect(),
                },
            }
        }

        pub fn ctx(&self, height: u64) -> VerifyContext<'_> {
            VerifyContext {
                chain_id: 7,
                height,
                parent_hash: [0xAA; 32],
                mix_seed: [0xBB; 32],
                nonce: [0xCC; 8],
                policy: &self.policy,
                registry: &self.registry,
                beacon: &self.beacon,
            }
        }
    }
}
