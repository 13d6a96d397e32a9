//! The AI proof verifier.
//!
//! An AI envelope proves that attested enclave work was done for a task
//! bound to this chain and height. The attestation quote must trace to a
//! pinned vendor root and cover a pinned measurement; the trap receipt is
//! re-derived from the beacon so the prover cannot choose its challenges.

use crate::budget::{WorkBudget, COST_HASH, COST_SIGNATURE, COST_TRAP};
use crate::VerifyContext;
use animica_types::error::VerifierError;
use animica_types::hashing::{hash_domain_parts, sha3_256, DomainTag};
use animica_types::proof::{AiBody, ProofMetrics};
use animica_types::units::MUNAT_SCALE;

/// Derives the trap seed for a task:
/// `H("ai-trap-seed" || beacon(height − 1) || task_id)`.
pub fn trap_seed(beacon_prev: &[u8; 32], task_id: &[u8; 32]) -> [u8; 32] {
    hash_domain_parts(DomainTag::AiTrapSeed, &[beacon_prev, task_id])
}

/// The expected response digest for challenge `index` under `seed`.
pub fn trap_response(seed: &[u8; 32], index: u64) -> [u8; 32] {
    sha3_256(&[seed.as_slice(), &index.to_be_bytes()].concat())
}

/// Verifies an AI body and produces its metrics.
pub fn verify(
    body: &AiBody,
    ctx: &VerifyContext<'_>,
    budget: &mut WorkBudget,
) -> Result<ProofMetrics, VerifierError> {
    // Task binding to the enclosing header.
    if body.task.chain_id != ctx.chain_id {
        return Err(VerifierError::Binding("task chain id".into()));
    }
    if body.task.height != ctx.height {
        return Err(VerifierError::Binding("task height".into()));
    }

    // Attestation: vendor key pinned by root, measurement pinned by policy,
    // quote covering `measurement || task_id`.
    budget.charge(COST_HASH)?;
    let vendor_root = sha3_256(&body.attestation.vendor_pubkey);
    if !ctx.policy.vendor_roots.contains(&vendor_root) {
        return Err(VerifierError::Attestation("vendor root not pinned".into()));
    }
    if !ctx
        .policy
        .ai_measurements
        .contains(&body.attestation.measurement)
    {
        return Err(VerifierError::Attestation("measurement not pinned".into()));
    }
    let task_id = body.task.task_id();
    let quote_msg = [body.attestation.measurement.as_slice(), &task_id].concat();
    budget.charge(COST_SIGNATURE)?;
    ctx.registry
        .verify(
            body.attestation.alg_id,
            &body.attestation.vendor_pubkey,
            &quote_msg,
            &body.attestation.quote_sig,
        )
        .map_err(|e| VerifierError::Attestation(e.to_string()))?;

    // Trap receipt: challenges re-derived from the prior beacon.
    let beacon_prev = ctx
        .beacon
        .beacon(ctx.height.wrapping_sub(1))
        .ok_or_else(|| VerifierError::Binding("beacon unavailable".into()))?;
    let total = body.traps.count;
    if body.traps.responses.len() != total as usize {
        return Err(VerifierError::Binding("trap count mismatch".into()));
    }
    let thresholds = &ctx.policy.ai_traps;
    if total == 0 || total < thresholds.m_min {
        return Err(VerifierError::TrapFail { passed: 0, total });
    }
    let seed = trap_seed(&beacon_prev, &task_id);
    let mut passed = 0u32;
    for (index, response) in body.traps.responses.iter().enumerate() {
        budget.charge(COST_TRAP)?;
        if *response == trap_response(&seed, index as u64) {
            passed += 1;
        }
    }
    let ratio = (passed as u64 * MUNAT_SCALE) / total as u64;
    if ratio < thresholds.r_min {
        return Err(VerifierError::TrapFail { passed, total });
    }

    let qos = body
        .qos
        .map(|q| {
            let score = (q.throughput as u128 * MUNAT_SCALE as u128)
                / (q.throughput as u128 + q.latency_ms as u128 + 1);
            score as u64
        })
        .unwrap_or(0);

    Ok(ProofMetrics::Ai {
        ai_units: body.units,
        traps_ratio: ratio,
        redundancy: body.redundancy as u64 * MUNAT_SCALE,
        qos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestChain;
    use animica_crypto::sign::dilithium;
    use animica_crypto::ALG_ML_DSA_65;
    use animica_types::policy::PolicyBundle;
    use animica_types::proof::{Attestation, QosRecord, TaskBinding, TrapReceipt};
    use animica_types::tx::Address;

    struct Vendor {
        pk: Vec<u8>,
        sk: Vec<u8>,
        measurement: [u8; 32],
    }

    fn pinned_chain(vendor: &Vendor) -> TestChain {
        let mut policy = PolicyBundle::dev().poies;
        policy.vendor_roots = vec![sha3_256(&vendor.pk)];
        policy.ai_measurements = vec![vendor.measurement];
        TestChain::with_policy(policy)
    }

    fn vendor() -> Vendor {
        let (pk, sk) = dilithium::generate_keypair();
        Vendor {
            pk,
            sk,
            measurement: [0x11; 32],
        }
    }

    fn attested_body(vendor: &Vendor, ctx: &VerifyContext<'_>) -> AiBody {
        let task = TaskBinding {
            chain_id: ctx.chain_id,
            height: ctx.height,
            requester: Address::derive(ALG_ML_DSA_65, b"requester key"),
            payload_hash: [0x22; 32],
        };
        let task_id = task.task_id();
        let quote_msg = [vendor.measurement.as_slice(), &task_id].concat();
        let quote_sig = dilithium::sign(&vendor.sk, &quote_msg);

        let beacon_prev = ctx.beacon.beacon(ctx.height - 1).unwrap();
        let seed = trap_seed(&beacon_prev, &task_id);
        let responses: Vec<[u8; 32]> = (0..6).map(|i| trap_response(&seed, i)).collect();

        AiBody {
            attestation: Attestation {
                alg_id: ALG_ML_DSA_65,
                measurement: vendor.measurement,
                quote_sig,
                vendor_pubkey: vendor.pk.clone(),
            },
            qos: Some(QosRecord {
                latency_ms: 120,
                throughput: 900,
            }),
            redundancy: 2,
            task,
            traps: TrapReceipt {
                count: 6,
                responses,
            },
            units: 15,
        }
    }

    #[test]
    fn attested_work_with_honest_traps_verifies() {
        let vendor = vendor();
        let chain = pinned_chain(&vendor);
        let ctx = chain.ctx(5);
        let body = attested_body(&vendor, &ctx);
        let mut budget = WorkBudget::new(10_000);
        let metrics = verify(&body, &ctx, &mut budget).unwrap();
        match metrics {
            ProofMetrics::Ai {
                ai_units,
                traps_ratio,
                redundancy,
                qos,
            } => {
                assert_eq!(ai_units, 15);
                assert_eq!(traps_ratio, MUNAT_SCALE);
                assert_eq!(redundancy, 2 * MUNAT_SCALE);
                assert!(qos > 0);
            }
            _ => panic!("wrong metrics kind"),
        }
    }

    #[test]
    fn unpinned_vendor_rejected() {
        let vendor = vendor();
        let chain = TestChain::new(); // no roots pinned
        let ctx = chain.ctx(5);
        let body = attested_body(&vendor, &ctx);
        let mut budget = WorkBudget::new(10_000);
        assert!(matches!(
            verify(&body, &ctx, &mut budget),
            Err(VerifierError::Attestation(_))
        ));
    }

    #[test]
    fn forged_quote_rejected() {
        let vendor = vendor();
        let chain = pinned_chain(&vendor);
        let ctx = chain.ctx(5);
        let mut body = attested_body(&vendor, &ctx);
        body.task.payload_hash = [0x33; 32]; // quote no longer covers the task
        let mut budget = WorkBudget::new(10_000);
        assert!(matches!(
            verify(&body, &ctx, &mut budget),
            Err(VerifierError::Attestation(_))
        ));
    }

    #[test]
    fn failed_traps_fall_below_threshold() {
        let vendor = vendor();
        let chain = pinned_chain(&vendor);
        let ctx = chain.ctx(5);
        let mut body = attested_body(&vendor, &ctx);
        // Corrupt all but one response: 1/6 < r_min = 0.9.
        for resp in body.traps.responses.iter_mut().skip(1) {
            resp[0] ^= 0xFF;
        }
        let mut budget = WorkBudget::new(10_000);
        assert!(matches!(
            verify(&body, &ctx, &mut budget),
            Err(VerifierError::TrapFail { passed: 1, total: 6 })
        ));
    }

    #[test]
    fn too_few_traps_rejected() {
        let vendor = vendor();
        let chain = pinned_chain(&vendor);
        let ctx = chain.ctx(5);
        let mut body = attested_body(&vendor, &ctx);
        body.traps.count = 2;
        body.traps.responses.truncate(2);
        let mut budget = WorkBudget::new(10_000);
        assert!(matches!(
            verify(&body, &ctx, &mut budget),
            Err(VerifierError::TrapFail { .. })
        ));
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let vendor = vendor();
        let chain = pinned_chain(&vendor);
        let ctx = chain.ctx(5);
        let body = attested_body(&vendor, &ctx);
        let mut budget = WorkBudget::new(10);
        assert!(matches!(
            verify(&body, &ctx, &mut budget),
            Err(VerifierError::Proof(_))
        ));
    }
}
