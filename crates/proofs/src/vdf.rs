//! The Wesolowski VDF verifier.
//!
//! The input is bound to the randomness beacon, so a delay witness proves
//! sequential time elapsed after that beacon existed. Verification is two
//! modular exponentiations with small exponents, regardless of the claimed
//! iteration count.

use crate::budget::{WorkBudget, COST_MODPOW, COST_PRIME_ROUND};
use crate::VerifyContext;
use animica_types::error::{ProofError, SchemaError, VerifierError};
use animica_types::hashing::{hash_domain, sha3_256, DomainTag};
use animica_types::proof::{ProofMetrics, VdfBody};
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Deterministic Miller-Rabin witnesses; fixed bases keep the check
/// identical on every node.
const MR_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Derives the group element the delay must start from, by expanding the
/// tagged beacon digest to the modulus width and reducing.
pub fn beacon_input(beacon_prev: &[u8; 32], modulus: &BigUint) -> BigUint {
    let digest = hash_domain(DomainTag::VdfInputV1, beacon_prev);
    let width = (modulus.bits() as usize).div_ceil(8);
    let mut expanded = Vec::with_capacity(width);
    let mut counter: u32 = 0;
    while expanded.len() < width {
        let block = sha3_256(&[digest.as_slice(), &counter.to_be_bytes()].concat());
        expanded.extend_from_slice(&block);
        counter += 1;
    }
    expanded.truncate(width);
    let x = BigUint::from_bytes_be(&expanded) % modulus;
    // Keep the element away from the trivial fixed points 0 and 1.
    if x < BigUint::from(2u8) {
        x + 2u8
    } else {
        x
    }
}

fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::one();
    for &p in &MR_BASES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }
    let n_minus_1 = n - &one;
    let s = n_minus_1.trailing_zeros().unwrap_or(0);
    let d = &n_minus_1 >> s;
    'witness: for &a in &MR_BASES {
        let mut x = BigUint::from(a).modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue;
        }
        for _ in 1..s {
            x = (&x * &x) % n;
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Derives the 128-bit challenge prime from `(x, y, T)`.
pub fn hash_to_prime(
    x: &BigUint,
    y: &BigUint,
    iterations: u64,
    budget: &mut WorkBudget,
) -> Result<BigUint, ProofError> {
    let x_bytes = x.to_bytes_be();
    let y_bytes = y.to_bytes_be();
    let mut counter: u64 = 0;
    loop {
        budget.charge(COST_PRIME_ROUND)?;
        let digest = sha3_256(
            &[
                b"wesolowski-l".as_slice(),
                &x_bytes,
                &y_bytes,
                &iterations.to_be_bytes(),
                &counter.to_be_bytes(),
            ]
            .concat(),
        );
        let mut candidate = BigUint::from_bytes_be(&digest[..16]);
        candidate.set_bit(0, true);
        candidate.set_bit(127, true);
        if is_probable_prime(&candidate) {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Verifies a VDF body and produces its metric.
pub fn verify(
    body: &VdfBody,
    ctx: &VerifyContext<'_>,
    budget: &mut WorkBudget,
) -> Result<ProofMetrics, VerifierError> {
    let params = &ctx.policy.vdf;
    let modulus = BigUint::from_bytes_be(&params.modulus);
    if modulus <= BigUint::from(3u8) || params.calibrated_ips == 0 {
        return Err(ProofError::Invalid("vdf policy is degenerate".into()).into());
    }
    if body.iterations == 0 {
        return Err(ProofError::Invalid("zero iterations".into()).into());
    }
    if body.output.len() > params.modulus.len() || body.proof.len() > params.modulus.len() {
        return Err(SchemaError::InvalidValue("vdf element wider than modulus".into()).into());
    }

    let beacon_prev = ctx
        .beacon
        .beacon(ctx.height.wrapping_sub(1))
        .ok_or_else(|| VerifierError::Binding("beacon unavailable".into()))?;
    let x = beacon_input(&beacon_prev, &modulus);
    let y = BigUint::from_bytes_be(&body.output);
    let pi = BigUint::from_bytes_be(&body.proof);
    let one = BigUint::one();
    if y <= one || y >= modulus || pi <= one || pi >= modulus {
        return Err(ProofError::Invalid("element outside the group".into()).into());
    }

    let l = hash_to_prime(&x, &y, body.iterations, budget)?;
    let r = BigUint::from(2u8).modpow(&BigUint::from(body.iterations), &l);
    budget.charge(COST_MODPOW)?;
    let lhs_pi = pi.modpow(&l, &modulus);
    budget.charge(COST_MODPOW)?;
    let lhs_x = x.modpow(&r, &modulus);
    if (lhs_pi * lhs_x) % &modulus != y {
        return Err(ProofError::Invalid("wesolowski check failed".into()).into());
    }

    Ok(ProofMetrics::Vdf {
        vdf_seconds_equiv: body.iterations / params.calibrated_ips,
    })
}
