//! Domain-tagged hashing and Merkle tree construction.
//!
//! Every consensus preimage is prefixed with an ASCII domain tag and a
//! single zero byte before hashing, so a digest produced for one purpose
//! can never be replayed as another. The tag vocabulary is closed: tags
//! are an enum, not strings, so an unknown tag is a compile error rather
//! than a runtime branch.

use crate::proof::ProofKind;
use sha3::{Digest, Sha3_256, Sha3_512};

/// The closed vocabulary of hashing domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainTag {
    /// Block header sealing: `"header-v1"`.
    HeaderV1,
    /// Transaction signing preimage: `"tx-v1"`.
    TxV1,
    /// Hash-lottery draw derivation: `"nonce-v1"`.
    NonceV1,
    /// Proof nullifier derivation: `"proof-nullifier/<kind>"`.
    ProofNullifier(ProofKind),
    /// Data-availability commitment: `"da-commit-v1"`.
    DaCommitV1,
    /// Address derivation: `"addr-v1"`.
    AddrV1,
    /// Algorithm-policy root commitment: `"alg-policy-root-v1"` (SHA3-512).
    AlgPolicyRootV1,
    /// AI trap-challenge seed: `"ai-trap-seed"`.
    AiTrapSeed,
    /// Quantum proof binding digest: `"quantum-v1/bind"`.
    QuantumBindV1,
    /// Quantum trap-circuit selection seed: `"quantum-v1/trap-seed"`.
    QuantumTrapSeedV1,
    /// VDF beacon input derivation: `"vdf-v1/input"`.
    VdfInputV1,
    /// Storage challenge index seed: `"storage-v1/challenge"`.
    StorageChallengeV1,
}

impl DomainTag {
    /// The ASCII form of this tag as it enters the hash preimage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeaderV1 => "header-v1",
            Self::TxV1 => "tx-v1",
            Self::NonceV1 => "nonce-v1",
            Self::ProofNullifier(kind) => match kind {
                ProofKind::HashShare => "proof-nullifier/hashshare",
                ProofKind::Ai => "proof-nullifier/ai",
                ProofKind::Quantum => "proof-nullifier/quantum",
                ProofKind::Storage => "proof-nullifier/storage",
                ProofKind::Vdf => "proof-nullifier/vdf",
            },
            Self::DaCommitV1 => "da-commit-v1",
            Self::AddrV1 => "addr-v1",
            Self::AlgPolicyRootV1 => "alg-policy-root-v1",
            Self::AiTrapSeed => "ai-trap-seed",
            Self::QuantumBindV1 => "quantum-v1/bind",
            Self::QuantumTrapSeedV1 => "quantum-v1/trap-seed",
            Self::VdfInputV1 => "vdf-v1/input",
            Self::StorageChallengeV1 => "storage-v1/challenge",
        }
    }
}

/// Hashes `tag || 0x00 || payload` into a 32-byte digest.
///
/// `AlgPolicyRootV1` uses SHA3-512 truncated to 32 bytes so the digest
/// fits the header's fixed-width root slot; every other domain is SHA3-256.
pub fn hash_domain(tag: DomainTag, payload: &[u8]) -> [u8; 32] {
    hash_domain_parts(tag, &[payload])
}

/// Like [`hash_domain`], but streams multiple payload parts in order.
pub fn hash_domain_parts(tag: DomainTag, parts: &[&[u8]]) -> [u8; 32] {
    match tag {
        DomainTag::AlgPolicyRootV1 => {
            let mut h = Sha3_512::new();
            h.update(tag.as_str().as_bytes());
            h.update([0u8]);
            for p in parts {
                h.update(p);
            }
            let wide = h.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&wide[..32]);
            out
        }
        _ => {
            let mut h = Sha3_256::new();
            h.update(tag.as_str().as_bytes());
            h.update([0u8]);
            for p in parts {
                h.update(p);
            }
            h.finalize().into()
        }
    }
}

/// Plain SHA3-256, used for Merkle leaves and internal nodes.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha3_256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Computes the Merkle root of `leaves` in input order.
///
/// Leaves are pre-hashed with SHA3-256; internal nodes hash the
/// concatenation of their children; an odd last child is carried unpaired
/// to the next level; the empty tree is `sha3_256("")`.
pub fn merkle_root<L: AsRef<[u8]>>(leaves: &[L]) -> [u8; 32] {
    if leaves.is_empty() {
        return sha3_256(&[]);
    }
    let mut level: Vec<[u8; 32]> = leaves.iter().map(|l| sha3_256(l.as_ref())).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(node_hash(left, right)),
                [odd] => next.push(*odd),
                _ => unreachable!("chunks(2) yields one or two items"),
            }
        }
        level = next;
    }
    level[0]
}
