//! Signature schemes, the algorithm registry, and transaction verification.

pub mod batch;
pub mod dilithium;
pub mod sphincs;

use crate::error::CryptoError;
use animica_types::policy::AlgPolicy;
use animica_types::tx::{Address, AlgId, Transaction};

/// Algorithm id for ML-DSA-65 (Dilithium3).
pub const ALG_ML_DSA_65: AlgId = 1;
/// Algorithm id for SPHINCS+-SHA2-128s.
pub const ALG_SPHINCS_SHA2_128S: AlgId = 2;

/// A detached-signature verification scheme.
///
/// Consensus only ever verifies; signing lives on the wallet side and is
/// exposed here solely for tooling and tests.
pub trait SignatureScheme: Send + Sync {
    /// The algorithm id addresses commit to.
    fn alg_id(&self) -> AlgId;

    /// Human-readable scheme name.
    fn name(&self) -> &'static str;

    /// Verifies `signature` over `message` under `pubkey`.
    fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8])
        -> Result<(), CryptoError>;
}

/// The process-wide table of admitted signature schemes.
pub struct SchemeRegistry {
    schemes: Vec<Box<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    /// The standard registry: ML-DSA-65 and SPHINCS+-SHA2-128s.
    pub fn standard() -> Self {
        Self {
            schemes: vec![
                Box::new(dilithium::MlDsaScheme),
                Box::new(sphincs::SphincsScheme),
            ],
        }
    }

    /// Looks up a scheme by algorithm id.
    pub fn get(&self, alg_id: AlgId) -> Option<&dyn SignatureScheme> {
        self.schemes
            .iter()
            .find(|s| s.alg_id() == alg_id)
            .map(|s| s.as_ref())
    }

    /// Verifies a detached signature under the scheme for `alg_id`.
    pub fn verify(
        &self,
        alg_id: AlgId,
        pubkey: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        self.get(alg_id)
            .ok_or(CryptoError::UnknownAlgorithm(alg_id))?
            .verify(pubkey, message, signature)
    }
}

/// Fully verifies one transaction signature against the algorithm policy.
///
/// Checks, in order: the policy admits the algorithm and sizes, the sender
/// address derives from the supplied key, and the detached signature
/// verifies over the signing preimage.
pub fn verify_transaction(
    registry: &SchemeRegistry,
    alg_policy: &AlgPolicy,
    tx: &Transaction,
) -> Result<(), CryptoError> {
    let sig = &tx.signature;
    if !alg_policy.admits(sig.alg_id, sig.pubkey.len(), sig.sig.len()) {
        return Err(CryptoError::PolicyRejected(format!(
            "alg {} with {}B key / {}B sig",
            sig.alg_id,
            sig.pubkey.len(),
            sig.sig.len()
        )));
    }
    if tx.from != Address::derive(sig.alg_id, &sig.pubkey) {
        return Err(CryptoError::AddressMismatch);
    }
    registry.verify(sig.alg_id, &sig.pubkey, &tx.signing_message(), &sig.sig)
}
