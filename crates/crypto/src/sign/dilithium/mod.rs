//! ML-DSA (Module-Lattice-Based Digital Signature Algorithm).
//! Formerly known as CRYSTALS-Dilithium.
//!
//! Uses the `pqcrypto` implementation of ML-DSA-65 (NIST FIPS 204,
//! security category 3), which is the default account scheme.

use crate::error::CryptoError;
use crate::sign::{SignatureScheme, ALG_ML_DSA_65};
use animica_types::tx::AlgId;
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};

/// The ML-DSA-65 verification scheme.
pub struct MlDsaScheme;

impl SignatureScheme for MlDsaScheme {
    fn alg_id(&self) -> AlgId {
        ALG_ML_DSA_65
    }

    fn name(&self) -> &'static str {
        "ml-dsa-65"
    }

    fn verify(
        &self,
        pubkey: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let pk = dilithium3::PublicKey::from_bytes(pubkey)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = dilithium3::DetachedSignature::from_bytes(signature)
            .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;
        dilithium3::verify_detached_signature(&sig, message, &pk)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Generates a fresh keypair as raw byte vectors. Tooling and tests only.
pub fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
    let (pk, sk) = dilithium3::keypair();
    (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
}

/// Produces a detached signature with a raw secret key. Tooling and tests only.
pub fn sign(secret_key: &[u8], message: &[u8]) -> Vec<u8> {
    let sk = match dilithium3::SecretKey::from_bytes(secret_key) {
        Ok(sk) => sk,
        Err(_) => return Vec::new(),
    };
    dilithium3::detached_sign(message, &sk).as_bytes().to_vec()
}

#[cfg(test)]
mod tests;
