//! SPHINCS+-SHA2-128s, the stateless hash-based fallback scheme.
//!
//! Hash-based signatures stay secure even if lattice assumptions fall, at
//! the cost of large signatures; the algorithm policy bounds those sizes.

use crate::error::CryptoError;
use crate::sign::{SignatureScheme, ALG_SPHINCS_SHA2_128S};
use animica_types::tx::AlgId;
use pqcrypto_sphincsplus::sphincssha2128ssimple as sphincs;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};

/// The SPHINCS+-SHA2-128s verification scheme.
pub struct SphincsScheme;

impl SignatureScheme for SphincsScheme {
    fn alg_id(&self) -> AlgId {
        ALG_SPHINCS_SHA2_128S
    }

    fn name(&self) -> &'static str {
        "sphincs-sha2-128s"
    }

    fn verify(
        &self,
        pubkey: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let pk = sphincs::PublicKey::from_bytes(pubkey)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = sphincs::DetachedSignature::from_bytes(signature)
            .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;
        sphincs::verify_detached_signature(&sig, message, &pk)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Generates a fresh keypair as raw byte vectors. Tooling and tests only.
pub fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
    let (pk, sk) = sphincs::keypair();
    (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
}

/// Produces a detached signature with a raw secret key. Tooling and tests only.
pub fn sign(secret_key: &[u8], message: &[u8]) -> Vec<u8> {
    let sk = match sphincs::SecretKey::from_bytes(secret_key) {
        Ok(sk) => sk,
        Err(_) => return Vec::new(),
    };
    sphincs::detached_sign(message, &sk).as_bytes().to_vec()
}

#[cfg(test)]
mod tests;
