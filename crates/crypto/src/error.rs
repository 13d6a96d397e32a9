//! Local error types for the `animica-crypto` crate.

use thiserror::Error;

/// Failures from signature verification and key handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The algorithm id is not known to the registry.
    #[error("unknown algorithm id {0}")]
    UnknownAlgorithm(u16),
    /// The algorithm policy does not admit this algorithm or these sizes.
    #[error("algorithm policy rejects: {0}")]
    PolicyRejected(String),
    /// The public key bytes are malformed for the scheme.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    /// The signature bytes are malformed for the scheme.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),
    /// The signature did not verify.
    #[error("signature verification failed")]
    InvalidSignature,
    /// The sender address does not derive from the supplied key.
    #[error("address does not derive from public key")]
    AddressMismatch,
}
