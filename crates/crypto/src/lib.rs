#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! # Animica Cryptography
//!
//! Post-quantum signature verification for the Animica consensus core.
//! The primitive implementations are treated as black boxes behind the
//! [`SignatureScheme`](sign::SignatureScheme) trait; this crate wires them
//! to algorithm ids, the algorithm policy, and transaction verification.

pub mod error;
pub mod sign;

pub use error::CryptoError;
pub use sign::{SchemeRegistry, SignatureScheme, ALG_ML_DSA_65, ALG_SPHINCS_SHA2_128S};
