#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Animica Core Types
//!
//! This crate is the foundational library for the Animica consensus core,
//! containing all canonical data structures, the strict canonical CBOR
//! codec, domain-tagged hashing, fixed-point µ-nat arithmetic, policy
//! bundles, and error types.
//!
//! ## Architectural Role
//!
//! As the base crate, `animica-types` has minimal dependencies and is
//! itself a dependency for every other crate in the workspace. This
//! structure prevents circular dependencies and provides a stable,
//! canonical definition for shared types like `Header`, `Transaction`,
//! `ProofEnvelope`, and the block-rejection error enums.
//!
//! Everything that is hashed, signed, or committed on-chain round-trips
//! through the canonical codec in [`codec`]; any byte-level nondeterminism
//! there is a consensus bug.

/// The maximum encoded size in bytes accepted for a whole block.
pub const MAX_BLOCK_BYTES: usize = 2 * 1024 * 1024; // 2 MiB
/// The maximum number of proof envelopes accepted per block.
pub const MAX_PROOFS_PER_BLOCK: usize = 256;
/// The maximum encoded size in bytes accepted for a single proof envelope.
pub const MAX_PROOF_BYTES: usize = 128 * 1024; // 128 KiB

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::SchemaError> = std::result::Result<T, E>;

/// Core block structures: `Header`, `Block`, and `PolicyRoots`.
pub mod block;
/// The strict canonical CBOR codec used for all consensus objects.
pub mod codec;
/// Genesis-fixed consensus parameters (retarget, fork choice, sizes).
pub mod config;
/// A unified set of all error types used across the core.
pub mod error;
/// Domain-tagged hashing and Merkle tree construction.
pub mod hashing;
/// Content-addressed policy bundles (PoIES policy and algorithm policy).
pub mod policy;
/// Proof envelopes, per-kind bodies, verifier metrics, and receipts.
pub mod proof;
/// Transactions, signature tuples, and addresses.
pub mod tx;
/// Fixed-point µ-nat arithmetic and the pinned logarithm routine.
pub mod units;

/// A 32-byte block hash.
pub type BlockHash = [u8; 32];
/// A 32-byte proof nullifier.
pub type Nullifier = [u8; 32];
/// A chain identifier.
pub type ChainId = u32;
