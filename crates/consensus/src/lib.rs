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

//! # Animica Consensus
//!
//! The PoIES acceptance rule and the difficulty controller.
//!
//! A block is accepted when `S = −ln(u) + Σψ ≥ Θ`: the hash-lottery term
//! comes from the header's nonce domain, the useful-work terms from
//! verified proof envelopes mapped through the pinned policy, and Θ from
//! the deterministic log-space EMA controller. Everything here is
//! fixed-point µ-nat arithmetic; two observers that admit the same header
//! sequence compute identical scores and Θ sequences.

pub mod difficulty;
pub mod scorer;

pub use difficulty::{ControllerState, TimestampContext};
pub use scorer::{score_and_accept, ScoreBreakdown, ScoredEnvelope};
