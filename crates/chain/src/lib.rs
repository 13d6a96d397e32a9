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

//! # Animica Chain State
//!
//! The header chain, cumulative work, fork choice, the nullifier TTL set,
//! and the serialized block admission pipeline.
//!
//! Consensus state mutations are logically single-threaded: all writes go
//! through [`ChainState::admit_block`](admission::ChainState::admit_block),
//! which validates a candidate completely before touching any shared
//! structure, then commits header, nullifiers, controller state, and head
//! selection as one step. Readers work from cheap
//! [snapshots](admission::ChainSnapshot).

pub mod admission;
pub mod events;
pub mod forkchoice;
pub mod nullifiers;
pub mod store;

pub use admission::{AdmitOutcome, ChainSnapshot, ChainState, HeadChange};
pub use events::HeadUpdate;
