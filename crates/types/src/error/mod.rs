//! Core error types for the Animica consensus core.
//!
//! Every failure that can reject a block or zero an envelope is a typed
//! error with a stable, string-keyed code. The core never constructs log
//! messages or transport responses; embedders map codes as they see fit.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Rejection category for the consensus test harness.
///
/// The numeric values are the process exit codes the harness uses:
/// structural = 1, policy = 2, work = 3 (0 is acceptance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCategory {
    /// Codec, schema, size, chain-id, signature, or parent-unknown failures.
    Structural = 1,
    /// Policy-root mismatch, unknown algorithm, timestamp skew, Θ mismatch.
    Policy = 2,
    /// Acceptance predicate, verifier-driven score shortfall, nullifier reuse.
    Work = 3,
}

/// Errors raised by the strict canonical CBOR codec.
///
/// Any of these is a hard structural rejection: the bytes do not form the
/// unique canonical encoding of a consensus object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The input ended before the current item was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Bytes remained after the top-level item was fully decoded.
    #[error("trailing bytes after canonical item")]
    TrailingBytes,
    /// An indefinite-length item was encountered.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLength,
    /// A floating-point value was encountered.
    #[error("floating-point values are forbidden")]
    FloatForbidden,
    /// A semantic tag was encountered.
    #[error("semantic tags are forbidden")]
    TagForbidden,
    /// A simple value other than false/true/null was encountered.
    #[error("unsupported simple value {0}")]
    UnsupportedSimple(u8),
    /// An integer was not encoded in its shortest form.
    #[error("integer not in shortest form")]
    NonCanonicalInt,
    /// The decoded item had a different major type than the schema expects.
    #[error("unexpected item: expected {expected}")]
    UnexpectedType {
        /// The kind of item the schema expected at this position.
        expected: &'static str,
    },
    /// An integer exceeded the width the schema permits.
    #[error("integer out of range for {field}")]
    IntOutOfRange {
        /// The field whose width was exceeded.
        field: &'static str,
    },
    /// Map keys were not in strictly ascending UTF-8 order.
    #[error("map keys not in canonical order")]
    UnsortedKeys,
    /// A map key appeared twice.
    #[error("duplicate map key")]
    DuplicateKey,
    /// A consensus object carried a field the schema does not define.
    #[error("unknown field {0:?}")]
    UnknownField(String),
    /// A required field was absent.
    #[error("missing field {0}")]
    MissingField(&'static str),
    /// A byte string had the wrong length for a fixed-width field.
    #[error("invalid length for {field}: expected {expected}, got {got}")]
    InvalidLength {
        /// The field being decoded.
        field: &'static str,
        /// The length the schema requires.
        expected: usize,
        /// The length found on the wire.
        got: usize,
    },
    /// A value was structurally valid CBOR but violates the schema.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// An unknown proof kind tag was encountered.
    #[error("unknown proof kind {0}")]
    UnknownProofKind(u8),
    /// A size bound from the active policy was exceeded at decode time.
    #[error("size bound exceeded: {0}")]
    SizeBound(&'static str),
}

impl ErrorCode for SchemaError {
    fn code(&self) -> &'static str {
        "SchemaError"
    }
}

/// Envelope-level failures from the proof verification pipeline.
///
/// A verifier failure zeroes that envelope's ψ contribution; it rejects the
/// enclosing block only if the remaining score falls below Θ.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The body did not decode against the kind-specific schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An attestation or certificate chain failed to validate.
    #[error("attestation invalid: {0}")]
    Attestation(String),
    /// The body's header binding did not match the enclosing header.
    #[error("header binding mismatch: {0}")]
    Binding(String),
    /// Trap challenges fell short of the policy threshold.
    #[error("trap check failed: {passed}/{total} passed")]
    TrapFail {
        /// Number of trap challenges answered correctly.
        passed: u32,
        /// Total number of trap challenges.
        total: u32,
    },
    /// The proof itself failed verification.
    #[error(transparent)]
    Proof(#[from] ProofError),
    /// The envelope's nullifier does not re-derive from its body.
    #[error("nullifier does not re-derive from body")]
    NullifierMismatch,
    /// The nullifier collides with a live entry in the chain state.
    #[error("nullifier already live")]
    NullifierReuse,
}

impl ErrorCode for VerifierError {
    fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "SchemaError",
            Self::Attestation(_) => "AttestationError",
            Self::Binding(_) => "BindingError",
            Self::TrapFail { .. } => "TrapFail",
            Self::Proof(_) => "ProofError",
            Self::NullifierMismatch => "ProofError",
            Self::NullifierReuse => "NullifierReuseError",
        }
    }
}

/// Failures internal to a single proof check.
#[derive(Debug, Error)]
pub enum ProofError {
    /// The verifier's deterministic work budget was exhausted.
    #[error("work budget exhausted")]
    Budget,
    /// The proof was well-formed but did not verify.
    #[error("proof invalid: {0}")]
    Invalid(String),
    /// The active policy lacks a table entry the proof requires.
    #[error("no policy entry for family {0:?}")]
    UnknownFamily(String),
}

/// Block-level rejection errors for the admission pipeline.
///
/// The string codes are the closed, stable vocabulary consumed by peers
/// and test harnesses; variants may gain fields but codes never change.
#[derive(Debug, Error)]
pub enum AdmitError {
    /// The block failed canonical decoding or schema validation.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A transaction signature failed verification.
    #[error("signature invalid: {0}")]
    Signature(String),
    /// The block's chain id does not match the local chain.
    #[error("chain id mismatch: expected {expected}, got {got}")]
    ChainIdMismatch {
        /// The local chain id.
        expected: u32,
        /// The chain id carried by the block.
        got: u32,
    },
    /// The block's parent hash is not in the header store.
    #[error("parent unknown: {}", hex::encode(.0))]
    ParentUnknown([u8; 32]),
    /// A timestamp guard failed.
    #[error("timestamp skew: {0}")]
    TimestampSkew(String),
    /// The header's Θ does not match the controller's expectation.
    #[error("theta mismatch: expected {expected}, got {got}")]
    ThetaMismatch {
        /// The locally recomputed Θ in µ-nats.
        expected: u64,
        /// The Θ declared in the header.
        got: u64,
    },
    /// The acceptance predicate `S ≥ Θ` failed.
    #[error("acceptance failed: S = {score} < Θ = {theta}")]
    AcceptanceFailed {
        /// The block's computed score in µ-nats.
        score: u64,
        /// The required threshold in µ-nats.
        theta: u64,
    },
    /// The runtime-loaded policy's hash disagrees with the header root.
    #[error("policy root mismatch")]
    PolicyRootMismatch,
    /// An envelope's nullifier is already live on this chain.
    #[error("nullifier reuse: {}", hex::encode(.0))]
    NullifierReuse([u8; 32]),
    /// A declared ψ exceeded a policy cap the producer must respect.
    #[error("cap violation: {0}")]
    CapViolation(String),
    /// A fork-choice switch was refused by the reorg policy.
    #[error("reorg refused: depth {depth}, ΔW {delta_work} below threshold {threshold}")]
    ReorgRefused {
        /// The fork depth from the current best tip.
        depth: u64,
        /// The offered cumulative-work gain in µ-nats.
        delta_work: u64,
        /// The required threshold in µ-nats.
        threshold: u64,
    },
    /// A verifier infrastructure failure independent of any one envelope.
    #[error("verifier error: {0}")]
    Verifier(String),
}

impl ErrorCode for AdmitError {
    fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "SchemaError",
            Self::Signature(_) => "SignatureError",
            Self::ChainIdMismatch { .. } => "ChainIdMismatch",
            Self::ParentUnknown(_) => "ParentUnknown",
            Self::TimestampSkew(_) => "TimestampSkew",
            Self::ThetaMismatch { .. } => "ThetaMismatch",
            Self::AcceptanceFailed { .. } => "AcceptanceFailed",
            Self::PolicyRootMismatch => "PolicyRootMismatch",
            Self::NullifierReuse(_) => "NullifierReuse",
            Self::CapViolation(_) => "CapViolation",
            Self::ReorgRefused { .. } => "ReorgRefused",
            Self::Verifier(_) => "VerifierError",
        }
    }
}

impl AdmitError {
    /// Classifies this rejection for the harness exit-code mapping.
    pub fn category(&self) -> RejectCategory {
        match self {
            Self::Schema(_)
            | Self::Signature(_)
            | Self::ChainIdMismatch { .. }
            | Self::ParentUnknown(_) => RejectCategory::Structural,
            Self::TimestampSkew(_)
            | Self::ThetaMismatch { .. }
            | Self::PolicyRootMismatch
            | Self::CapViolation(_) => RejectCategory::Policy,
            Self::AcceptanceFailed { .. }
            | Self::NullifierReuse(_)
            | Self::ReorgRefused { .. }
            | Self::Verifier(_) => RejectCategory::Work,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_codes_are_the_closed_vocabulary() {
        let cases: Vec<(AdmitError, &str)> = vec![
            (AdmitError::Schema(SchemaError::TrailingBytes), "SchemaError"),
            (AdmitError::Signature("bad".into()), "SignatureError"),
            (
                AdmitError::ChainIdMismatch { expected: 1, got: 2 },
                "ChainIdMismatch",
            ),
            (AdmitError::ParentUnknown([0; 32]), "ParentUnknown"),
            (AdmitError::TimestampSkew("skew".into()), "TimestampSkew"),
            (
                AdmitError::ThetaMismatch { expected: 1, got: 2 },
                "ThetaMismatch",
            ),
            (
                AdmitError::AcceptanceFailed { score: 1, theta: 2 },
                "AcceptanceFailed",
            ),
            (AdmitError::PolicyRootMismatch, "PolicyRootMismatch"),
            (AdmitError::NullifierReuse([0; 32]), "NullifierReuse"),
            (AdmitError::CapViolation("cap".into()), "CapViolation"),
            (
                AdmitError::ReorgRefused {
                    depth: 3,
                    delta_work: 1,
                    threshold: 2,
                },
                "ReorgRefused",
            ),
            (AdmitError::Verifier("infra".into()), "VerifierError"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn categories_follow_failure_taxonomy() {
        assert_eq!(
            AdmitError::ParentUnknown([0; 32]).category(),
            RejectCategory::Structural
        );
        assert_eq!(
            AdmitError::PolicyRootMismatch.category(),
            RejectCategory::Policy
        );
        assert_eq!(
            AdmitError::NullifierReuse([0; 32]).category(),
            RejectCategory::Work
        );
    }
}
