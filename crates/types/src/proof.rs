//! Proof envelopes, per-kind bodies, verifier metrics, and receipts.
//!
//! On the wire an envelope is `{body, nullifier, typeId}`; decoding
//! produces a typed body variant directly, so downstream code never
//! dispatches on loose tags. The nullifier is a domain-separated digest of
//! the canonical body bytes and must re-derive exactly.

use crate::codec::{
    require, to_bytes_canonical, CanonicalDecode, CanonicalEncode, MapReader, Reader, Writer,
};
use crate::error::SchemaError;
use crate::hashing::{hash_domain, DomainTag};
use crate::tx::Address;
use crate::units::mul_micro;
use crate::{Nullifier, MAX_PROOF_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The five proof kinds, tagged on the wire by `type_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProofKind {
    /// The classical hash-lottery share (`type_id = 1`).
    HashShare,
    /// TEE-attested AI work (`type_id = 2`).
    Ai,
    /// QPU-certified quantum work (`type_id = 3`).
    Quantum,
    /// Proof-of-storage heartbeat (`type_id = 4`).
    Storage,
    /// Wesolowski verifiable delay (`type_id = 5`).
    Vdf,
}

impl ProofKind {
    /// The wire tag.
    pub fn type_id(self) -> u8 {
        match self {
            Self::HashShare => 1,
            Self::Ai => 2,
            Self::Quantum => 3,
            Self::Storage => 4,
            Self::Vdf => 5,
        }
    }

    /// Parses a wire tag.
    pub fn from_type_id(id: u8) -> Result<Self, SchemaError> {
        match id {
            1 => Ok(Self::HashShare),
            2 => Ok(Self::Ai),
            3 => Ok(Self::Quantum),
            4 => Ok(Self::Storage),
            5 => Ok(Self::Vdf),
            other => Err(SchemaError::UnknownProofKind(other)),
        }
    }

    /// The lowercase kind name used in policy tables and nullifier tags.
    pub fn name(self) -> &'static str {
        match self {
            Self::HashShare => "hashshare",
            Self::Ai => "ai",
            Self::Quantum => "quantum",
            Self::Storage => "storage",
            Self::Vdf => "vdf",
        }
    }
}

/// The hash-lottery share body: a binding copy of the header material the
/// draw was made against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashShareBody {
    /// The chain the share was mined for.
    pub chain_id: u32,
    /// The height of the enclosing block.
    pub height: u64,
    /// The enclosing header's parent hash.
    pub parent_hash: [u8; 32],
    /// The enclosing header's mix seed.
    pub mix_seed: [u8; 32],
    /// The miner's nonce, echoed from the header.
    pub nonce: [u8; 8],
}

impl CanonicalEncode for HashShareBody {
    fn encode(&self, w: &mut Writer) {
        w.map(5);
        w.text("chainId");
        w.uint(self.chain_id as u64);
        w.text("height");
        w.uint(self.height);
        w.text("mixSeed");
        w.bytes(&self.mix_seed);
        w.text("nonce");
        w.bytes(&self.nonce);
        w.text("parentHash");
        w.bytes(&self.parent_hash);
    }
}

impl CanonicalDecode for HashShareBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut chain_id = None;
        let mut height = None;
        let mut mix_seed = None;
        let mut nonce = None;
        let mut parent_hash = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "chainId" => chain_id = Some(r.uint_within(u32::MAX as u64, "chainId")? as u32),
                "height" => height = Some(r.uint()?),
                "mixSeed" => mix_seed = Some(r.bytes_exact::<32>("mixSeed")?),
                "nonce" => nonce = Some(r.bytes_exact::<8>("nonce")?),
                "parentHash" => parent_hash = Some(r.bytes_exact::<32>("parentHash")?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            chain_id: require(chain_id, "chainId")?,
            height: require(height, "height")?,
            parent_hash: require(parent_hash, "parentHash")?,
            mix_seed: require(mix_seed, "mixSeed")?,
            nonce: require(nonce, "nonce")?,
        })
    }
}

/// The task a unit of AI work was performed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBinding {
    /// The chain the task was posted on.
    pub chain_id: u32,
    /// The height the task is bound to.
    pub height: u64,
    /// The account that requested the work.
    pub requester: Address,
    /// Hash of the task payload.
    pub payload_hash: [u8; 32],
}

impl TaskBinding {
    /// The task identifier: the canonical hash of the binding.
    pub fn task_id(&self) -> [u8; 32] {
        crate::hashing::sha3_256(&to_bytes_canonical(self))
    }
}

impl CanonicalEncode for TaskBinding {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("chainId");
        w.uint(self.chain_id as u64);
        w.text("height");
        w.uint(self.height);
        w.text("payloadHash");
        w.bytes(&self.payload_hash);
        w.text("requester");
        self.requester.encode(w);
    }
}

impl CanonicalDecode for TaskBinding {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut chain_id = None;
        let mut height = None;
        let mut payload_hash = None;
        let mut requester = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "chainId" => chain_id = Some(r.uint_within(u32::MAX as u64, "chainId")? as u32),
                "height" => height = Some(r.uint()?),
                "payloadHash" => payload_hash = Some(r.bytes_exact::<32>("payloadHash")?),
                "requester" => requester = Some(Address::decode(r)?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            chain_id: require(chain_id, "chainId")?,
            height: require(height, "height")?,
            requester: require(requester, "requester")?,
            payload_hash: require(payload_hash, "payloadHash")?,
        })
    }
}

/// A TEE attestation: the vendor key, the enclave measurement, and the
/// quote signature over `measurement || report_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// The signature algorithm the vendor key uses.
    pub alg_id: u16,
    /// The enclave measurement the quote covers.
    pub measurement: [u8; 32],
    /// The detached quote signature.
    pub quote_sig: Vec<u8>,
    /// The vendor's attestation public key.
    pub vendor_pubkey: Vec<u8>,
}

impl CanonicalEncode for Attestation {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("algId");
        w.uint(self.alg_id as u64);
        w.text("measurement");
        w.bytes(&self.measurement);
        w.text("quoteSig");
        w.bytes(&self.quote_sig);
        w.text("vendorPubkey");
        w.bytes(&self.vendor_pubkey);
    }
}

impl CanonicalDecode for Attestation {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut alg_id = None;
        let mut measurement = None;
        let mut quote_sig = None;
        let mut vendor_pubkey = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algId" => alg_id = Some(r.uint_within(u16::MAX as u64, "algId")? as u16),
                "measurement" => measurement = Some(r.bytes_exact::<32>("measurement")?),
                "quoteSig" => quote_sig = Some(r.bytes()?.to_vec()),
                "vendorPubkey" => vendor_pubkey = Some(r.bytes()?.to_vec()),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            alg_id: require(alg_id, "algId")?,
            measurement: require(measurement, "measurement")?,
            quote_sig: require(quote_sig, "quoteSig")?,
            vendor_pubkey: require(vendor_pubkey, "vendorPubkey")?,
        })
    }
}

/// Responses to the seed-derived trap challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapReceipt {
    /// The number of challenges the prover answered.
    pub count: u32,
    /// One response digest per challenge, in challenge order.
    pub responses: Vec<[u8; 32]>,
}

impl CanonicalEncode for TrapReceipt {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("count");
        w.uint(self.count as u64);
        w.text("responses");
        w.array(self.responses.len());
        for resp in &self.responses {
            w.bytes(resp);
        }
    }
}

impl CanonicalDecode for TrapReceipt {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut count = None;
        let mut responses = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "count" => count = Some(r.uint_within(u32::MAX as u64, "count")? as u32),
                "responses" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(r.bytes_exact::<32>("response")?);
                    }
                    responses = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            count: require(count, "count")?,
            responses: require(responses, "responses")?,
        })
    }
}

/// Optional quality-of-service figures reported with AI work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosRecord {
    /// Mean task latency in milliseconds.
    pub latency_ms: u64,
    /// Task throughput in policy units.
    pub throughput: u64,
}

impl CanonicalEncode for QosRecord {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("latencyMs");
        w.uint(self.latency_ms);
        w.text("throughput");
        w.uint(self.throughput);
    }
}

impl CanonicalDecode for QosRecord {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut latency_ms = None;
        let mut throughput = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "latencyMs" => latency_ms = Some(r.uint()?),
                "throughput" => throughput = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            latency_ms: require(latency_ms, "latencyMs")?,
            throughput: require(throughput, "throughput")?,
        })
    }
}

/// The AI proof body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiBody {
    /// The TEE attestation bundle.
    pub attestation: Attestation,
    /// QoS figures; omitted from the wire when absent.
    pub qos: Option<QosRecord>,
    /// The provider's declared replication factor.
    pub redundancy: u32,
    /// The task binding.
    pub task: TaskBinding,
    /// The trap receipt.
    pub traps: TrapReceipt,
    /// Costed work units claimed for this task.
    pub units: u64,
}

impl CanonicalEncode for AiBody {
    fn encode(&self, w: &mut Writer) {
        w.map(if self.qos.is_some() { 6 } else { 5 });
        w.text("attestation");
        self.attestation.encode(w);
        if let Some(qos) = &self.qos {
            w.text("qos");
            qos.encode(w);
        }
        w.text("redundancy");
        w.uint(self.redundancy as u64);
        w.text("task");
        self.task.encode(w);
        w.text("traps");
        self.traps.encode(w);
        w.text("units");
        w.uint(self.units);
    }
}

impl CanonicalDecode for AiBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut attestation = None;
        let mut qos = None;
        let mut redundancy = None;
        let mut task = None;
        let mut traps = None;
        let mut units = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "attestation" => attestation = Some(Attestation::decode(r)?),
                "qos" => qos = Some(QosRecord::decode(r)?),
                "redundancy" => {
                    redundancy = Some(r.uint_within(u32::MAX as u64, "redundancy")? as u32)
                }
                "task" => task = Some(TaskBinding::decode(r)?),
                "traps" => traps = Some(TrapReceipt::decode(r)?),
                "units" => units = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            attestation: require(attestation, "attestation")?,
            qos,
            redundancy: require(redundancy, "redundancy")?,
            task: require(task, "task")?,
            traps: require(traps, "traps")?,
            units: require(units, "units")?,
        })
    }
}

/// Declared quantum circuit resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumResources {
    /// Circuit depth.
    pub depth: u32,
    /// Qubit count.
    pub qubits: u32,
    /// Measurement shots.
    pub shots: u64,
}

impl CanonicalEncode for QuantumResources {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("depth");
        w.uint(self.depth as u64);
        w.text("qubits");
        w.uint(self.qubits as u64);
        w.text("shots");
        w.uint(self.shots);
    }
}

impl CanonicalDecode for QuantumResources {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut depth = None;
        let mut qubits = None;
        let mut shots = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "depth" => depth = Some(r.uint_within(u32::MAX as u64, "depth")? as u32),
                "qubits" => qubits = Some(r.uint_within(u32::MAX as u64, "qubits")? as u32),
                "shots" => shots = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            depth: require(depth, "depth")?,
            qubits: require(qubits, "qubits")?,
            shots: require(shots, "shots")?,
        })
    }
}

/// One trap circuit drawn from the public corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumTrap {
    /// The corpus index this trap claims to be drawn from.
    pub corpus_index: u64,
    /// Whether the trap circuit has a deterministic outcome.
    pub deterministic: bool,
    /// The expected outcome distribution in µ-probabilities.
    pub expected: Vec<u64>,
    /// The observed outcome distribution in µ-probabilities.
    pub observed: Vec<u64>,
}

impl CanonicalEncode for QuantumTrap {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("corpusIndex");
        w.uint(self.corpus_index);
        w.text("deterministic");
        w.bool(self.deterministic);
        w.text("expected");
        w.array(self.expected.len());
        for v in &self.expected {
            w.uint(*v);
        }
        w.text("observed");
        w.array(self.observed.len());
        for v in &self.observed {
            w.uint(*v);
        }
    }
}

impl CanonicalDecode for QuantumTrap {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        fn uint_array(r: &mut Reader<'_>) -> Result<Vec<u64>, SchemaError> {
            let len = r.array()?;
            let mut out = Vec::with_capacity(len as usize);
            for _ in 0..len {
                out.push(r.uint()?);
            }
            Ok(out)
        }
        let mut m = MapReader::new(r)?;
        let mut corpus_index = None;
        let mut deterministic = None;
        let mut expected = None;
        let mut observed = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "corpusIndex" => corpus_index = Some(r.uint()?),
                "deterministic" => deterministic = Some(r.bool()?),
                "expected" => expected = Some(uint_array(r)?),
                "observed" => observed = Some(uint_array(r)?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            corpus_index: require(corpus_index, "corpusIndex")?,
            deterministic: require(deterministic, "deterministic")?,
            expected: require(expected, "expected")?,
            observed: require(observed, "observed")?,
        })
    }
}

/// The quantum proof body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumBody {
    /// The signature algorithm the provider key uses.
    pub alg_id: u16,
    /// Commitment to the executed circuit.
    pub circuit_commit: [u8; 32],
    /// The circuit identifier.
    pub circuit_id: [u8; 32],
    /// The hardware family keyed into the policy's α table.
    pub family: String,
    /// Commitment to the measured outputs.
    pub output_commit: [u8; 32],
    /// The provider's anti-replay nonce.
    pub provider_nonce: [u8; 8],
    /// The provider's certified public key.
    pub provider_pubkey: Vec<u8>,
    /// The provider's signature over the binding digest.
    pub provider_sig: Vec<u8>,
    /// Declared circuit resources.
    pub resources: QuantumResources,
    /// The task identifier.
    pub task_id: [u8; 32],
    /// Trap circuits drawn from the public corpus.
    pub traps: Vec<QuantumTrap>,
}

impl QuantumBody {
    /// The digest the provider signs:
    /// `H("quantum-v1/bind" || task_id || circuit_id || circuit_commit ||
    /// output_commit || resources || provider_nonce)`.
    pub fn bind_digest(&self) -> [u8; 32] {
        let resources = to_bytes_canonical(&self.resources);
        crate::hashing::hash_domain_parts(
            DomainTag::QuantumBindV1,
            &[
                &self.task_id,
                &self.circuit_id,
                &self.circuit_commit,
                &self.output_commit,
                &resources,
                &self.provider_nonce,
            ],
        )
    }
}

impl CanonicalEncode for QuantumBody {
    fn encode(&self, w: &mut Writer) {
        w.map(11);
        w.text("algId");
        w.uint(self.alg_id as u64);
        w.text("circuitCommit");
        w.bytes(&self.circuit_commit);
        w.text("circuitId");
        w.bytes(&self.circuit_id);
        w.text("family");
        w.text(&self.family);
        w.text("outputCommit");
        w.bytes(&self.output_commit);
        w.text("providerNonce");
        w.bytes(&self.provider_nonce);
        w.text("providerPubkey");
        w.bytes(&self.provider_pubkey);
        w.text("providerSig");
        w.bytes(&self.provider_sig);
        w.text("resources");
        self.resources.encode(w);
        w.text("taskId");
        w.bytes(&self.task_id);
        w.text("traps");
        w.array(self.traps.len());
        for trap in &self.traps {
            trap.encode(w);
        }
    }
}

impl CanonicalDecode for QuantumBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut alg_id = None;
        let mut circuit_commit = None;
        let mut circuit_id = None;
        let mut family = None;
        let mut output_commit = None;
        let mut provider_nonce = None;
        let mut provider_pubkey = None;
        let mut provider_sig = None;
        let mut resources = None;
        let mut task_id = None;
        let mut traps = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algId" => alg_id = Some(r.uint_within(u16::MAX as u64, "algId")? as u16),
                "circuitCommit" => circuit_commit = Some(r.bytes_exact::<32>("circuitCommit")?),
                "circuitId" => circuit_id = Some(r.bytes_exact::<32>("circuitId")?),
                "family" => family = Some(r.text()?.to_string()),
                "outputCommit" => output_commit = Some(r.bytes_exact::<32>("outputCommit")?),
                "providerNonce" => provider_nonce = Some(r.bytes_exact::<8>("providerNonce")?),
                "providerPubkey" => provider_pubkey = Some(r.bytes()?.to_vec()),
                "providerSig" => provider_sig = Some(r.bytes()?.to_vec()),
                "resources" => resources = Some(QuantumResources::decode(r)?),
                "taskId" => task_id = Some(r.bytes_exact::<32>("taskId")?),
                "traps" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(QuantumTrap::decode(r)?);
                    }
                    traps = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            alg_id: require(alg_id, "algId")?,
            circuit_commit: require(circuit_commit, "circuitCommit")?,
            circuit_id: require(circuit_id, "circuitId")?,
            family: require(family, "family")?,
            output_commit: require(output_commit, "outputCommit")?,
            provider_nonce: require(provider_nonce, "providerNonce")?,
            provider_pubkey: require(provider_pubkey, "providerPubkey")?,
            provider_sig: require(provider_sig, "providerSig")?,
            resources: require(resources, "resources")?,
            task_id: require(task_id, "taskId")?,
            traps: require(traps, "traps")?,
        })
    }
}

/// One storage challenge: a Merkle opening against the dataset root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChallenge {
    /// The opened leaf bytes.
    pub leaf: Vec<u8>,
    /// The leaf index the opening claims.
    pub leaf_index: u64,
    /// Sibling hashes, leaf-to-root.
    pub path: Vec<[u8; 32]>,
}

impl CanonicalEncode for StorageChallenge {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("leaf");
        w.bytes(&self.leaf);
        w.text("leafIndex");
        w.uint(self.leaf_index);
        w.text("path");
        w.array(self.path.len());
        for node in &self.path {
            w.bytes(node);
        }
    }
}

impl CanonicalDecode for StorageChallenge {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut leaf = None;
        let mut leaf_index = None;
        let mut path = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "leaf" => leaf = Some(r.bytes()?.to_vec()),
                "leafIndex" => leaf_index = Some(r.uint()?),
                "path" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(r.bytes_exact::<32>("path node")?);
                    }
                    path = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            leaf: require(leaf, "leaf")?,
            leaf_index: require(leaf_index, "leafIndex")?,
            path: require(path, "path")?,
        })
    }
}

/// The storage heartbeat body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBody {
    /// Declared stored capacity in bytes.
    pub capacity_bytes: u64,
    /// Seed-derived Merkle openings for this window.
    pub challenges: Vec<StorageChallenge>,
    /// The committed dataset root the openings anchor to.
    pub dataset_root: [u8; 32],
    /// The number of leaves under `dataset_root`.
    pub leaf_count: u64,
    /// The storage provider.
    pub provider: Address,
    /// Declared replication factor.
    pub redundancy: u32,
    /// Retrieval ticket ids; omitted from the wire when empty.
    pub tickets: Vec<[u8; 32]>,
    /// Last block height of the proven window.
    pub window_end: u64,
    /// First block height of the proven window.
    pub window_start: u64,
}

impl CanonicalEncode for StorageBody {
    fn encode(&self, w: &mut Writer) {
        w.map(if self.tickets.is_empty() { 8 } else { 9 });
        w.text("capacityBytes");
        w.uint(self.capacity_bytes);
        w.text("challenges");
        w.array(self.challenges.len());
        for c in &self.challenges {
            c.encode(w);
        }
        w.text("datasetRoot");
        w.bytes(&self.dataset_root);
        w.text("leafCount");
        w.uint(self.leaf_count);
        w.text("provider");
        self.provider.encode(w);
        w.text("redundancy");
        w.uint(self.redundancy as u64);
        if !self.tickets.is_empty() {
            w.text("tickets");
            w.array(self.tickets.len());
            for t in &self.tickets {
                w.bytes(t);
            }
        }
        w.text("windowEnd");
        w.uint(self.window_end);
        w.text("windowStart");
        w.uint(self.window_start);
    }
}

impl CanonicalDecode for StorageBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut capacity_bytes = None;
        let mut challenges = None;
        let mut dataset_root = None;
        let mut leaf_count = None;
        let mut provider = None;
        let mut redundancy = None;
        let mut tickets = Vec::new();
        let mut window_end = None;
        let mut window_start = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "capacityBytes" => capacity_bytes = Some(r.uint()?),
                "challenges" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(StorageChallenge::decode(r)?);
                    }
                    challenges = Some(out);
                }
                "datasetRoot" => dataset_root = Some(r.bytes_exact::<32>("datasetRoot")?),
                "leafCount" => leaf_count = Some(r.uint()?),
                "provider" => provider = Some(Address::decode(r)?),
                "redundancy" => {
                    redundancy = Some(r.uint_within(u32::MAX as u64, "redundancy")? as u32)
                }
                "tickets" => {
                    let len = r.array()?;
                    if len == 0 {
                        return Err(SchemaError::InvalidValue(
                            "empty tickets must be omitted".into(),
                        ));
                    }
                    for _ in 0..len {
                        tickets.push(r.bytes_exact::<32>("ticket")?);
                    }
                }
                "windowEnd" => window_end = Some(r.uint()?),
                "windowStart" => window_start = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            capacity_bytes: require(capacity_bytes, "capacityBytes")?,
            challenges: require(challenges, "challenges")?,
            dataset_root: require(dataset_root, "datasetRoot")?,
            leaf_count: require(leaf_count, "leafCount")?,
            provider: require(provider, "provider")?,
            redundancy: require(redundancy, "redundancy")?,
            tickets,
            window_end: require(window_end, "windowEnd")?,
            window_start: require(window_start, "windowStart")?,
        })
    }
}

/// The VDF proof body: a Wesolowski witness over the pinned group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdfBody {
    /// The claimed sequential iteration count `T`.
    pub iterations: u64,
    /// The delay output `y`, big-endian.
    pub output: Vec<u8>,
    /// The Wesolowski proof `π`, big-endian.
    pub proof: Vec<u8>,
}

impl CanonicalEncode for VdfBody {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("iterations");
        w.uint(self.iterations);
        w.text("output");
        w.bytes(&self.output);
        w.text("proof");
        w.bytes(&self.proof);
    }
}

impl CanonicalDecode for VdfBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut iterations = None;
        let mut output = None;
        let mut proof = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "iterations" => iterations = Some(r.uint()?),
                "output" => output = Some(r.bytes()?.to_vec()),
                "proof" => proof = Some(r.bytes()?.to_vec()),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            iterations: require(iterations, "iterations")?,
            output: require(output, "output")?,
            proof: require(proof, "proof")?,
        })
    }
}

/// A typed proof body, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofBody {
    /// A hash-lottery share.
    HashShare(HashShareBody),
    /// TEE-attested AI work.
    Ai(AiBody),
    /// QPU-certified quantum work.
    Quantum(QuantumBody),
    /// A storage heartbeat.
    Storage(StorageBody),
    /// A Wesolowski delay witness.
    Vdf(VdfBody),
}

impl ProofBody {
    /// This body's proof kind.
    pub fn kind(&self) -> ProofKind {
        match self {
            Self::HashShare(_) => ProofKind::HashShare,
            Self::Ai(_) => ProofKind::Ai,
            Self::Quantum(_) => ProofKind::Quantum,
            Self::Storage(_) => ProofKind::Storage,
            Self::Vdf(_) => ProofKind::Vdf,
        }
    }

    /// The canonical bytes the nullifier is derived over.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::HashShare(b) => to_bytes_canonical(b),
            Self::Ai(b) => to_bytes_canonical(b),
            Self::Quantum(b) => to_bytes_canonical(b),
            Self::Storage(b) => to_bytes_canonical(b),
            Self::Vdf(b) => to_bytes_canonical(b),
        }
    }

    /// Derives the nullifier: `H("proof-nullifier/<kind>" || body)`.
    pub fn nullifier(&self) -> Nullifier {
        hash_domain(
            DomainTag::ProofNullifier(self.kind()),
            &self.canonical_bytes(),
        )
    }

    fn decode_kind(kind: ProofKind, bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut r = Reader::new(bytes);
        let body = match kind {
            ProofKind::HashShare => Self::HashShare(HashShareBody::decode(&mut r)?),
            ProofKind::Ai => Self::Ai(AiBody::decode(&mut r)?),
            ProofKind::Quantum => Self::Quantum(QuantumBody::decode(&mut r)?),
            ProofKind::Storage => Self::Storage(StorageBody::decode(&mut r)?),
            ProofKind::Vdf => Self::Vdf(VdfBody::decode(&mut r)?),
        };
        r.finish()?;
        Ok(body)
    }
}

/// A proof envelope as carried in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    /// The typed body.
    pub body: ProofBody,
    /// The claimed nullifier; must re-derive from the body bytes.
    pub nullifier: Nullifier,
}

impl ProofEnvelope {
    /// Builds an envelope with the correctly derived nullifier.
    pub fn seal(body: ProofBody) -> Self {
        let nullifier = body.nullifier();
        Self { body, nullifier }
    }
}

impl CanonicalEncode for ProofEnvelope {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("body");
        w.bytes(&self.body.canonical_bytes());
        w.text("nullifier");
        w.bytes(&self.nullifier);
        w.text("typeId");
        w.uint(self.body.kind().type_id() as u64);
    }
}

impl CanonicalDecode for ProofEnvelope {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut body_bytes: Option<Vec<u8>> = None;
        let mut nullifier = None;
        let mut type_id = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "body" => {
                    let raw = r.bytes()?;
                    if raw.len() > MAX_PROOF_BYTES {
                        return Err(SchemaError::SizeBound("proof envelope body"));
                    }
                    body_bytes = Some(raw.to_vec());
                }
                "nullifier" => nullifier = Some(r.bytes_exact::<32>("nullifier")?),
                "typeId" => type_id = Some(r.uint_within(u8::MAX as u64, "typeId")? as u8),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        let kind = ProofKind::from_type_id(require(type_id, "typeId")?)?;
        let body = ProofBody::decode_kind(kind, &require(body_bytes, "body")?)?;
        Ok(Self {
            body,
            nullifier: require(nullifier, "nullifier")?,
        })
    }
}

/// The uniform projection the scorer consumes: the kind and the costed
/// unit count its policy mapping applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiInputs {
    /// The proof kind, selecting the policy mapping.
    pub kind: ProofKind,
    /// The normalized unit count fed to `g_kind`.
    pub units: u64,
}

/// Verifier outputs that project into scorer inputs.
pub trait PsiSource {
    /// The uniform ψ projection; the scorer consumes nothing else.
    fn psi_inputs(&self) -> PsiInputs;
}

/// Validated verifier output, one tagged record per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofMetrics {
    /// Hash-share metrics; the draw digest feeds the `−ln u` term.
    HashShare {
        /// The draw digest derived from the nonce domain.
        draw: [u8; 32],
        /// Ratio of the share target to the draw, µ-scaled.
        d_ratio: u64,
        /// Whether the draw met the policy share target.
        target_pass: bool,
    },
    /// AI metrics.
    Ai {
        /// Verified costed work units.
        ai_units: u64,
        /// Fraction of traps passed, µ-scaled.
        traps_ratio: u64,
        /// Declared replication factor, µ-scaled.
        redundancy: u64,
        /// QoS score, µ-scaled; zero when unreported.
        qos: u64,
    },
    /// Quantum metrics.
    Quantum {
        /// `α_family · qubits · depth · ln(1 + shots)` in policy units.
        quantum_units: u64,
        /// Fraction of traps passed, µ-scaled.
        traps_ratio: u64,
    },
    /// Storage metrics.
    Storage {
        /// Replication factor, µ-scaled.
        redundancy: u64,
        /// Fraction of challenges answered, µ-scaled.
        availability: u64,
        /// Proven capacity in bytes.
        capacity: u64,
    },
    /// VDF metrics.
    Vdf {
        /// Verified delay mapped through the pinned calibration, seconds.
        vdf_seconds_equiv: u64,
    },
}

impl ProofMetrics {
    /// The kind this record was produced by.
    pub fn kind(&self) -> ProofKind {
        match self {
            Self::HashShare { .. } => ProofKind::HashShare,
            Self::Ai { .. } => ProofKind::Ai,
            Self::Quantum { .. } => ProofKind::Quantum,
            Self::Storage { .. } => ProofKind::Storage,
            Self::Vdf { .. } => ProofKind::Vdf,
        }
    }

    /// The metric subset a receipt carries so ψ can be re-derived without
    /// rerunning the heavy verifier.
    pub fn receipt_subset(&self) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        match self {
            Self::HashShare {
                d_ratio,
                target_pass,
                ..
            } => {
                out.insert("dRatio".into(), *d_ratio);
                out.insert("targetPass".into(), *target_pass as u64);
            }
            Self::Ai {
                traps_ratio,
                redundancy,
                qos,
                ..
            } => {
                out.insert("qos".into(), *qos);
                out.insert("redundancy".into(), *redundancy);
                out.insert("trapsRatio".into(), *traps_ratio);
            }
            Self::Quantum { traps_ratio, .. } => {
                out.insert("trapsRatio".into(), *traps_ratio);
            }
            Self::Storage {
                redundancy,
                availability,
                capacity,
            } => {
                out.insert("availability".into(), *availability);
                out.insert("capacity".into(), *capacity);
                out.insert("redundancy".into(), *redundancy);
            }
            Self::Vdf { vdf_seconds_equiv } => {
                out.insert("vdfSecondsEquiv".into(), *vdf_seconds_equiv);
            }
        }
        out
    }
}

impl PsiSource for ProofMetrics {
    fn psi_inputs(&self) -> PsiInputs {
        let units = match self {
            // The hash share contributes through the draw, not through ψ.
            Self::HashShare { .. } => 0,
            Self::Ai { ai_units, .. } => *ai_units,
            Self::Quantum { quantum_units, .. } => *quantum_units,
            Self::Storage {
                availability,
                capacity,
                ..
            } => mul_micro(*capacity >> 30, *availability),
            Self::Vdf { vdf_seconds_equiv } => *vdf_seconds_equiv,
        };
        PsiInputs {
            kind: self.kind(),
            units,
        }
    }
}

/// The consensus-visible summary of one verified envelope.
///
/// Receipts are permanent; full envelopes may be pruned once the receipt
/// root is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReceipt {
    /// The metric subset needed to re-derive ψ.
    pub metrics: BTreeMap<String, u64>,
    /// The consumed nullifier.
    pub nullifier: Nullifier,
    /// The ψ input after verification and clipping, µ-nats.
    pub psi_input: u64,
    /// The proof kind.
    pub kind: ProofKind,
    /// Costed units as verified.
    pub units: u64,
}

impl CanonicalEncode for ProofReceipt {
    fn encode(&self, w: &mut Writer) {
        w.map(5);
        w.text("metrics");
        w.map(self.metrics.len());
        for (name, value) in &self.metrics {
            w.text(name);
            w.uint(*value);
        }
        w.text("nullifier");
        w.bytes(&self.nullifier);
        w.text("psiInput");
        w.uint(self.psi_input);
        w.text("typeId");
        w.uint(self.kind.type_id() as u64);
        w.text("units");
        w.uint(self.units);
    }
}

impl CanonicalDecode for ProofReceipt {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut metrics = None;
        let mut nullifier = None;
        let mut psi_input = None;
        let mut kind = None;
        let mut units = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "metrics" => {
                    let mut inner = MapReader::new(r)?;
                    let mut out = BTreeMap::new();
                    while let Some(name) = inner.next_key(r)? {
                        out.insert(name.to_string(), r.uint()?);
                    }
                    metrics = Some(out);
                }
                "nullifier" => nullifier = Some(r.bytes_exact::<32>("nullifier")?),
                "psiInput" => psi_input = Some(r.uint()?),
                "typeId" => {
                    kind = Some(ProofKind::from_type_id(
                        r.uint_within(u8::MAX as u64, "typeId")? as u8,
                    )?)
                }
                "units" => units = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            metrics: require(metrics, "metrics")?,
            nullifier: require(nullifier, "nullifier")?,
            psi_input: require(psi_input, "psiInput")?,
            kind: require(kind, "typeId")?,
            units: require(units, "units")?,
        })
    }
}
