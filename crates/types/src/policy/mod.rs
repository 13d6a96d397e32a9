//! Content-addressed policy bundles.
//!
//! Policy tables are immutable once loaded: the scorer and verifiers key
//! everything off a bundle whose canonical-CBOR hash must equal the
//! header's `policyRoots` commitment. A mismatched root always fails
//! closed; the core never guesses policy.

use crate::block::PolicyRoots;
use crate::codec::{
    require, to_bytes_canonical, CanonicalDecode, CanonicalEncode, MapReader, Reader, Writer,
};
use crate::error::SchemaError;
use crate::hashing::{hash_domain, sha3_256, DomainTag};
use crate::proof::ProofKind;
use crate::tx::AlgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-kind table of µ-scaled values (caps or unit scalers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTable {
    /// Value for AI proofs.
    pub ai: u64,
    /// Value for quantum proofs.
    pub quantum: u64,
    /// Value for storage proofs.
    pub storage: u64,
    /// Value for VDF proofs.
    pub vdf: u64,
}

impl KindTable {
    /// Looks up the value for `kind`; the hash share has no entry.
    pub fn get(&self, kind: ProofKind) -> Option<u64> {
        match kind {
            ProofKind::HashShare => None,
            ProofKind::Ai => Some(self.ai),
            ProofKind::Quantum => Some(self.quantum),
            ProofKind::Storage => Some(self.storage),
            ProofKind::Vdf => Some(self.vdf),
        }
    }
}

impl CanonicalEncode for KindTable {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("ai");
        w.uint(self.ai);
        w.text("quantum");
        w.uint(self.quantum);
        w.text("storage");
        w.uint(self.storage);
        w.text("vdf");
        w.uint(self.vdf);
    }
}

impl CanonicalDecode for KindTable {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut ai = None;
        let mut quantum = None;
        let mut storage = None;
        let mut vdf = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "ai" => ai = Some(r.uint()?),
                "quantum" => quantum = Some(r.uint()?),
                "storage" => storage = Some(r.uint()?),
                "vdf" => vdf = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            ai: require(ai, "ai")?,
            quantum: require(quantum, "quantum")?,
            storage: require(storage, "storage")?,
            vdf: require(vdf, "vdf")?,
        })
    }
}

/// Trap thresholds for AI proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiTrapParams {
    /// Minimum number of trap challenges.
    pub m_min: u32,
    /// Minimum pass ratio, µ-scaled.
    pub r_min: u64,
}

impl CanonicalEncode for AiTrapParams {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("mMin");
        w.uint(self.m_min as u64);
        w.text("rMin");
        w.uint(self.r_min);
    }
}

impl CanonicalDecode for AiTrapParams {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut m_min = None;
        let mut r_min = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "mMin" => m_min = Some(r.uint_within(u32::MAX as u64, "mMin")? as u32),
                "rMin" => r_min = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            m_min: require(m_min, "mMin")?,
            r_min: require(r_min, "rMin")?,
        })
    }
}

/// Trap parameters for quantum proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumTrapParams {
    /// Size of the public trap-circuit corpus.
    pub corpus_size: u64,
    /// Minimum number of trap circuits per proof.
    pub count_min: u32,
    /// Per-outcome tolerance for deterministic traps, µ-scaled.
    pub epsilon: u64,
    /// Total-variation bound for probabilistic traps, µ-scaled.
    pub tau: u64,
}

impl CanonicalEncode for QuantumTrapParams {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("corpusSize");
        w.uint(self.corpus_size);
        w.text("countMin");
        w.uint(self.count_min as u64);
        w.text("epsilon");
        w.uint(self.epsilon);
        w.text("tau");
        w.uint(self.tau);
    }
}

impl CanonicalDecode for QuantumTrapParams {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut corpus_size = None;
        let mut count_min = None;
        let mut epsilon = None;
        let mut tau = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "corpusSize" => corpus_size = Some(r.uint()?),
                "countMin" => count_min = Some(r.uint_within(u32::MAX as u64, "countMin")? as u32),
                "epsilon" => epsilon = Some(r.uint()?),
                "tau" => tau = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            corpus_size: require(corpus_size, "corpusSize")?,
            count_min: require(count_min, "countMin")?,
            epsilon: require(epsilon, "epsilon")?,
            tau: require(tau, "tau")?,
        })
    }
}

/// Window and challenge parameters for storage heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Maximum blocks between window end and the enclosing height.
    pub anchor_max_lag: u64,
    /// Number of seed-derived challenges per heartbeat.
    pub challenge_count: u32,
    /// Required window length in blocks.
    pub window_blocks: u64,
}

impl CanonicalEncode for StorageParams {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("anchorMaxLag");
        w.uint(self.anchor_max_lag);
        w.text("challengeCount");
        w.uint(self.challenge_count as u64);
        w.text("windowBlocks");
        w.uint(self.window_blocks);
    }
}

impl CanonicalDecode for StorageParams {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut anchor_max_lag = None;
        let mut challenge_count = None;
        let mut window_blocks = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "anchorMaxLag" => anchor_max_lag = Some(r.uint()?),
                "challengeCount" => {
                    challenge_count = Some(r.uint_within(u32::MAX as u64, "challengeCount")? as u32)
                }
                "windowBlocks" => window_blocks = Some(r.uint()?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            anchor_max_lag: require(anchor_max_lag, "anchorMaxLag")?,
            challenge_count: require(challenge_count, "challengeCount")?,
            window_blocks: require(window_blocks, "windowBlocks")?,
        })
    }
}

/// The pinned VDF group and calibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdfParams {
    /// Calibrated sequential iterations per second.
    pub calibrated_ips: u64,
    /// The RSA group modulus, big-endian.
    pub modulus: Vec<u8>,
}

impl CanonicalEncode for VdfParams {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("calibratedIps");
        w.uint(self.calibrated_ips);
        w.text("modulus");
        w.bytes(&self.modulus);
    }
}

impl CanonicalDecode for VdfParams {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut calibrated_ips = None;
        let mut modulus = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "calibratedIps" => calibrated_ips = Some(r.uint()?),
                "modulus" => modulus = Some(r.bytes()?.to_vec()),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            calibrated_ips: require(calibrated_ips, "calibratedIps")?,
            modulus: require(modulus, "modulus")?,
        })
    }
}

/// The PoIES policy table committed under `policyRoots.poies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiesPolicy {
    /// Admitted TEE enclave measurements.
    pub ai_measurements: Vec<[u8; 32]>,
    /// AI trap thresholds.
    pub ai_traps: AiTrapParams,
    /// α scalers per quantum hardware family, µ-scaled.
    pub alpha_families: BTreeMap<String, u64>,
    /// Per-kind ψ caps `C_type`, µ-nats.
    pub caps: KindTable,
    /// Escort parameter `q` in (0, 1], µ-scaled.
    pub escort_q: u64,
    /// Total cap Γ on Σψ per block, µ-nats.
    pub gamma: u64,
    /// Nullifier lifetime in blocks.
    pub nullifier_ttl: u64,
    /// Pinned QPU provider key roots (`sha3_256(provider_pubkey)`).
    pub qpu_roots: Vec<[u8; 32]>,
    /// Quantum trap parameters.
    pub quantum_traps: QuantumTrapParams,
    /// Hash-share target digest; a draw passes when `d ≤ target`.
    pub share_target: [u8; 32],
    /// Storage heartbeat parameters.
    pub storage: StorageParams,
    /// µ-nats credited per costed unit, per kind.
    pub unit_scalers: KindTable,
    /// VDF group and calibration.
    pub vdf: VdfParams,
    /// Pinned TEE vendor key roots (`sha3_256(vendor_pubkey)`).
    pub vendor_roots: Vec<[u8; 32]>,
}

impl PoiesPolicy {
    /// The content address of this table.
    pub fn root(&self) -> [u8; 32] {
        sha3_256(&to_bytes_canonical(self))
    }
}

impl CanonicalEncode for PoiesPolicy {
    fn encode(&self, w: &mut Writer) {
        w.map(14);
        w.text("aiMeasurements");
        w.array(self.ai_measurements.len());
        for m in &self.ai_measurements {
            w.bytes(m);
        }
        w.text("aiTraps");
        self.ai_traps.encode(w);
        w.text("alphaFamilies");
        w.map(self.alpha_families.len());
        for (family, alpha) in &self.alpha_families {
            w.text(family);
            w.uint(*alpha);
        }
        w.text("caps");
        self.caps.encode(w);
        w.text("escortQ");
        w.uint(self.escort_q);
        w.text("gamma");
        w.uint(self.gamma);
        w.text("nullifierTtl");
        w.uint(self.nullifier_ttl);
        w.text("qpuRoots");
        w.array(self.qpu_roots.len());
        for root in &self.qpu_roots {
            w.bytes(root);
        }
        w.text("quantumTraps");
        self.quantum_traps.encode(w);
        w.text("shareTarget");
        w.bytes(&self.share_target);
        w.text("storage");
        self.storage.encode(w);
        w.text("unitScalers");
        self.unit_scalers.encode(w);
        w.text("vdf");
        self.vdf.encode(w);
        w.text("vendorRoots");
        w.array(self.vendor_roots.len());
        for root in &self.vendor_roots {
            w.bytes(root);
        }
    }
}

impl CanonicalDecode for PoiesPolicy {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut ai_measurements = None;
        let mut ai_traps = None;
        let mut alpha_families = None;
        let mut caps = None;
        let mut escort_q = None;
        let mut gamma = None;
        let mut nullifier_ttl = None;
        let mut qpu_roots = None;
        let mut quantum_traps = None;
        let mut share_target = None;
        let mut storage = None;
        let mut unit_scalers = None;
        let mut vdf = None;
        let mut vendor_roots = None;
        fn root_array(r: &mut Reader<'_>) -> Result<Vec<[u8; 32]>, SchemaError> {
            let len = r.array()?;
            let mut out = Vec::with_capacity(len as usize);
            for _ in 0..len {
                out.push(r.bytes_exact::<32>("root")?);
            }
            Ok(out)
        }
        while let Some(key) = m.next_key(r)? {
            match key {
                "aiMeasurements" => ai_measurements = Some(root_array(r)?),
                "aiTraps" => ai_traps = Some(AiTrapParams::decode(r)?),
                "alphaFamilies" => {
                    let mut inner = MapReader::new(r)?;
                    let mut out = BTreeMap::new();
                    while let Some(family) = inner.next_key(r)? {
                        out.insert(family.to_string(), r.uint()?);
                    }
                    alpha_families = Some(out);
                }
                "caps" => caps = Some(KindTable::decode(r)?),
                "escortQ" => escort_q = Some(r.uint()?),
                "gamma" => gamma = Some(r.uint()?),
                "nullifierTtl" => nullifier_ttl = Some(r.uint()?),
                "qpuRoots" => qpu_roots = Some(root_array(r)?),
                "quantumTraps" => quantum_traps = Some(QuantumTrapParams::decode(r)?),
                "shareTarget" => share_target = Some(r.bytes_exact::<32>("shareTarget")?),
                "storage" => storage = Some(StorageParams::decode(r)?),
                "unitScalers" => unit_scalers = Some(KindTable::decode(r)?),
                "vdf" => vdf = Some(VdfParams::decode(r)?),
                "vendorRoots" => vendor_roots = Some(root_array(r)?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            ai_measurements: require(ai_measurements, "aiMeasurements")?,
            ai_traps: require(ai_traps, "aiTraps")?,
            alpha_families: require(alpha_families, "alphaFamilies")?,
            caps: require(caps, "caps")?,
            escort_q: require(escort_q, "escortQ")?,
            gamma: require(gamma, "gamma")?,
            nullifier_ttl: require(nullifier_ttl, "nullifierTtl")?,
            qpu_roots: require(qpu_roots, "qpuRoots")?,
            quantum_traps: require(quantum_traps, "quantumTraps")?,
            share_target: require(share_target, "shareTarget")?,
            storage: require(storage, "storage")?,
            unit_scalers: require(unit_scalers, "unitScalers")?,
            vdf: require(vdf, "vdf")?,
            vendor_roots: require(vendor_roots, "vendorRoots")?,
        })
    }
}

/// One admitted signature algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgEntry {
    /// The algorithm id as committed in addresses.
    pub alg_id: AlgId,
    /// Maximum accepted public key size.
    pub max_pubkey_bytes: u32,
    /// Maximum accepted signature size.
    pub max_sig_bytes: u32,
    /// Human-readable algorithm name.
    pub name: String,
}

impl CanonicalEncode for AlgEntry {
    fn encode(&self, w: &mut Writer) {
        w.map(4);
        w.text("algId");
        w.uint(self.alg_id as u64);
        w.text("maxPubkeyBytes");
        w.uint(self.max_pubkey_bytes as u64);
        w.text("maxSigBytes");
        w.uint(self.max_sig_bytes as u64);
        w.text("name");
        w.text(&self.name);
    }
}

impl CanonicalDecode for AlgEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut alg_id = None;
        let mut max_pubkey_bytes = None;
        let mut max_sig_bytes = None;
        let mut name = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algId" => alg_id = Some(r.uint_within(u16::MAX as u64, "algId")? as u16),
                "maxPubkeyBytes" => {
                    max_pubkey_bytes = Some(r.uint_within(u32::MAX as u64, "maxPubkeyBytes")? as u32)
                }
                "maxSigBytes" => {
                    max_sig_bytes = Some(r.uint_within(u32::MAX as u64, "maxSigBytes")? as u32)
                }
                "name" => name = Some(r.text()?.to_string()),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            alg_id: require(alg_id, "algId")?,
            max_pubkey_bytes: require(max_pubkey_bytes, "maxPubkeyBytes")?,
            max_sig_bytes: require(max_sig_bytes, "maxSigBytes")?,
            name: require(name, "name")?,
        })
    }
}

/// The PQ algorithm policy committed under `policyRoots.algPolicy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgPolicy {
    /// Admitted algorithms, ascending by `alg_id`.
    pub algs: Vec<AlgEntry>,
}

impl AlgPolicy {
    /// The content address of this table (SHA3-512 domain, truncated).
    pub fn root(&self) -> [u8; 32] {
        hash_domain(DomainTag::AlgPolicyRootV1, &to_bytes_canonical(self))
    }

    /// Looks up an admitted algorithm.
    pub fn entry(&self, alg_id: AlgId) -> Option<&AlgEntry> {
        self.algs.iter().find(|e| e.alg_id == alg_id)
    }

    /// Whether `alg_id` is admitted with the given key and signature sizes.
    pub fn admits(&self, alg_id: AlgId, pubkey_len: usize, sig_len: usize) -> bool {
        self.entry(alg_id).is_some_and(|e| {
            pubkey_len <= e.max_pubkey_bytes as usize && sig_len <= e.max_sig_bytes as usize
        })
    }
}

impl CanonicalEncode for AlgPolicy {
    fn encode(&self, w: &mut Writer) {
        w.map(1);
        w.text("algs");
        w.array(self.algs.len());
        for entry in &self.algs {
            entry.encode(w);
        }
    }
}

impl CanonicalDecode for AlgPolicy {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut algs = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algs" => {
                    let len = r.array()?;
                    let mut out: Vec<AlgEntry> = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        let entry = AlgEntry::decode(r)?;
                        if let Some(prev) = out.last() {
                            if entry.alg_id <= prev.alg_id {
                                return Err(SchemaError::InvalidValue(
                                    "alg entries not ascending by id".into(),
                                ));
                            }
                        }
                        out.push(entry);
                    }
                    algs = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            algs: require(algs, "algs")?,
        })
    }
}

/// The loaded pair of policy tables a node scores against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBundle {
    /// The PoIES policy table.
    pub poies: PoiesPolicy,
    /// The algorithm policy table.
    pub alg: AlgPolicy,
}

impl PolicyBundle {
    /// The roots a header must commit for this bundle to be active.
    pub fn roots(&self) -> PolicyRoots {
        PolicyRoots {
            alg_policy: self.alg.root(),
            poies: self.poies.root(),
        }
    }

    /// Whether this bundle matches a header's committed roots bit-exactly.
    pub fn matches(&self, roots: &PolicyRoots) -> bool {
        self.roots() == *roots
    }

    /// Loads a bundle from an operator-supplied JSON document.
    pub fn from_json(doc: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(doc)
    }

    /// A deterministic bundle for local networks and tests.
    ///
    /// These are not mainnet values; mainnet tables arrive out of band and
    /// are selected by their roots.
    pub fn dev() -> Self {
        let mut alpha_families = BTreeMap::new();
        alpha_families.insert("superconducting".to_string(), 1_200_000);
        alpha_families.insert("trapped-ion".to_string(), 1_500_000);

        let mut share_target = [0xff_u8; 32];
        share_target[0] = 0x10;

        Self {
            poies: PoiesPolicy {
                ai_measurements: Vec::new(),
                ai_traps: AiTrapParams {
                    m_min: 4,
                    r_min: 900_000,
                },
                alpha_families,
                caps: KindTable {
                    ai: 2_500_000,
                    quantum: 2_500_000,
                    storage: 1_500_000,
                    vdf: 1_500_000,
                },
                escort_q: 500_000,
                gamma: 4_000_000,
                nullifier_ttl: 4096,
                qpu_roots: Vec::new(),
                quantum_traps: QuantumTrapParams {
                    corpus_size: 1024,
                    count_min: 2,
                    epsilon: 10_000,
                    tau: 50_000,
                },
                share_target,
                storage: StorageParams {
                    anchor_max_lag: 64,
                    challenge_count: 8,
                    window_blocks: 128,
                },
                unit_scalers: KindTable {
                    ai: 100_000,
                    quantum: 1_000,
                    storage: 50_000,
                    vdf: 10_000,
                },
                vdf: VdfParams {
                    calibrated_ips: 1_000_000,
                    modulus: dev_modulus(),
                },
                vendor_roots: Vec::new(),
            },
            alg: AlgPolicy {
                algs: vec![
                    AlgEntry {
                        alg_id: 1,
                        max_pubkey_bytes: 2_048,
                        max_sig_bytes: 4_096,
                        name: "ml-dsa-65".to_string(),
                    },
                    AlgEntry {
                        alg_id: 2,
                        max_pubkey_bytes: 64,
                        max_sig_bytes: 8_192,
                        name: "sphincs-sha2-128s".to_string(),
                    },
                ],
            },
        }
    }
}

/// A deterministic 2048-bit odd modulus for local networks.
fn dev_modulus() -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    for counter in 0u8..8 {
        let block = sha3_256(&[b"animica-dev-vdf-modulus".as_slice(), &[counter]].concat());
        out.extend_from_slice(&block);
    }
    out[0] |= 0x80;
    out[255] |= 0x01;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::from_bytes_canonical;

    #[test]
    fn bundle_roots_are_stable_and_content_addressed() {
        let a = PolicyBundle::dev();
        let b = PolicyBundle::dev();
        assert_eq!(a.roots(), b.roots());
        assert!(a.matches(&b.roots()));

        let mut c = PolicyBundle::dev();
        c.poies.gamma += 1;
        assert_ne!(a.roots().poies, c.roots().poies);
        assert_eq!(a.roots().alg_policy, c.roots().alg_policy);
        assert!(!c.matches(&a.roots()));
    }

    #[test]
    fn poies_policy_roundtrip() {
        let policy = PolicyBundle::dev().poies;
        let bytes = to_bytes_canonical(&policy);
        let back: PoiesPolicy = from_bytes_canonical(&bytes).unwrap();
        assert_eq!(policy, back);
        assert_eq!(policy.root(), back.root());
    }

    #[test]
    fn alg_policy_admission_bounds() {
        let alg = PolicyBundle::dev().alg;
        assert!(alg.admits(1, 1952, 3309));
        assert!(!alg.admits(1, 5_000, 3309));
        assert!(!alg.admits(3, 32, 64));
    }

    #[test]
    fn alg_entries_must_ascend() {
        let mut alg = PolicyBundle::dev().alg;
        alg.algs.swap(0, 1);
        let bytes = to_bytes_canonical(&alg);
        assert!(from_bytes_canonical::<AlgPolicy>(&bytes).is_err());
    }

    #[test]
    fn json_loading_matches_in_memory_bundle() {
        let bundle = PolicyBundle::dev();
        let doc = serde_json::to_string(&bundle).unwrap();
        let loaded = PolicyBundle::from_json(&doc).unwrap();
        assert_eq!(bundle.roots(), loaded.roots());
    }

    #[test]
    fn dev_modulus_shape() {
        let m = dev_modulus();
        assert_eq!(m.len(), 256);
        assert_eq!(m[0] & 0x80, 0x80);
        assert_eq!(m[255] & 0x01, 0x01);
    }
}
