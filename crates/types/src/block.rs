//! Core block structures: `Header`, `Block`, and `PolicyRoots`.
//!
//! A header is immutable once sealed: its hash is the domain-tagged digest
//! of its canonical encoding, `H("header-v1" || 0x00 || cbor(header))`.

use crate::codec::{
    from_bytes_canonical, require, to_bytes_canonical, CanonicalDecode, CanonicalEncode,
    MapReader, Reader, Writer,
};
use crate::error::SchemaError;
use crate::hashing::{hash_domain, DomainTag};
use crate::proof::ProofEnvelope;
use crate::tx::Transaction;
use crate::{BlockHash, MAX_BLOCK_BYTES, MAX_PROOFS_PER_BLOCK};
use serde::{Deserialize, Serialize};

/// The header's bit-exact commitment to the two external policy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRoots {
    /// Hash of the PQ algorithm policy (`"alg-policy-root-v1"`, SHA3-512).
    pub alg_policy: [u8; 32],
    /// Hash of the PoIES policy table.
    pub poies: [u8; 32],
}

impl CanonicalEncode for PolicyRoots {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("algPolicy");
        w.bytes(&self.alg_policy);
        w.text("poies");
        w.bytes(&self.poies);
    }
}

impl CanonicalDecode for PolicyRoots {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut alg_policy = None;
        let mut poies = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algPolicy" => alg_policy = Some(r.bytes_exact::<32>("algPolicy")?),
                "poies" => poies = Some(r.bytes_exact::<32>("poies")?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            alg_policy: require(alg_policy, "algPolicy")?,
            poies: require(poies, "poies")?,
        })
    }
}

/// A sealed block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent header; all-zero for genesis.
    pub parent_hash: BlockHash,
    /// Block height; strictly contiguous on any valid chain.
    pub number: u64,
    /// Seal time in UNIX seconds.
    pub timestamp: u64,
    /// The chain this header extends.
    pub chain_id: u32,
    /// State commitment after executing this block.
    pub state_root: [u8; 32],
    /// Merkle root of the canonical transaction encodings.
    pub tx_root: [u8; 32],
    /// Merkle root of the execution receipts.
    pub receipts_root: [u8; 32],
    /// Merkle root of the canonical proof receipts, in envelope order.
    pub proofs_root: [u8; 32],
    /// Data-availability commitment.
    pub da_root: [u8; 32],
    /// The randomness-beacon seed this header contributes.
    pub mix_seed: [u8; 32],
    /// The miner's lottery nonce.
    pub nonce: [u8; 8],
    /// The declared difficulty threshold Θ in µ-nats.
    pub theta: u64,
    /// Commitments to the active policy tables.
    pub policy_roots: PolicyRoots,
    /// Header format version.
    pub version: u16,
}

impl Header {
    /// The sealed header hash: `H("header-v1" || 0x00 || cbor(header))`.
    pub fn hash(&self) -> BlockHash {
        hash_domain(DomainTag::HeaderV1, &to_bytes_canonical(self))
    }

    /// Whether this header has the genesis shape: height zero and an
    /// all-zero parent.
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash == [0u8; 32]
    }
}

impl CanonicalEncode for Header {
    fn encode(&self, w: &mut Writer) {
        w.map(14);
        w.text("chainId");
        w.uint(self.chain_id as u64);
        w.text("daRoot");
        w.bytes(&self.da_root);
        w.text("mixSeed");
        w.bytes(&self.mix_seed);
        w.text("nonce");
        w.bytes(&self.nonce);
        w.text("number");
        w.uint(self.number);
        w.text("parentHash");
        w.bytes(&self.parent_hash);
        w.text("policyRoots");
        self.policy_roots.encode(w);
        w.text("proofsRoot");
        w.bytes(&self.proofs_root);
        w.text("receiptsRoot");
        w.bytes(&self.receipts_root);
        w.text("stateRoot");
        w.bytes(&self.state_root);
        w.text("theta");
        w.uint(self.theta);
        w.text("timestamp");
        w.uint(self.timestamp);
        w.text("txRoot");
        w.bytes(&self.tx_root);
        w.text("version");
        w.uint(self.version as u64);
    }
}

impl CanonicalDecode for Header {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut chain_id = None;
        let mut da_root = None;
        let mut mix_seed = None;
        let mut nonce = None;
        let mut number = None;
        let mut parent_hash = None;
        let mut policy_roots = None;
        let mut proofs_root = None;
        let mut receipts_root = None;
        let mut state_root = None;
        let mut theta = None;
        let mut timestamp = None;
        let mut tx_root = None;
        let mut version = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "chainId" => chain_id = Some(r.uint_within(u32::MAX as u64, "chainId")? as u32),
                "daRoot" => da_root = Some(r.bytes_exact::<32>("daRoot")?),
                "mixSeed" => mix_seed = Some(r.bytes_exact::<32>("mixSeed")?),
                "nonce" => nonce = Some(r.bytes_exact::<8>("nonce")?),
                "number" => number = Some(r.uint()?),
                "parentHash" => parent_hash = Some(r.bytes_exact::<32>("parentHash")?),
                "policyRoots" => policy_roots = Some(PolicyRoots::decode(r)?),
                "proofsRoot" => proofs_root = Some(r.bytes_exact::<32>("proofsRoot")?),
                "receiptsRoot" => receipts_root = Some(r.bytes_exact::<32>("receiptsRoot")?),
                "stateRoot" => state_root = Some(r.bytes_exact::<32>("stateRoot")?),
                "theta" => theta = Some(r.uint()?),
                "timestamp" => timestamp = Some(r.uint()?),
                "txRoot" => tx_root = Some(r.bytes_exact::<32>("txRoot")?),
                "version" => version = Some(r.uint_within(u16::MAX as u64, "version")? as u16),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            parent_hash: require(parent_hash, "parentHash")?,
            number: require(number, "number")?,
            timestamp: require(timestamp, "timestamp")?,
            chain_id: require(chain_id, "chainId")?,
            state_root: require(state_root, "stateRoot")?,
            tx_root: require(tx_root, "txRoot")?,
            receipts_root: require(receipts_root, "receiptsRoot")?,
            proofs_root: require(proofs_root, "proofsRoot")?,
            da_root: require(da_root, "daRoot")?,
            mix_seed: require(mix_seed, "mixSeed")?,
            nonce: require(nonce, "nonce")?,
            theta: require(theta, "theta")?,
            policy_roots: require(policy_roots, "policyRoots")?,
            version: require(version, "version")?,
        })
    }
}

/// A full block: the header plus its transaction and proof payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The sealed header.
    pub header: Header,
    /// The proof envelopes, in commitment order.
    pub proofs: Vec<ProofEnvelope>,
    /// The transactions, in execution order.
    pub txs: Vec<Transaction>,
}

impl Block {
    /// Decodes a block from wire bytes, enforcing the size bounds.
    pub fn decode_wire(bytes: &[u8]) -> Result<Self, SchemaError> {
        if bytes.len() > MAX_BLOCK_BYTES {
            return Err(SchemaError::SizeBound("block"));
        }
        from_bytes_canonical(bytes)
    }
}

impl CanonicalEncode for Block {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("header");
        self.header.encode(w);
        w.text("proofs");
        w.array(self.proofs.len());
        for p in &self.proofs {
            p.encode(w);
        }
        w.text("txs");
        w.array(self.txs.len());
        for tx in &self.txs {
            tx.encode(w);
        }
    }
}

impl CanonicalDecode for Block {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut header = None;
        let mut proofs = None;
        let mut txs = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "header" => header = Some(Header::decode(r)?),
                "proofs" => {
                    let len = r.array()?;
                    if len as usize > MAX_PROOFS_PER_BLOCK {
                        return Err(SchemaError::SizeBound("proof pack"));
                    }
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(ProofEnvelope::decode(r)?);
                    }
                    proofs = Some(out);
                }
                "txs" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(Transaction::decode(r)?);
                    }
                    txs = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            header: require(header, "header")?,
            proofs: require(proofs, "proofs")?,
            txs: require(txs, "txs")?,
        })
    }
}
