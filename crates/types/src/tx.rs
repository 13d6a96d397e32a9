//! Transactions, signature tuples, and addresses.
//!
//! A transaction's signing preimage is `"tx-v1" || 0x00 || cbor(unsigned)`,
//! where the unsigned encoding is the signed one minus the `signature`
//! field. Addresses commit to the signer's algorithm and key hash, so a
//! signature can never be replayed under a different algorithm id.

use crate::codec::{require, CanonicalDecode, CanonicalEncode, MapReader, Reader, Writer};
use crate::error::SchemaError;
use crate::hashing::{hash_domain, DomainTag};
use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A signature algorithm identifier as committed in addresses and policy.
pub type AlgId = u16;

/// The human-readable part of every Animica address.
pub const ADDRESS_HRP: &str = "anim";

/// Length of the binary address payload: `alg_id (2) || key hash (32)`.
pub const ADDRESS_BYTES: usize = 34;

/// An account address: `alg_id (u16 BE) || sha3_256(pubkey)`.
///
/// The key hash is domain-tagged (`"addr-v1"`), so address digests cannot
/// collide with any other preimage in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    /// The signature algorithm this account is locked to.
    pub alg_id: AlgId,
    /// The tagged SHA3-256 hash of the account's public key.
    pub key_hash: [u8; 32],
}

impl Address {
    /// Derives the address that `pubkey` spends from under `alg_id`.
    pub fn derive(alg_id: AlgId, pubkey: &[u8]) -> Self {
        Self {
            alg_id,
            key_hash: hash_domain(DomainTag::AddrV1, pubkey),
        }
    }

    /// The 34-byte binary payload.
    pub fn to_bytes(self) -> [u8; ADDRESS_BYTES] {
        let mut out = [0u8; ADDRESS_BYTES];
        out[..2].copy_from_slice(&self.alg_id.to_be_bytes());
        out[2..].copy_from_slice(&self.key_hash);
        out
    }

    /// Parses the 34-byte binary payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let raw: [u8; ADDRESS_BYTES] =
            bytes.try_into().map_err(|_| SchemaError::InvalidLength {
                field: "address",
                expected: ADDRESS_BYTES,
                got: bytes.len(),
            })?;
        let alg_id = u16::from_be_bytes([raw[0], raw[1]]);
        let mut key_hash = [0u8; 32];
        key_hash.copy_from_slice(&raw[2..]);
        Ok(Self { alg_id, key_hash })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hrp = Hrp::parse(ADDRESS_HRP).map_err(|_| fmt::Error)?;
        let encoded =
            bech32::encode::<Bech32m>(hrp, &self.to_bytes()).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for Address {
    type Err = SchemaError;

    /// Parses a bech32m address; the bech32m checksum constant is strictly
    /// required, so legacy bech32 strings are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let checked = CheckedHrpstring::new::<Bech32m>(s)
            .map_err(|e| SchemaError::InvalidValue(format!("bech32m: {e}")))?;
        let expected = Hrp::parse(ADDRESS_HRP)
            .map_err(|e| SchemaError::InvalidValue(format!("hrp: {e}")))?;
        if checked.hrp() != expected {
            return Err(SchemaError::InvalidValue(format!(
                "address HRP {} is not {ADDRESS_HRP}",
                checked.hrp()
            )));
        }
        let payload: Vec<u8> = checked.byte_iter().collect();
        Self::from_bytes(&payload)
    }
}

impl CanonicalEncode for Address {
    fn encode(&self, w: &mut Writer) {
        w.bytes(&self.to_bytes());
    }
}

impl CanonicalDecode for Address {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        Self::from_bytes(r.bytes()?)
    }
}

/// A 256-bit value amount, stored big-endian.
///
/// On the wire it is a byte string with leading zeros stripped, so every
/// amount has exactly one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct U256(pub [u8; 32]);

impl U256 {
    /// The zero amount.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Builds an amount from a u64.
    pub fn from_u64(v: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&v.to_be_bytes());
        Self(out)
    }

    fn minimal_bytes(&self) -> &[u8] {
        let start = self.0.iter().position(|b| *b != 0).unwrap_or(32);
        &self.0[start..]
    }
}

impl CanonicalEncode for U256 {
    fn encode(&self, w: &mut Writer) {
        w.bytes(self.minimal_bytes());
    }
}

impl CanonicalDecode for U256 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let raw = r.bytes()?;
        if raw.len() > 32 {
            return Err(SchemaError::InvalidLength {
                field: "value",
                expected: 32,
                got: raw.len(),
            });
        }
        if raw.first() == Some(&0) {
            return Err(SchemaError::InvalidValue(
                "value has a leading zero byte".into(),
            ));
        }
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(raw);
        Ok(Self(out))
    }
}

/// The kind of state transition a transaction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    /// A plain value transfer.
    Transfer,
    /// Contract deployment; `to` is null.
    Deploy,
    /// A contract call.
    Call,
}

impl TxKind {
    fn wire(self) -> u64 {
        match self {
            Self::Transfer => 0,
            Self::Deploy => 1,
            Self::Call => 2,
        }
    }

    fn from_wire(v: u64) -> Result<Self, SchemaError> {
        match v {
            0 => Ok(Self::Transfer),
            1 => Ok(Self::Deploy),
            2 => Ok(Self::Call),
            other => Err(SchemaError::InvalidValue(format!(
                "unknown transaction kind {other}"
            ))),
        }
    }
}

/// One access-list entry: an address and the storage slots it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessItem {
    /// The account whose storage is pre-declared.
    pub address: Address,
    /// The declared storage slots.
    pub slots: Vec<[u8; 32]>,
}

impl CanonicalEncode for AccessItem {
    fn encode(&self, w: &mut Writer) {
        w.map(2);
        w.text("address");
        self.address.encode(w);
        w.text("slots");
        w.array(self.slots.len());
        for slot in &self.slots {
            w.bytes(slot);
        }
    }
}

impl CanonicalDecode for AccessItem {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut address = None;
        let mut slots = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "address" => address = Some(Address::decode(r)?),
                "slots" => {
                    let len = r.array()?;
                    let mut out = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        out.push(r.bytes_exact::<32>("slot")?);
                    }
                    slots = Some(out);
                }
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            address: require(address, "address")?,
            slots: require(slots, "slots")?,
        })
    }
}

/// The signature tuple carried by a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTuple {
    /// The signature algorithm id; must match the sender address.
    pub alg_id: AlgId,
    /// The signer's public key.
    pub pubkey: Vec<u8>,
    /// The detached signature over the signing preimage.
    pub sig: Vec<u8>,
}

impl CanonicalEncode for SignatureTuple {
    fn encode(&self, w: &mut Writer) {
        w.map(3);
        w.text("algId");
        w.uint(self.alg_id as u64);
        w.text("pubkey");
        w.bytes(&self.pubkey);
        w.text("sig");
        w.bytes(&self.sig);
    }
}

impl CanonicalDecode for SignatureTuple {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut alg_id = None;
        let mut pubkey = None;
        let mut sig = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "algId" => alg_id = Some(r.uint_within(u16::MAX as u64, "algId")? as u16),
                "pubkey" => pubkey = Some(r.bytes()?.to_vec()),
                "sig" => sig = Some(r.bytes()?.to_vec()),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        Ok(Self {
            alg_id: require(alg_id, "algId")?,
            pubkey: require(pubkey, "pubkey")?,
            sig: require(sig, "sig")?,
        })
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The chain this transaction is valid on.
    pub chain_id: u32,
    /// The sender address; must equal `derive(signature.alg_id, pubkey)`.
    pub from: Address,
    /// The sender's account nonce.
    pub nonce: u64,
    /// What the transaction does.
    pub kind: TxKind,
    /// The recipient; null exactly when `kind` is `Deploy`.
    pub to: Option<Address>,
    /// The transferred amount.
    pub value: U256,
    /// The gas limit.
    pub gas_limit: u64,
    /// The gas price.
    pub gas_price: u64,
    /// Pre-declared state access; omitted from the wire when empty.
    pub access_list: Vec<AccessItem>,
    /// Call data or deployment code.
    pub data: Vec<u8>,
    /// The signature tuple.
    pub signature: SignatureTuple,
}

impl Transaction {
    /// Encodes the map body shared by the signed and unsigned forms.
    fn encode_fields(&self, w: &mut Writer, with_signature: bool) {
        let mut len = 9;
        if !self.access_list.is_empty() {
            len += 1;
        }
        if with_signature {
            len += 1;
        }
        w.map(len);
        if !self.access_list.is_empty() {
            w.text("accessList");
            w.array(self.access_list.len());
            for item in &self.access_list {
                item.encode(w);
            }
        }
        w.text("chainId");
        w.uint(self.chain_id as u64);
        w.text("data");
        w.bytes(&self.data);
        w.text("from");
        self.from.encode(w);
        w.text("gasLimit");
        w.uint(self.gas_limit);
        w.text("gasPrice");
        w.uint(self.gas_price);
        w.text("kind");
        w.uint(self.kind.wire());
        w.text("nonce");
        w.uint(self.nonce);
        if with_signature {
            w.text("signature");
            self.signature.encode(w);
        }
        w.text("to");
        match self.to {
            Some(addr) => addr.encode(w),
            None => w.null(),
        }
        w.text("value");
        self.value.encode(w);
    }

    /// The exact byte string the sender signs:
    /// `"tx-v1" || 0x00 || canonical_cbor(unsigned_tx)`.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_fields(&mut w, false);
        let body = w.into_bytes();
        let tag = DomainTag::TxV1.as_str().as_bytes();
        let mut out = Vec::with_capacity(tag.len() + 1 + body.len());
        out.extend_from_slice(tag);
        out.push(0x00);
        out.extend_from_slice(&body);
        out
    }
}

impl CanonicalEncode for Transaction {
    fn encode(&self, w: &mut Writer) {
        self.encode_fields(w, true);
    }
}

impl CanonicalDecode for Transaction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        let mut m = MapReader::new(r)?;
        let mut access_list = Vec::new();
        let mut chain_id = None;
        let mut data = None;
        let mut from = None;
        let mut gas_limit = None;
        let mut gas_price = None;
        let mut kind = None;
        let mut nonce = None;
        let mut signature = None;
        let mut to = None;
        let mut value = None;
        while let Some(key) = m.next_key(r)? {
            match key {
                "accessList" => {
                    let len = r.array()?;
                    if len == 0 {
                        return Err(SchemaError::InvalidValue(
                            "empty accessList must be omitted".into(),
                        ));
                    }
                    for _ in 0..len {
                        access_list.push(AccessItem::decode(r)?);
                    }
                }
                "chainId" => chain_id = Some(r.uint_within(u32::MAX as u64, "chainId")? as u32),
                "data" => data = Some(r.bytes()?.to_vec()),
                "from" => from = Some(Address::decode(r)?),
                "gasLimit" => gas_limit = Some(r.uint()?),
                "gasPrice" => gas_price = Some(r.uint()?),
                "kind" => kind = Some(TxKind::from_wire(r.uint()?)?),
                "nonce" => nonce = Some(r.uint()?),
                "signature" => signature = Some(SignatureTuple::decode(r)?),
                "to" => {
                    to = Some(if r.take_null()? {
                        None
                    } else {
                        Some(Address::decode(r)?)
                    })
                }
                "value" => value = Some(U256::decode(r)?),
                other => return Err(SchemaError::UnknownField(other.into())),
            }
        }
        let kind = require(kind, "kind")?;
        let to = require(to, "to")?;
        match (kind, to.is_some()) {
            (TxKind::Deploy, true) => {
                return Err(SchemaError::InvalidValue("deploy carries a recipient".into()))
            }
            (TxKind::Transfer | TxKind::Call, false) => {
                return Err(SchemaError::InvalidValue("missing recipient".into()))
            }
            _ => {}
        }
        Ok(Self {
            chain_id: require(chain_id, "chainId")?,
            from: require(from, "from")?,
            nonce: require(nonce, "nonce")?,
            kind,
            to,
            value: require(value, "value")?,
            gas_limit: require(gas_limit, "gasLimit")?,
            gas_price: require(gas_price, "gasPrice")?,
            access_list,
            data: require(data, "data")?,
            signature: require(signature, "signature")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_bytes_canonical, to_bytes_canonical};

    fn sample_tx() -> Transaction {
        let from = Address::derive(1, b"sender public key");
        Transaction {
            chain_id: 7,
            from,
            nonce: 42,
            kind: TxKind::Transfer,
            to: Some(Address::derive(1, b"recipient public key")),
            value: U256::from_u64(1_000_000),
            gas_limit: 21_000,
            gas_price: 5,
            access_list: vec![],
            data: vec![],
            signature: SignatureTuple {
                alg_id: 1,
                pubkey: b"sender public key".to_vec(),
                sig: vec![0xAB; 64],
            },
        }
    }

    #[test]
    fn roundtrip_is_byte_identical() {
        let tx = sample_tx();
        let bytes = to_bytes_canonical(&tx);
        let back: Transaction = from_bytes_canonical(&bytes).unwrap();
        assert_eq!(tx, back);
        assert_eq!(bytes, to_bytes_canonical(&back));
    }

    #[test]
    fn signing_message_excludes_signature() {
        let mut tx = sample_tx();
        let msg_a = tx.signing_message();
        tx.signature.sig = vec![0xCD; 64];
        assert_eq!(msg_a, tx.signing_message());
        assert!(msg_a.starts_with(b"tx-v1\x00"));
    }

    #[test]
    fn deploy_recipient_rules() {
        let mut tx = sample_tx();
        tx.kind = TxKind::Deploy;
        // Deploy with a recipient must fail decoding.
        let bytes = to_bytes_canonical(&tx);
        assert!(from_bytes_canonical::<Transaction>(&bytes).is_err());
        tx.to = None;
        let bytes = to_bytes_canonical(&tx);
        assert!(from_bytes_canonical::<Transaction>(&bytes).is_ok());
    }

    #[test]
    fn address_bech32m_roundtrip() {
        let addr = Address::derive(2, b"a key");
        let s = addr.to_string();
        assert!(s.starts_with("anim1"));
        let back: Address = s.parse().unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn address_derivation_binds_alg_id() {
        let a = Address::derive(1, b"key");
        let b = Address::derive(2, b"key");
        assert_eq!(a.key_hash, b.key_hash);
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn value_minimal_encoding() {
        let bytes = to_bytes_canonical(&U256::from_u64(0x01_00));
        // Byte string of length 2: 0x42 0x01 0x00.
        assert_eq!(bytes, vec![0x42, 0x01, 0x00]);
        assert_eq!(to_bytes_canonical(&U256::ZERO), vec![0x40]);
        // A leading zero byte is rejected.
        assert!(from_bytes_canonical::<U256>(&[0x42, 0x00, 0x01]).is_err());
    }
}
