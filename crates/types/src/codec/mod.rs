//! The canonical, deterministic CBOR codec for all consensus-critical data.
//!
//! Every object that is hashed, signed, or committed to a Merkle root in
//! the Animica core round-trips through this module. The canonical subset
//! is: definite lengths only, shortest-form unsigned integers, UTF-8 text
//! map keys in strictly ascending byte order, explicit `null` only where a
//! schema permits it, and no floats or tags. Two encodings of the same
//! logical object are byte-identical; anything else fails decoding with a
//! [`SchemaError`](crate::error::SchemaError).
//!
//! General-purpose serializers cannot promise these rejections, so struct
//! codecs are hand-written against each schema's field table.

mod read;
mod write;

pub use read::{require, MapReader, Reader};
pub use write::Writer;

use crate::error::SchemaError;

/// Types with a canonical CBOR encoding.
pub trait CanonicalEncode {
    /// Appends the canonical encoding of `self` to `w`.
    fn encode(&self, w: &mut Writer);
}

/// Types that decode strictly from canonical CBOR.
pub trait CanonicalDecode: Sized {
    /// Decodes one item from `r`, rejecting every non-canonical form.
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError>;
}

/// Encodes a value into its unique canonical byte representation.
pub fn to_bytes_canonical<T: CanonicalEncode>(v: &T) -> Vec<u8> {
    let mut w = Writer::new();
    v.encode(&mut w);
    w.into_bytes()
}

/// Decodes a value from canonical bytes, rejecting trailing data.
pub fn from_bytes_canonical<T: CanonicalDecode>(b: &[u8]) -> Result<T, SchemaError> {
    let mut r = Reader::new(b);
    let v = T::decode(&mut r)?;
    r.finish()?;
    Ok(v)
}

impl CanonicalEncode for u64 {
    fn encode(&self, w: &mut Writer) {
        w.uint(*self);
    }
}

impl CanonicalDecode for u64 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        r.uint()
    }
}

impl CanonicalEncode for Vec<u8> {
    fn encode(&self, w: &mut Writer) {
        w.bytes(self);
    }
}

impl CanonicalDecode for Vec<u8> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        Ok(r.bytes()?.to_vec())
    }
}

impl<const N: usize> CanonicalEncode for [u8; N] {
    fn encode(&self, w: &mut Writer) {
        w.bytes(self);
    }
}

impl<const N: usize> CanonicalDecode for [u8; N] {
    fn decode(r: &mut Reader<'_>) -> Result<Self, SchemaError> {
        r.bytes_exact::<N>("byte array")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    #[test]
    fn uint_shortest_forms() {
        for (v, expect) in [
            (0u64, vec![0x00]),
            (23, vec![0x17]),
            (24, vec![0x18, 0x18]),
            (255, vec![0x18, 0xff]),
            (256, vec![0x19, 0x01, 0x00]),
            (65535, vec![0x19, 0xff, 0xff]),
            (65536, vec![0x1a, 0x00, 0x01, 0x00, 0x00]),
            (u32::MAX as u64 + 1, vec![0x1b, 0, 0, 0, 1, 0, 0, 0, 0]),
        ] {
            assert_eq!(to_bytes_canonical(&v), expect, "encoding of {v}");
            assert_eq!(from_bytes_canonical::<u64>(&expect).unwrap(), v);
        }
    }

    #[test]
    fn overwide_uint_rejected() {
        // 24 encoded with a one-byte argument where the immediate form fits.
        let overwide = [0x18, 0x17];
        assert_eq!(
            from_bytes_canonical::<u64>(&overwide),
            Err(SchemaError::NonCanonicalInt)
        );
        // 100 encoded as a two-byte argument.
        let overwide = [0x19, 0x00, 0x64];
        assert_eq!(
            from_bytes_canonical::<u64>(&overwide),
            Err(SchemaError::NonCanonicalInt)
        );
    }

    #[test]
    fn floats_rejected() {
        // 1.5 as a float16.
        let f16 = [0xf9, 0x3e, 0x00];
        assert_eq!(
            from_bytes_canonical::<u64>(&f16),
            Err(SchemaError::FloatForbidden)
        );
        // 1.0 as a float64.
        let f64_ = [0xfb, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            from_bytes_canonical::<u64>(&f64_),
            Err(SchemaError::FloatForbidden)
        );
    }

    #[test]
    fn indefinite_and_tags_rejected() {
        // Indefinite-length byte string.
        assert_eq!(
            from_bytes_canonical::<Vec<u8>>(&[0x5f, 0x41, 0x00, 0xff]),
            Err(SchemaError::IndefiniteLength)
        );
        // Tag 2 (bignum) wrapping a byte string.
        assert_eq!(
            from_bytes_canonical::<Vec<u8>>(&[0xc2, 0x41, 0x01]),
            Err(SchemaError::TagForbidden)
        );
    }

    #[test]
    fn negative_integers_rejected() {
        assert_eq!(
            from_bytes_canonical::<u64>(&[0x20]),
            Err(SchemaError::UnexpectedType { expected: "unsigned" })
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(
            from_bytes_canonical::<u64>(&[0x01, 0x02]),
            Err(SchemaError::TrailingBytes)
        );
    }

    #[test]
    fn map_key_order_enforced() {
        // {"b": 1, "a": 2} — keys descending.
        let bad = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        let mut r = Reader::new(&bad);
        let mut m = MapReader::new(&mut r).unwrap();
        assert_eq!(m.next_key(&mut r).unwrap(), Some("b"));
        r.uint().unwrap();
        assert_eq!(m.next_key(&mut r), Err(SchemaError::UnsortedKeys));
    }

    #[test]
    fn duplicate_map_key_rejected() {
        let bad = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        let mut r = Reader::new(&bad);
        let mut m = MapReader::new(&mut r).unwrap();
        assert_eq!(m.next_key(&mut r).unwrap(), Some("a"));
        r.uint().unwrap();
        assert_eq!(m.next_key(&mut r), Err(SchemaError::DuplicateKey));
    }

    #[test]
    fn fixed_width_bytes_checked() {
        let b = to_bytes_canonical(&[7u8; 32]);
        let back: [u8; 32] = from_bytes_canonical(&b).unwrap();
        assert_eq!(back, [7u8; 32]);
        assert!(matches!(
            from_bytes_canonical::<[u8; 32]>(&to_bytes_canonical(&[7u8; 31])),
            Err(SchemaError::InvalidLength { .. })
        ));
    }

    #[test]
    fn bool_and_null() {
        let mut w = Writer::new();
        w.array(3);
        w.bool(true);
        w.bool(false);
        w.null();
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0x83, 0xf5, 0xf4, 0xf6]);

        let mut r = Reader::new(&bytes);
        r.array_exact(3, "triple").unwrap();
        assert!(r.bool().unwrap());
        assert!(!r.bool().unwrap());
        assert!(r.take_null().unwrap());
        r.finish().unwrap();
    }
}
