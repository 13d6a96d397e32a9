//! The strict canonical CBOR reader.
//!
//! The reader accepts exactly the forms the writer can produce and rejects
//! everything else: indefinite lengths, floats, tags, non-shortest integer
//! encodings, unsorted or duplicate map keys, and trailing bytes. Strict
//! decoding is what makes every consensus preimage unique; a permissive
//! reader here would reopen encoding malleability.

use super::write::{
    MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_SIMPLE, MAJOR_TEXT, MAJOR_UINT, SIMPLE_FALSE,
    SIMPLE_NULL, SIMPLE_TRUE,
};
use crate::error::SchemaError;

const MAJOR_NINT: u8 = 1;
const MAJOR_TAG: u8 = 6;

/// A cursor over canonical CBOR bytes.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes remaining after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SchemaError> {
        if self.remaining() < n {
            return Err(SchemaError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, SchemaError> {
        Ok(self.take(1)?[0])
    }

    /// Peeks at the next initial byte without consuming it.
    fn peek(&self) -> Result<u8, SchemaError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(SchemaError::UnexpectedEof)
    }

    /// Reads a head, enforcing definite lengths and shortest-form values.
    fn head(&mut self) -> Result<(u8, u64), SchemaError> {
        let initial = self.byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;
        if major == MAJOR_TAG {
            return Err(SchemaError::TagForbidden);
        }
        if major == MAJOR_NINT {
            // No consensus schema carries negative integers.
            return Err(SchemaError::UnexpectedType { expected: "unsigned" });
        }
        if major == MAJOR_SIMPLE {
            // Major 7 carries simple values and floats; only false, true,
            // and null are representable in the canonical subset.
            return match info {
                SIMPLE_FALSE | SIMPLE_TRUE | SIMPLE_NULL => Ok((MAJOR_SIMPLE, info as u64)),
                25 | 26 | 27 => Err(SchemaError::FloatForbidden),
                24 => {
                    let s = self.byte()?;
                    Err(SchemaError::UnsupportedSimple(s))
                }
                31 => Err(SchemaError::IndefiniteLength),
                other => Err(SchemaError::UnsupportedSimple(other)),
            };
        }
        let value = match info {
            0..=23 => info as u64,
            24 => {
                let v = self.byte()? as u64;
                if v < 24 {
                    return Err(SchemaError::NonCanonicalInt);
                }
                v
            }
            25 => {
                let v = u16::from_be_bytes(self.take(2)?.try_into().expect("len checked")) as u64;
                if v <= u8::MAX as u64 {
                    return Err(SchemaError::NonCanonicalInt);
                }
                v
            }
            26 => {
                let v = u32::from_be_bytes(self.take(4)?.try_into().expect("len checked")) as u64;
                if v <= u16::MAX as u64 {
                    return Err(SchemaError::NonCanonicalInt);
                }
                v
            }
            27 => {
                let v = u64::from_be_bytes(self.take(8)?.try_into().expect("len checked"));
                if v <= u32::MAX as u64 {
                    return Err(SchemaError::NonCanonicalInt);
                }
                v
            }
            31 => return Err(SchemaError::IndefiniteLength),
            _ => return Err(SchemaError::NonCanonicalInt),
        };
        Ok((major, value))
    }

    /// Reads an unsigned integer.
    pub fn uint(&mut self) -> Result<u64, SchemaError> {
        match self.head()? {
            (MAJOR_UINT, v) => Ok(v),
            _ => Err(SchemaError::UnexpectedType { expected: "unsigned" }),
        }
    }

    /// Reads an unsigned integer that must fit `field`'s declared width.
    pub fn uint_within(&mut self, max: u64, field: &'static str) -> Result<u64, SchemaError> {
        let v = self.uint()?;
        if v > max {
            return Err(SchemaError::IntOutOfRange { field });
        }
        Ok(v)
    }

    /// Reads a definite-length byte string.
    pub fn bytes(&mut self) -> Result<&'a [u8], SchemaError> {
        match self.head()? {
            (MAJOR_BYTES, len) => self.take(len as usize),
            _ => Err(SchemaError::UnexpectedType { expected: "bytes" }),
        }
    }

    /// Reads a byte string that must be exactly `N` bytes long.
    pub fn bytes_exact<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N], SchemaError> {
        let b = self.bytes()?;
        b.try_into().map_err(|_| SchemaError::InvalidLength {
            field,
            expected: N,
            got: b.len(),
        })
    }

    /// Reads a UTF-8 text string.
    pub fn text(&mut self) -> Result<&'a str, SchemaError> {
        match self.head()? {
            (MAJOR_TEXT, len) => {
                let raw = self.take(len as usize)?;
                std::str::from_utf8(raw)
                    .map_err(|_| SchemaError::InvalidValue("text is not valid UTF-8".into()))
            }
            _ => Err(SchemaError::UnexpectedType { expected: "text" }),
        }
    }

    /// Reads an array head and returns the element count.
    pub fn array(&mut self) -> Result<u64, SchemaError> {
        match self.head()? {
            (MAJOR_ARRAY, len) => Ok(len),
            _ => Err(SchemaError::UnexpectedType { expected: "array" }),
        }
    }

    /// Reads an array head that must announce exactly `n` elements.
    pub fn array_exact(&mut self, n: u64, field: &'static str) -> Result<(), SchemaError> {
        let len = self.array()?;
        if len != n {
            return Err(SchemaError::InvalidLength {
                field,
                expected: n as usize,
                got: len as usize,
            });
        }
        Ok(())
    }

    /// Reads a map head and returns the pair count.
    pub fn map(&mut self) -> Result<u64, SchemaError> {
        match self.head()? {
            (MAJOR_MAP, len) => Ok(len),
            _ => Err(SchemaError::UnexpectedType { expected: "map" }),
        }
    }

    /// Reads a boolean.
    pub fn bool(&mut self) -> Result<bool, SchemaError> {
        match self.head()? {
            (MAJOR_SIMPLE, v) if v == SIMPLE_TRUE as u64 => Ok(true),
            (MAJOR_SIMPLE, v) if v == SIMPLE_FALSE as u64 => Ok(false),
            _ => Err(SchemaError::UnexpectedType { expected: "bool" }),
        }
    }

    /// Returns true (and consumes the item) when the next item is null.
    pub fn take_null(&mut self) -> Result<bool, SchemaError> {
        if self.peek()? == (MAJOR_SIMPLE << 5) | SIMPLE_NULL {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Asserts that the reader consumed its whole input.
    pub fn finish(self) -> Result<(), SchemaError> {
        if self.remaining() != 0 {
            return Err(SchemaError::TrailingBytes);
        }
        Ok(())
    }
}

/// Iterates a canonical map, enforcing strictly ascending unique text keys.
pub struct MapReader<'a> {
    remaining: u64,
    last_key: Option<&'a str>,
}

impl<'a> MapReader<'a> {
    /// Reads the map head from `r` and prepares key iteration.
    pub fn new(r: &mut Reader<'a>) -> Result<Self, SchemaError> {
        let remaining = r.map()?;
        Ok(Self {
            remaining,
            last_key: None,
        })
    }

    /// Returns the next key, or `None` once all pairs are consumed.
    ///
    /// The caller must decode exactly one value from the reader between
    /// successive calls.
    pub fn next_key(&mut self, r: &mut Reader<'a>) -> Result<Option<&'a str>, SchemaError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let key = r.text()?;
        if let Some(prev) = self.last_key {
            if key.as_bytes() == prev.as_bytes() {
                return Err(SchemaError::DuplicateKey);
            }
            if key.as_bytes() < prev.as_bytes() {
                return Err(SchemaError::UnsortedKeys);
            }
        }
        self.last_key = Some(key);
        Ok(Some(key))
    }
}

/// Takes `opt`, erroring with `MissingField` when the field never appeared.
pub fn require<T>(opt: Option<T>, field: &'static str) -> Result<T, SchemaError> {
    opt.ok_or(SchemaError::MissingField(field))
}
