//! BER decoding.
//!
//! The decoder is a cursor over a `Bytes` buffer; nested constructed
//! elements hand out sub-decoders over zero-copy slices of the same
//! allocation. Decoding is strict where the wire format allows it to be:
//! truncation, length overflow, and malformed integers are errors, never
//! silent truncation.

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::value::BitString;
use bytes::Bytes;

/// Cursor-style BER decoder.
#[derive(Debug)]
pub struct Decoder {
    data: Bytes,
    offset: usize,
}

impl Decoder {
    /// Create a decoder over a byte buffer.
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a decoder from a slice (copies the data).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Current offset into the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// True when the cursor has consumed everything.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek at the next tag byte without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let Some(&byte) = self.data.get(self.offset) else {
            return Err(Error::decode(self.offset, DecodeErrorKind::TruncatedData));
        };
        self.offset += 1;
        Ok(byte)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Read a length field.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) = decode_length(&self.data[self.offset..], self.offset)?;
        self.offset += consumed;
        Ok(len)
    }

    /// Read `len` raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(Error::decode(self.offset, DecodeErrorKind::TruncatedData));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Read a tag, failing unless it matches; returns the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let at = self.offset;
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                at,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        self.read_length()
    }

    /// Read a signed INTEGER (tag + length + content).
    pub fn read_integer(&mut self) -> Result<i64> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        self.read_integer_content(len)
    }

    /// Read signed integer content of a pre-read length.
    ///
    /// Lengths of 0 or more than 8 bytes are malformed.
    pub fn read_integer_content(&mut self, len: usize) -> Result<i64> {
        if len == 0 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > 8 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::IntegerTooLong { length: len },
            ));
        }
        let bytes = self.read_bytes(len)?;
        let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for &byte in bytes.iter() {
            value = (value << 8) | i64::from(byte);
        }
        Ok(value)
    }

    /// Read a signed INTEGER that must fit in 32 bits.
    pub fn read_i32(&mut self) -> Result<i32> {
        let at = self.offset;
        let value = self.read_integer()?;
        i32::try_from(value).map_err(|_| Error::decode(at, DecodeErrorKind::IntegerOverflow))
    }

    /// Read unsigned 32-bit content of a pre-read length.
    ///
    /// Up to 5 bytes: one optional `0x00` sign pad plus four value bytes.
    pub fn read_unsigned32_content(&mut self, len: usize) -> Result<u32> {
        let value = self.read_unsigned_content(len, 5)?;
        u32::try_from(value)
            .map_err(|_| Error::decode(self.offset, DecodeErrorKind::IntegerOverflow))
    }

    /// Read unsigned 64-bit content of a pre-read length (up to 9 bytes).
    pub fn read_unsigned64_content(&mut self, len: usize) -> Result<u64> {
        self.read_unsigned_content(len, 9)
    }

    fn read_unsigned_content(&mut self, len: usize, max_len: usize) -> Result<u64> {
        if len == 0 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > max_len {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::IntegerTooLong { length: len },
            ));
        }
        let bytes = self.read_bytes(len)?;
        if len == max_len && bytes[0] != 0 {
            return Err(Error::decode(self.offset, DecodeErrorKind::IntegerOverflow));
        }
        let mut value: u64 = 0;
        for &byte in bytes.iter() {
            value = (value << 8) | u64::from(byte);
        }
        Ok(value)
    }

    /// Read an unsigned 32-bit value under the given tag.
    pub fn read_unsigned32(&mut self, expected_tag: u8) -> Result<u32> {
        let len = self.expect_tag(expected_tag)?;
        self.read_unsigned32_content(len)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        let len = self.expect_tag(tag::universal::NULL)?;
        if len != 0 {
            return Err(Error::decode(self.offset, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        self.read_oid_content(len)
    }

    /// Read OID content of a pre-read length.
    pub fn read_oid_content(&mut self, len: usize) -> Result<Oid> {
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes)
    }

    /// Read BIT STRING content of a pre-read length.
    pub fn read_bit_string_content(&mut self, len: usize) -> Result<BitString> {
        if len == 0 {
            return Err(Error::decode(self.offset, DecodeErrorKind::InvalidBitString));
        }
        let bytes = self.read_bytes(len)?;
        let unused = bytes[0];
        let data = bytes.slice(1..);
        if unused > 7 || (data.is_empty() && unused != 0) {
            return Err(Error::decode(self.offset, DecodeErrorKind::InvalidBitString));
        }
        BitString::new(data.clone(), data.len() * 8 - unused as usize)
            .ok_or_else(|| Error::decode(self.offset, DecodeErrorKind::InvalidBitString))
    }

    /// Read a SEQUENCE, returning a decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Read a constructed element with the given tag, returning a decoder
    /// over its contents.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        let content = self.read_bytes(len)?;
        Ok(Decoder {
            data: content,
            offset: 0,
        })
    }

    /// Hand out a sub-decoder over the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let content = self.read_bytes(len)?;
        Ok(Decoder {
            data: content,
            offset: 0,
        })
    }
}
