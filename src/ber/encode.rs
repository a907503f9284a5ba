//! BER encoding.
//!
//! The encoder writes forward. Opening a constructed element reserves a
//! one-byte length placeholder; closing it patches the placeholder in
//! place, widening it to the long form when the content turned out to be
//! 128 bytes or more. Inner elements close before their parents, so every
//! patch happens at a position that later splices cannot move.

use super::length::write_length;
use super::tag;
use crate::oid::Oid;
use crate::value::BitString;
use bytes::Bytes;

/// Forward-writing BER encoder.
pub struct Encoder {
    buf: Vec<u8>,
}

/// Handle for an open constructed element, returned by
/// [`Encoder::open_constructed`] and consumed by
/// [`Encoder::close_constructed`]. Must be closed in LIFO order.
#[must_use = "constructed elements must be closed"]
pub struct ConstructedHeader {
    len_at: usize,
}

impl Encoder {
    /// Create an encoder with a capacity suited to typical SNMP messages.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create an encoder with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Open a constructed element (SEQUENCE, PDU).
    pub fn open_constructed(&mut self, tag: u8) -> ConstructedHeader {
        self.buf.push(tag);
        self.buf.push(0); // length placeholder, patched on close
        ConstructedHeader {
            len_at: self.buf.len() - 1,
        }
    }

    /// Close a constructed element, patching its length placeholder.
    pub fn close_constructed(&mut self, header: ConstructedHeader) {
        let content_len = self.buf.len() - header.len_at - 1;
        if content_len < 128 {
            self.buf[header.len_at] = content_len as u8;
        } else {
            let mut long = Vec::with_capacity(5);
            write_length(&mut long, content_len);
            self.buf.splice(header.len_at..header.len_at + 1, long);
        }
    }

    /// Encode a constructed element with contents written by `f`.
    pub fn constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let header = self.open_constructed(tag);
        f(self);
        self.close_constructed(header);
    }

    /// Encode a SEQUENCE with contents written by `f`.
    pub fn sequence<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.constructed(tag::universal::SEQUENCE, f);
    }

    /// Encode a signed INTEGER in minimal two's-complement form.
    pub fn write_integer(&mut self, value: i64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        if value >= 0 {
            while start < bytes.len() - 1 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
                start += 1;
            }
        } else {
            while start < bytes.len() - 1 && bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0 {
                start += 1;
            }
        }
        self.buf.push(tag::universal::INTEGER);
        write_length(&mut self.buf, bytes.len() - start);
        self.buf.extend_from_slice(&bytes[start..]);
    }

    /// Encode an unsigned value under the given tag.
    ///
    /// Minimal-length big-endian; a `0x00` is prepended when the leading
    /// content byte would otherwise set the sign bit.
    pub fn write_unsigned(&mut self, tag: u8, value: u64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 && bytes[start] == 0 {
            start += 1;
        }
        let needs_pad = bytes[start] & 0x80 != 0;
        self.buf.push(tag);
        write_length(&mut self.buf, bytes.len() - start + usize::from(needs_pad));
        if needs_pad {
            self.buf.push(0);
        }
        self.buf.extend_from_slice(&bytes[start..]);
    }

    /// Encode an unsigned 32-bit value under the given tag.
    pub fn write_unsigned32(&mut self, tag: u8, value: u32) {
        self.write_unsigned(tag, u64::from(value));
    }

    /// Encode an OCTET STRING.
    pub fn write_octet_string(&mut self, data: &[u8]) {
        self.write_raw(tag::universal::OCTET_STRING, data);
    }

    /// Encode a NULL.
    pub fn write_null(&mut self) {
        self.buf.push(tag::universal::NULL);
        self.buf.push(0);
    }

    /// Encode an exception marker or other implicit-NULL tag.
    pub fn write_empty(&mut self, tag: u8) {
        self.buf.push(tag);
        self.buf.push(0);
    }

    /// Encode an OBJECT IDENTIFIER.
    pub fn write_oid(&mut self, oid: &Oid) {
        let content = oid.to_ber();
        self.write_raw(tag::universal::OBJECT_IDENTIFIER, &content);
    }

    /// Encode an IpAddress (APPLICATION 0, four octets).
    pub fn write_ip_address(&mut self, addr: [u8; 4]) {
        self.write_raw(tag::application::IP_ADDRESS, &addr);
    }

    /// Encode an NsapAddress (APPLICATION 5, six octets).
    pub fn write_nsap_address(&mut self, addr: [u8; 6]) {
        self.write_raw(tag::application::NSAP_ADDRESS, &addr);
    }

    /// Encode a BIT STRING: one unused-bits octet, then the padded bits.
    pub fn write_bit_string(&mut self, bits: &BitString) {
        self.buf.push(tag::universal::BIT_STRING);
        write_length(&mut self.buf, bits.bytes().len() + 1);
        self.buf.push(bits.unused_bits());
        self.buf.extend_from_slice(bits.bytes());
    }

    /// Encode arbitrary content under the given tag.
    pub fn write_raw(&mut self, tag: u8, content: &[u8]) {
        self.buf.push(tag);
        write_length(&mut self.buf, content.len());
        self.buf.extend_from_slice(content);
    }

    /// Finalize and return the encoded bytes.
    pub fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }

    /// Finalize and return as `Vec<u8>`.
    pub fn finish_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
