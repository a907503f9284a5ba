//! SNMP value types.
//!
//! [`Value`] is the tagged sum over every type a varbind can carry,
//! including the SNMPv2 exception markers. Unrecognized tags are a decode
//! error; this engine does not preserve unknown value types.

use crate::ber::{tag, Decoder, Encoder};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use bytes::Bytes;

/// An ASN.1 BIT STRING: bits packed MSB-first into bytes, padded up to the
/// nearest octet, with the count of valid bits recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitString {
    data: Bytes,
    bit_len: usize,
}

impl BitString {
    /// Create a bit string from packed bytes and a valid-bit count.
    ///
    /// Returns `None` unless `data` is exactly the number of octets needed
    /// to hold `bit_len` bits.
    pub fn new(data: Bytes, bit_len: usize) -> Option<Self> {
        if data.len() != bit_len.div_ceil(8) {
            return None;
        }
        Some(Self { data, bit_len })
    }

    /// The packed bytes, padding bits included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of valid bits.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of padding bits in the final octet.
    pub fn unused_bits(&self) -> u8 {
        (self.data.len() * 8 - self.bit_len) as u8
    }
}

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER (signed 32-bit), tag 0x02
    Integer(i32),
    /// BIT STRING, tag 0x03
    BitString(BitString),
    /// OCTET STRING, tag 0x04
    OctetString(Bytes),
    /// NULL, tag 0x05
    Null,
    /// OBJECT IDENTIFIER, tag 0x06
    ObjectIdentifier(Oid),
    /// IpAddress (4 bytes, big-endian), tag 0x40
    IpAddress([u8; 4]),
    /// Counter32 (unsigned 32-bit, wrapping), tag 0x41
    Counter32(u32),
    /// Gauge32 (unsigned 32-bit, non-wrapping), tag 0x42
    Gauge32(u32),
    /// TimeTicks (hundredths of seconds), tag 0x43
    TimeTicks(u32),
    /// Opaque (arbitrary bytes), tag 0x44
    Opaque(Bytes),
    /// NsapAddress (6 bytes), tag 0x45
    NsapAddress([u8; 6]),
    /// Counter64 (unsigned 64-bit, wrapping; SNMPv2c only), tag 0x46
    Counter64(u64),
    /// Unsigned32, tag 0x47
    Uint32(u32),
    /// noSuchObject exception (v2, implicit NULL), tag 0x80
    NoSuchObject,
    /// noSuchInstance exception (v2, implicit NULL), tag 0x81
    NoSuchInstance,
    /// endOfMibView exception (v2, implicit NULL), tag 0x82
    EndOfMibView,
}

impl Value {
    /// Try to get as i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u32 (Counter32, Gauge32, TimeTicks, Uint32, or a
    /// non-negative Integer).
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) | Value::Uint32(v) => {
                Some(*v)
            }
            Value::Integer(v) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }

    /// Try to get as u64 (Counter64 or anything `as_u32` accepts).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            _ => self.as_u32().map(u64::from),
        }
    }

    /// Try to get as bytes (OctetString or Opaque).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(v) | Value::Opaque(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as a UTF-8 string.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Try to get as an OID.
    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    /// Try to get as an IPv4 address.
    pub fn as_ip(&self) -> Option<std::net::Ipv4Addr> {
        match self {
            Value::IpAddress(octets) => Some(std::net::Ipv4Addr::from(*octets)),
            _ => None,
        }
    }

    /// True for the v2 exception markers.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Encode to BER.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Value::Integer(v) => enc.write_integer(i64::from(*v)),
            Value::BitString(bits) => enc.write_bit_string(bits),
            Value::OctetString(data) => enc.write_octet_string(data),
            Value::Null => enc.write_null(),
            Value::ObjectIdentifier(oid) => enc.write_oid(oid),
            Value::IpAddress(addr) => enc.write_ip_address(*addr),
            Value::Counter32(v) => enc.write_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => enc.write_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => enc.write_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => enc.write_raw(tag::application::OPAQUE, data),
            Value::NsapAddress(addr) => enc.write_nsap_address(*addr),
            Value::Counter64(v) => enc.write_unsigned(tag::application::COUNTER64, *v),
            Value::Uint32(v) => enc.write_unsigned32(tag::application::UINT32, *v),
            Value::NoSuchObject => enc.write_empty(tag::context::NO_SUCH_OBJECT),
            Value::NoSuchInstance => enc.write_empty(tag::context::NO_SUCH_INSTANCE),
            Value::EndOfMibView => enc.write_empty(tag::context::END_OF_MIB_VIEW),
        }
    }

    /// Decode from BER.
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let at = dec.offset();
        let tag = dec.read_tag()?;
        let len = dec.read_length()?;

        match tag {
            tag::universal::INTEGER => {
                let raw = dec.read_integer_content(len)?;
                let value = i32::try_from(raw)
                    .map_err(|_| Error::decode(at, DecodeErrorKind::IntegerOverflow))?;
                Ok(Value::Integer(value))
            }
            tag::universal::BIT_STRING => Ok(Value::BitString(dec.read_bit_string_content(len)?)),
            tag::universal::OCTET_STRING => Ok(Value::OctetString(dec.read_bytes(len)?)),
            tag::universal::NULL => {
                if len != 0 {
                    return Err(Error::decode(at, DecodeErrorKind::InvalidNull));
                }
                Ok(Value::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => {
                Ok(Value::ObjectIdentifier(dec.read_oid_content(len)?))
            }
            tag::application::IP_ADDRESS => {
                if len != 4 {
                    return Err(Error::decode(
                        at,
                        DecodeErrorKind::InvalidIpAddressLength { length: len },
                    ));
                }
                let data = dec.read_bytes(4)?;
                Ok(Value::IpAddress([data[0], data[1], data[2], data[3]]))
            }
            tag::application::COUNTER32 => Ok(Value::Counter32(dec.read_unsigned32_content(len)?)),
            tag::application::GAUGE32 => Ok(Value::Gauge32(dec.read_unsigned32_content(len)?)),
            tag::application::TIMETICKS => Ok(Value::TimeTicks(dec.read_unsigned32_content(len)?)),
            tag::application::OPAQUE => Ok(Value::Opaque(dec.read_bytes(len)?)),
            tag::application::NSAP_ADDRESS => {
                if len != 6 {
                    return Err(Error::decode(
                        at,
                        DecodeErrorKind::InvalidNsapAddressLength { length: len },
                    ));
                }
                let data = dec.read_bytes(6)?;
                let mut addr = [0u8; 6];
                addr.copy_from_slice(&data);
                Ok(Value::NsapAddress(addr))
            }
            tag::application::COUNTER64 => Ok(Value::Counter64(dec.read_unsigned64_content(len)?)),
            tag::application::UINT32 => Ok(Value::Uint32(dec.read_unsigned32_content(len)?)),
            tag::context::NO_SUCH_OBJECT => {
                let _ = dec.read_bytes(len)?;
                Ok(Value::NoSuchObject)
            }
            tag::context::NO_SUCH_INSTANCE => {
                let _ = dec.read_bytes(len)?;
                Ok(Value::NoSuchInstance)
            }
            tag::context::END_OF_MIB_VIEW => {
                let _ = dec.read_bytes(len)?;
                Ok(Value::EndOfMibView)
            }
            other => Err(Error::decode(at, DecodeErrorKind::UnknownValueTag(other))),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::BitString(bits) => {
                write!(f, "BitString({} bits)", bits.bit_len())
            }
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "0x{}", hex(data)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) | Value::Gauge32(v) | Value::Uint32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                write!(
                    f,
                    "{}d {}h {}m {}s",
                    secs / 86400,
                    (secs % 86400) / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                )
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", hex(data)),
            Value::NsapAddress(a) => write!(f, "Nsap(0x{})", hex(a)),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Self {
        Value::OctetString(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::OctetString(data)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}

impl From<std::net::Ipv4Addr> for Value {
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Counter64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn roundtrip(value: Value) -> Value {
        let mut enc = Encoder::new();
        value.encode(&mut enc);
        let mut dec = Decoder::new(enc.finish());
        Value::decode(&mut dec).unwrap()
    }

    #[test]
    fn roundtrip_all_variants() {
        let values = [
            Value::Integer(0),
            Value::Integer(42),
            Value::Integer(-42),
            Value::Integer(i32::MIN),
            Value::Integer(i32::MAX),
            Value::BitString(BitString::new(Bytes::from_static(&[0xB0, 0x40]), 10).unwrap()),
            Value::OctetString(Bytes::from_static(b"hello world")),
            Value::OctetString(Bytes::new()),
            Value::Null,
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)),
            Value::IpAddress([192, 168, 1, 1]),
            Value::IpAddress([0, 0, 0, 0]),
            Value::Counter32(0),
            Value::Counter32(u32::MAX),
            Value::Gauge32(1_000_000_000),
            Value::TimeTicks(123_456),
            Value::Opaque(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])),
            Value::NsapAddress([1, 2, 3, 4, 5, 6]),
            Value::Counter64(0),
            Value::Counter64(u64::MAX),
            Value::Uint32(0x8000_0000),
            Value::NoSuchObject,
            Value::NoSuchInstance,
            Value::EndOfMibView,
        ];
        for value in values {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut dec = Decoder::from_slice(&[0x48, 0x01, 0x00]);
        let err = Value::decode(&mut dec).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::UnknownValueTag(0x48),
                ..
            }
        ));
    }

    #[test]
    fn ip_address_wrong_length_rejected() {
        let mut dec = Decoder::from_slice(&[0x40, 0x03, 1, 2, 3]);
        assert!(Value::decode(&mut dec).is_err());
    }

    #[test]
    fn exception_with_content_tolerated() {
        let mut dec = Decoder::from_slice(&[0x80, 0x01, 0xFF]);
        assert_eq!(Value::decode(&mut dec).unwrap(), Value::NoSuchObject);
    }

    #[test]
    fn bit_string_length_mismatch() {
        assert!(BitString::new(Bytes::from_static(&[0xFF]), 10).is_none());
        assert!(BitString::new(Bytes::from_static(&[0xFF, 0x00]), 10).is_some());
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Integer(5).as_i32(), Some(5));
        assert_eq!(Value::Counter32(7).as_u32(), Some(7));
        assert_eq!(Value::Uint32(9).as_u32(), Some(9));
        assert_eq!(Value::Integer(-1).as_u32(), None);
        assert_eq!(Value::Counter64(10).as_u64(), Some(10));
        assert_eq!(Value::Gauge32(3).as_u64(), Some(3));
        assert_eq!(
            Value::OctetString(Bytes::from_static(b"x")).as_str(),
            Some("x")
        );
        assert_eq!(
            Value::IpAddress([10, 0, 0, 1]).as_ip(),
            Some(std::net::Ipv4Addr::new(10, 0, 0, 1))
        );
        assert!(Value::EndOfMibView.is_exception());
        assert!(!Value::Null.is_exception());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::IpAddress([10, 1, 2, 3]).to_string(), "10.1.2.3");
        assert_eq!(Value::TimeTicks(123_456).to_string(), "0d 0h 20m 34s");
        assert_eq!(Value::NoSuchObject.to_string(), "noSuchObject");
        assert_eq!(
            Value::OctetString(Bytes::from_static(&[0xFF, 0xFE])).to_string(),
            "0xfffe"
        );
    }
}
