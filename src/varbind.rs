//! Variable binding (VarBind) type.
//!
//! A varbind pairs an OID with a typed value; a varbind list is the
//! payload of every PDU.

use crate::ber::{Decoder, Encoder};
use crate::error::Result;
use crate::oid::Oid;
use crate::value::Value;

/// Variable binding: an OID-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    /// The object identifier.
    pub oid: Oid,
    /// The value.
    pub value: Value,
}

impl VarBind {
    /// Create a new varbind.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Create a varbind with a NULL value (for GET requests).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }

    /// Create a noSuchObject exception varbind.
    pub fn no_such_object(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::NoSuchObject,
        }
    }

    /// Encode to BER: `SEQUENCE { name, value }`.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.sequence(|e| {
            e.write_oid(&self.oid);
            self.value.encode(e);
        });
    }

    /// Decode from BER.
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid()?;
        let value = Value::decode(&mut seq)?;
        Ok(VarBind { oid, value })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// Encode a varbind list: `SEQUENCE OF SEQUENCE { name, value }`.
pub fn encode_varbind_list(enc: &mut Encoder, varbinds: &[VarBind]) {
    enc.sequence(|e| {
        for vb in varbinds {
            vb.encode(e);
        }
    });
}

/// Decode a varbind list.
pub fn decode_varbind_list(dec: &mut Decoder) -> Result<Vec<VarBind>> {
    let mut seq = dec.read_sequence()?;
    let mut varbinds = Vec::with_capacity((seq.remaining() / 16).max(1));
    while !seq.is_empty() {
        varbinds.push(VarBind::decode(&mut seq)?);
    }
    Ok(varbinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use bytes::Bytes;

    #[test]
    fn varbind_roundtrip() {
        let vb = VarBind::new(oid!(1, 3, 6, 1), Value::Integer(42));

        let mut enc = Encoder::new();
        vb.encode(&mut enc);
        let mut dec = Decoder::new(enc.finish());

        assert_eq!(VarBind::decode(&mut dec).unwrap(), vb);
    }

    #[test]
    fn list_roundtrip() {
        let varbinds = vec![
            VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
                Value::OctetString(Bytes::from_static(b"Linux router")),
            ),
            VarBind::no_such_object(oid!(1, 3, 6, 1, 2, 1, 1, 99, 0)),
            VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(123_456)),
            VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)),
        ];

        let mut enc = Encoder::new();
        encode_varbind_list(&mut enc, &varbinds);
        let mut dec = Decoder::new(enc.finish());

        assert_eq!(decode_varbind_list(&mut dec).unwrap(), varbinds);
    }

    #[test]
    fn empty_list_roundtrip() {
        let mut enc = Encoder::new();
        encode_varbind_list(&mut enc, &[]);
        let mut dec = Decoder::new(enc.finish());
        assert!(decode_varbind_list(&mut dec).unwrap().is_empty());
    }

    #[test]
    fn list_preserves_order() {
        let varbinds: Vec<_> = (0u32..8)
            .map(|i| VarBind::new(oid!(1, 3, 6, 1, 4, 1, i), Value::Integer(i as i32)))
            .collect();

        let mut enc = Encoder::new();
        encode_varbind_list(&mut enc, &varbinds);
        let mut dec = Decoder::new(enc.finish());
        let decoded = decode_varbind_list(&mut dec).unwrap();

        for (i, vb) in decoded.iter().enumerate() {
            assert_eq!(vb.value.as_i32(), Some(i as i32));
        }
    }

    #[test]
    fn display() {
        let vb = VarBind::new(oid!(1, 3, 6, 1), Value::Integer(42));
        assert_eq!(vb.to_string(), "1.3.6.1 = 42");
    }
}
