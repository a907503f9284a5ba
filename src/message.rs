//! Whole-message codec for community-based SNMP.
//!
//! A message is `SEQUENCE { version INTEGER, community OCTET STRING, pdu }`.
//! The PDU variant is discriminated by its tag during decode and recorded
//! on the message, so routing is a match rather than a downcast.

use crate::ber::{tag, Decoder, Encoder};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::{Pdu, PduType, TrapV1Pdu};
use crate::version::Version;
use bytes::Bytes;
use std::net::SocketAddr;

/// The PDU carried by a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// A request or response PDU.
    Pdu(Pdu),
    /// An SNMPv1 trap.
    TrapV1(TrapV1Pdu),
}

/// An SNMP message plus the remote UDP address it came from or goes to.
#[derive(Debug, Clone)]
pub struct SnmpMessage {
    /// Protocol version.
    pub version: Version,
    /// Community string, passed through verbatim.
    pub community: Bytes,
    /// The PDU.
    pub body: MessageBody,
    /// Remote address: source for inbound messages, destination for
    /// outbound ones.
    pub peer: SocketAddr,
}

impl SnmpMessage {
    /// Create an outbound community message.
    pub fn community(
        version: Version,
        community: impl Into<Bytes>,
        pdu: Pdu,
        peer: SocketAddr,
    ) -> Self {
        Self {
            version,
            community: community.into(),
            body: MessageBody::Pdu(pdu),
            peer,
        }
    }

    /// The request/response PDU, if this is not a trap.
    pub fn pdu(&self) -> Option<&Pdu> {
        match &self.body {
            MessageBody::Pdu(pdu) => Some(pdu),
            MessageBody::TrapV1(_) => None,
        }
    }

    /// The PDU type tag recorded at decode time.
    pub fn pdu_type(&self) -> PduType {
        match &self.body {
            MessageBody::Pdu(pdu) => pdu.pdu_type,
            MessageBody::TrapV1(_) => PduType::TrapV1,
        }
    }

    /// True for request-variant messages (routed to the agent).
    pub fn is_community_request(&self) -> bool {
        self.pdu_type().is_community_request()
    }

    /// True for response-variant messages (routed to the request tracker).
    pub fn is_response(&self) -> bool {
        self.pdu_type() == PduType::Response
    }

    /// Encode to BER.
    pub fn encode(&self) -> Bytes {
        let mut enc = Encoder::new();
        enc.sequence(|e| {
            e.write_integer(self.version.as_i64());
            e.write_octet_string(&self.community);
            match &self.body {
                MessageBody::Pdu(pdu) => pdu.encode(e),
                MessageBody::TrapV1(trap) => trap.encode(e),
            }
        });
        enc.finish()
    }

    /// Decode from BER, attaching the datagram's remote address.
    pub fn decode(data: Bytes, peer: SocketAddr) -> Result<Self> {
        let mut dec = Decoder::new(data);
        let mut seq = dec.read_sequence()?;

        let at = seq.offset();
        let raw_version = seq.read_integer()?;
        let version = Version::from_i64(raw_version)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownVersion(raw_version)))?;

        let community = seq.read_octet_string()?;

        let body = match seq.peek_tag() {
            Some(tag::pdu::TRAP_V1) => MessageBody::TrapV1(TrapV1Pdu::decode(&mut seq)?),
            Some(_) => MessageBody::Pdu(Pdu::decode(&mut seq)?),
            None => return Err(Error::decode(seq.offset(), DecodeErrorKind::TruncatedData)),
        };

        Ok(SnmpMessage {
            version,
            community,
            body,
            peer,
        })
    }
}
