//! SNMP Protocol Data Units.

use crate::ber::{tag, Decoder, Encoder};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::varbind::{decode_varbind_list, encode_varbind_list, VarBind};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    Response = 0xA2,
    SetRequest = 0xA3,
    TrapV1 = 0xA4,
    GetBulkRequest = 0xA5,
    TrapV2 = 0xA7,
}

impl PduType {
    /// Create from a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA4 => Some(Self::TrapV1),
            0xA5 => Some(Self::GetBulkRequest),
            0xA7 => Some(Self::TrapV2),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// True for the community request types an agent services.
    pub fn is_community_request(self) -> bool {
        matches!(
            self,
            Self::GetRequest | Self::GetNextRequest | Self::GetBulkRequest | Self::SetRequest
        )
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::TrapV1 => write!(f, "TrapV1"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
        }
    }
}

/// A request or response PDU.
///
/// For GetBulk requests, `error_status` carries non-repeaters and
/// `error_index` carries max-repetitions; that is the wire layout, exposed
/// through [`Pdu::non_repeaters`] and [`Pdu::max_repetitions`].
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    /// PDU type tag.
    pub pdu_type: PduType,
    /// Request id correlating requests with responses. Assigned by the
    /// request tracker for outbound client requests.
    pub request_id: u32,
    /// Error status (0 in requests).
    pub error_status: i32,
    /// 1-based index of the varbind an error refers to.
    pub error_index: i32,
    /// Variable bindings, in order.
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a GET request over the given OIDs.
    pub fn get_request(oids: impl IntoIterator<Item = Oid>) -> Self {
        Self::request(PduType::GetRequest, oids)
    }

    /// Create a GETNEXT request over the given OIDs.
    pub fn get_next_request(oids: impl IntoIterator<Item = Oid>) -> Self {
        Self::request(PduType::GetNextRequest, oids)
    }

    /// Create a SET request from varbinds.
    pub fn set_request(varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::SetRequest,
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Create a GETBULK request.
    pub fn get_bulk_request(
        non_repeaters: i32,
        max_repetitions: i32,
        oids: impl IntoIterator<Item = Oid>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id: 0,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds: oids.into_iter().map(VarBind::null).collect(),
        }
    }

    fn request(pdu_type: PduType, oids: impl IntoIterator<Item = Oid>) -> Self {
        Self {
            pdu_type,
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds: oids.into_iter().map(VarBind::null).collect(),
        }
    }

    /// Create an empty Response PDU answering `request`.
    pub fn response_to(request: &Pdu) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id: request.request_id,
            error_status: 0,
            error_index: 0,
            varbinds: Vec::new(),
        }
    }

    /// Non-repeaters of a GetBulk request.
    pub fn non_repeaters(&self) -> i32 {
        self.error_status
    }

    /// Max-repetitions of a GetBulk request.
    pub fn max_repetitions(&self) -> i32 {
        self.error_index
    }

    /// True if this PDU carries a non-zero error status.
    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }

    /// The error status as an enum.
    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// Encode to BER.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.constructed(self.pdu_type.tag(), |e| {
            e.write_unsigned(tag::universal::INTEGER, u64::from(self.request_id));
            e.write_integer(i64::from(self.error_status));
            e.write_integer(i64::from(self.error_index));
            encode_varbind_list(e, &self.varbinds);
        });
    }

    /// Decode from BER. The caller is expected to have routed TrapV1 tags
    /// to [`TrapV1Pdu::decode`]; they are rejected here.
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let at = dec.offset();
        let tag = dec.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .filter(|t| *t != PduType::TrapV1)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;

        let len = dec.read_length()?;
        let mut body = dec.sub_decoder(len)?;

        let request_id = read_request_id(&mut body)?;
        let error_status = body.read_i32()?;
        let error_index = body.read_i32()?;
        let varbinds = decode_varbind_list(&mut body)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// Read a request id: an INTEGER in the uint32 range, tolerating peers
/// that encode ids above `i32::MAX` as negative two's-complement values.
fn read_request_id(dec: &mut Decoder) -> Result<u32> {
    let at = dec.offset();
    let raw = dec.read_integer()?;
    if raw > i64::from(u32::MAX) || raw < i64::from(i32::MIN) {
        return Err(Error::decode(at, DecodeErrorKind::IntegerOverflow));
    }
    Ok(raw as u32)
}

/// SNMPv1 Trap PDU (RFC 1157 Section 4.1.6).
///
/// Structurally unlike the request/response PDUs. This engine only
/// receives traps (and counts them); it never emits them.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapV1Pdu {
    /// Enterprise OID of the entity generating the trap.
    pub enterprise: Oid,
    /// IP address of the generating agent.
    pub agent_addr: [u8; 4],
    /// Generic trap type (0..6).
    pub generic_trap: i32,
    /// Specific trap code.
    pub specific_trap: i32,
    /// sysUpTime at generation, in hundredths of seconds.
    pub time_stamp: u32,
    /// Variable bindings.
    pub varbinds: Vec<VarBind>,
}

impl TrapV1Pdu {
    /// Encode to BER.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.constructed(tag::pdu::TRAP_V1, |e| {
            e.write_oid(&self.enterprise);
            e.write_ip_address(self.agent_addr);
            e.write_integer(i64::from(self.generic_trap));
            e.write_integer(i64::from(self.specific_trap));
            e.write_unsigned32(tag::application::TIMETICKS, self.time_stamp);
            encode_varbind_list(e, &self.varbinds);
        });
    }

    /// Decode from BER.
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let mut body = dec.read_constructed(tag::pdu::TRAP_V1)?;

        let enterprise = body.read_oid()?;

        let len = body.expect_tag(tag::application::IP_ADDRESS)?;
        if len != 4 {
            return Err(Error::decode(
                body.offset(),
                DecodeErrorKind::InvalidIpAddressLength { length: len },
            ));
        }
        let addr = body.read_bytes(4)?;
        let agent_addr = [addr[0], addr[1], addr[2], addr[3]];

        let generic_trap = body.read_i32()?;
        let specific_trap = body.read_i32()?;

        let len = body.expect_tag(tag::application::TIMETICKS)?;
        let time_stamp = body.read_unsigned32_content(len)?;

        let varbinds = decode_varbind_list(&mut body)?;

        Ok(TrapV1Pdu {
            enterprise,
            agent_addr,
            generic_trap,
            specific_trap,
            time_stamp,
            varbinds,
        })
    }
}
