//! Error types for snmp-engine.
//!
//! All errors are `#[non_exhaustive]` to allow adding new variants without
//! breaking changes.

use std::net::SocketAddr;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// Expected different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data truncated unexpectedly.
    TruncatedData,
    /// Invalid BER length encoding.
    InvalidLength,
    /// Indefinite length not supported.
    IndefiniteLength,
    /// Length field uses too many octets.
    LengthTooLong { octets: usize },
    /// Length exceeds the datagram sanity bound.
    LengthExceedsMax { length: usize, max: usize },
    /// Zero-length integer.
    ZeroLengthInteger,
    /// Integer content too long for its type.
    IntegerTooLong { length: usize },
    /// Integer or subidentifier value overflow.
    IntegerOverflow,
    /// NULL with non-zero length.
    InvalidNull,
    /// Invalid IP address length.
    InvalidIpAddressLength { length: usize },
    /// Invalid NSAP address length.
    InvalidNsapAddressLength { length: usize },
    /// BIT STRING with no padding octet or padding out of range.
    InvalidBitString,
    /// OID has too many arcs.
    OidTooLong { count: usize, max: usize },
    /// Unknown SNMP version.
    UnknownVersion(i64),
    /// Unknown PDU type tag.
    UnknownPduType(u8),
    /// Unknown varbind value tag.
    UnknownValueTag(u8),
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {} exceeds maximum {}", length, max)
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IntegerTooLong { length } => {
                write!(f, "integer content too long: {} bytes", length)
            }
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IP address must be 4 bytes, got {}", length)
            }
            Self::InvalidNsapAddressLength { length } => {
                write!(f, "NSAP address must be 6 bytes, got {}", length)
            }
            Self::InvalidBitString => write!(f, "invalid BIT STRING encoding"),
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version: {}", v),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::UnknownValueTag(t) => write!(f, "unknown varbind value tag: 0x{:02X}", t),
        }
    }
}

/// OID construction error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OidErrorKind {
    /// An arc could not be parsed as a non-negative integer.
    InvalidArc,
    /// Fewer than two subidentifiers.
    TooShort,
    /// First arc must be 0, 1, or 2.
    InvalidFirstArc(u32),
    /// Second arc must be <= 39 when the first arc is 0 or 1.
    InvalidSecondArc { first: u32, second: u32 },
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::TooShort => write!(f, "OID must have at least 2 arcs"),
            Self::InvalidFirstArc(v) => write!(f, "first arc must be 0, 1, or 2, got {}", v),
            Self::InvalidSecondArc { first, second } => {
                write!(f, "second arc {} too large for first arc {}", second, first)
            }
        }
    }
}

/// Direction of a failed UDP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Bind,
    Read,
    Write,
}

impl std::fmt::Display for IoOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind => write!(f, "bind"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// SNMP error status codes (RFC 3416).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    /// Unknown/future error status code.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from raw status code.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// Convert to raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Library error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// UDP I/O error.
    #[error("UDP {op} error: {source}")]
    Io {
        op: IoOp,
        #[source]
        source: std::io::Error,
    },

    /// Request timed out after all retries were exhausted.
    #[error("timed out waiting for {target} (request_id={request_id}, retries={retries})")]
    Timeout {
        target: SocketAddr,
        request_id: u32,
        retries: u32,
    },

    /// Malformed BER data.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// Invalid OID.
    #[error("invalid OID{}: {kind}", input.as_deref().map(|s| format!(" \"{}\"", s)).unwrap_or_default())]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<Box<str>>,
    },

    /// Illegal state transition or misuse of the context.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The requested stats bin is not available.
    #[error("stats bin {bin} is not available")]
    BinUnavailable { bin: u8 },

    /// The context is shutting down; the request cannot complete.
    #[error("context is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Create an invalid OID error from a kind (no input string).
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    /// Create an invalid OID error carrying the input string that failed.
    pub fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<Box<str>>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    /// True for errors produced by the BER decoder.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_roundtrip() {
        for code in 0..=18 {
            assert_eq!(ErrorStatus::from_i32(code).as_i32(), code);
        }
        assert_eq!(ErrorStatus::from_i32(42), ErrorStatus::Unknown(42));
        assert_eq!(ErrorStatus::Unknown(42).as_i32(), 42);
    }

    #[test]
    fn decode_error_display() {
        let err = Error::decode(
            5,
            DecodeErrorKind::UnexpectedTag {
                expected: 0x30,
                actual: 0xFF,
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("offset 5"));
        assert!(msg.contains("0x30"));
        assert!(msg.contains("0xFF"));
    }

    #[test]
    fn invalid_oid_display_carries_input() {
        let err = Error::invalid_oid_with_input(OidErrorKind::InvalidArc, "1.3.x");
        assert!(err.to_string().contains("1.3.x"));

        let err = Error::invalid_oid(OidErrorKind::TooShort);
        assert!(err.to_string().contains("at least 2 arcs"));
    }
}
