//! BER (Basic Encoding Rules) codec for SNMP.
//!
//! The subset of X.690 that SNMP v1/v2c needs: definite lengths only,
//! primitive value types plus constructed SEQUENCEs and PDUs. The encoder
//! writes forward and patches constructed-element lengths on close; the
//! decoder is a cursor over a `Bytes` slice.

mod decode;
mod encode;
mod length;
pub mod tag;

pub use decode::Decoder;
pub use encode::Encoder;
pub use length::{decode_length, write_length, MAX_LENGTH};
