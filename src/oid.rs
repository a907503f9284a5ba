//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` so common OIDs never touch the
//! heap. Ordering is lexicographic over the arc sequence, which is the
//! ordering the agent's dispatch tree relies on.

use crate::error::{DecodeErrorKind, Error, OidErrorKind, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a
/// value". Enforced during BER decoding.
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier: an ordered sequence of non-negative integers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from any iterator of arc values.
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted notation (e.g. `"1.3.6.1.2.1.1.1.0"`).
    ///
    /// At least two subidentifiers are required; SNMP has no use for
    /// single-arc names and rejecting them early catches a common typo.
    pub fn parse(s: &str) -> Result<Self> {
        let mut arcs = SmallVec::new();
        for part in s.split('.') {
            if part.is_empty() {
                continue;
            }
            let arc: u32 = part
                .parse()
                .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s))?;
            arcs.push(arc);
        }
        if arcs.len() < 2 {
            return Err(Error::invalid_oid_with_input(OidErrorKind::TooShort, s));
        }
        Ok(Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// True if the OID has no arcs.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Length of the common prefix shared with `other`.
    pub fn match_len(&self, other: &Oid) -> usize {
        self.arcs
            .iter()
            .zip(other.arcs.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// True if `self` begins with the same arcs as `prefix`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.match_len(prefix) == prefix.len()
    }

    /// Create a child OID by appending an arc.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }

    /// Validate the leading arcs per X.690 Section 8.19.4.
    ///
    /// The first arc must be 0, 1, or 2; the second arc must be <= 39
    /// unless the first arc is 2.
    pub fn validate(&self) -> Result<()> {
        if self.arcs.is_empty() {
            return Ok(());
        }
        let first = self.arcs[0];
        if first > 2 {
            return Err(Error::invalid_oid(OidErrorKind::InvalidFirstArc(first)));
        }
        if self.arcs.len() >= 2 {
            let second = self.arcs[1];
            if first < 2 && second >= 40 {
                return Err(Error::invalid_oid(OidErrorKind::InvalidSecondArc {
                    first,
                    second,
                }));
            }
        }
        Ok(())
    }

    /// BER-encode the OID content octets (no tag or length).
    ///
    /// The first two arcs `(a, b)` combine into a single subidentifier
    /// `a*40 + b`; every subidentifier is written base-128 with the
    /// continuation bit set on all but its final byte.
    pub fn to_ber(&self) -> SmallVec<[u8; 32]> {
        let mut out = SmallVec::new();
        if self.arcs.is_empty() {
            return out;
        }
        let first = if self.arcs.len() >= 2 {
            self.arcs[0] * 40 + self.arcs[1]
        } else {
            self.arcs[0] * 40
        };
        push_subidentifier(&mut out, first);
        for &arc in self.arcs.iter().skip(2) {
            push_subidentifier(&mut out, arc);
        }
        out
    }

    /// Decode an OID from BER content octets.
    ///
    /// Out-of-range first subidentifiers (>= 80) decode to `2.(value-80)`.
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::empty());
        }
        let mut arcs = SmallVec::new();

        let (first, consumed) = read_subidentifier(data, 0)?;
        if first < 40 {
            arcs.push(0);
            arcs.push(first);
        } else if first < 80 {
            arcs.push(1);
            arcs.push(first - 40);
        } else {
            arcs.push(2);
            arcs.push(first - 80);
        }

        let mut pos = consumed;
        while pos < data.len() {
            let (arc, used) = read_subidentifier(data, pos)?;
            arcs.push(arc);
            pos += used;
            if arcs.len() > MAX_OID_LEN {
                return Err(Error::decode(
                    pos,
                    DecodeErrorKind::OidTooLong {
                        count: arcs.len(),
                        max: MAX_OID_LEN,
                    },
                ));
            }
        }

        Ok(Self { arcs })
    }
}

/// Append one subidentifier in base-128 with continuation bits.
fn push_subidentifier(out: &mut SmallVec<[u8; 32]>, value: u32) {
    if value == 0 {
        out.push(0);
        return;
    }
    let mut groups = 0;
    let mut rest = value;
    while rest > 0 {
        groups += 1;
        rest >>= 7;
    }
    for i in (0..groups).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7F) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

/// Read one subidentifier starting at `pos`, returning (value, bytes used).
///
/// Fails on overflow past u32 and on a continuation bit set in the final
/// available byte (unterminated subidentifier).
fn read_subidentifier(data: &[u8], pos: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    let mut used = 0;
    loop {
        let Some(&byte) = data.get(pos + used) else {
            return Err(Error::decode(pos + used, DecodeErrorKind::TruncatedData));
        };
        used += 1;
        if value > (u32::MAX >> 7) {
            return Err(Error::decode(pos + used, DecodeErrorKind::IntegerOverflow));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, used));
        }
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", arc)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

/// Macro to create an OID from arc literals.
///
/// ```
/// use snmp_engine::oid;
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr.to_string(), "1.3.6.1.2.1.1.1.0");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}

/// Commonly used MIB-2 system-group instance OIDs.
pub mod mib2 {
    use super::Oid;

    /// sysDescr.0
    pub fn sys_descr() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)
    }

    /// sysObjectID.0
    pub fn sys_object_id() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 2, 0)
    }

    /// sysUpTime.0
    pub fn sys_uptime() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
    }

    /// sysContact.0
    pub fn sys_contact() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)
    }

    /// sysName.0
    pub fn sys_name() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)
    }

    /// sysLocation.0
    pub fn sys_location() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 6, 0)
    }
}
