//! Firmware version codec.
//!
//! Versions are `major.minor.patch` triples with every component in
//! `0..=255`.  Ordering is lexicographic, major most significant, which is
//! the same order as the packed 24-bit form `major << 16 | minor << 8 | patch`.
//! Components that do not fit a byte are rejected at parse time rather than
//! truncated, so comparison can never wrap.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A parsed firmware version.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack into the 24-bit wire form used in logs and persisted state.
    pub const fn to_packed(self) -> u32 {
        (self.major as u32) << 16 | (self.minor as u32) << 8 | self.patch as u32
    }

    /// Inverse of [`to_packed`](Self::to_packed).  Returns `None` if any of
    /// the top 8 bits are set.
    pub const fn from_packed(packed: u32) -> Option<Self> {
        if packed > 0x00FF_FFFF {
            return None;
        }
        Some(Self::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse `"a.b.c"`.
///
/// Each component must be a non-empty run of ASCII digits with a value in
/// `0..=255`.  Signs, whitespace, a fourth component or a missing one all
/// yield [`ParseError::Malformed`].
pub fn parse(text: &str) -> Result<Version, ParseError> {
    let mut parts = text.split('.');
    let major = component(parts.next())?;
    let minor = component(parts.next())?;
    let patch = component(parts.next())?;
    if parts.next().is_some() {
        return Err(ParseError::Malformed);
    }
    Ok(Version::new(major, minor, patch))
}

fn component(part: Option<&str>) -> Result<u8, ParseError> {
    let part = part.ok_or(ParseError::Malformed)?;
    // `u8::from_str` alone would accept a leading '+'.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::Malformed);
    }
    part.parse::<u8>().map_err(|_| ParseError::Malformed)
}

/// Total order over versions.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_triple() {
        assert_eq!(parse("1.2.3"), Ok(Version::new(1, 2, 3)));
        assert_eq!(parse("0.0.0"), Ok(Version::new(0, 0, 0)));
        assert_eq!(parse("255.255.255"), Ok(Version::new(255, 255, 255)));
    }

    #[test]
    fn rejects_out_of_range_component() {
        assert_eq!(parse("256.0.0"), Err(ParseError::Malformed));
        assert_eq!(parse("1.300.0"), Err(ParseError::Malformed));
        assert_eq!(parse("1.2.99999999999999999999"), Err(ParseError::Malformed));
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert_eq!(parse("1.2"), Err(ParseError::Malformed));
        assert_eq!(parse("1.2.3.4"), Err(ParseError::Malformed));
        assert_eq!(parse(""), Err(ParseError::Malformed));
        assert_eq!(parse("1..3"), Err(ParseError::Malformed));
    }

    #[test]
    fn rejects_signs_and_whitespace() {
        assert_eq!(parse("+1.2.3"), Err(ParseError::Malformed));
        assert_eq!(parse("1.2.-3"), Err(ParseError::Malformed));
        assert_eq!(parse(" 1.2.3"), Err(ParseError::Malformed));
        assert_eq!(parse("v1.2.3"), Err(ParseError::Malformed));
    }

    #[test]
    fn compare_is_lexicographic_major_first() {
        let a = Version::new(1, 255, 255);
        let b = Version::new(2, 0, 0);
        assert_eq!(compare(&a, &b), Ordering::Less);
        assert_eq!(compare(&b, &a), Ordering::Greater);
        assert_eq!(compare(&a, &a), Ordering::Equal);
        assert_eq!(
            compare(&Version::new(1, 2, 4), &Version::new(1, 2, 3)),
            Ordering::Greater
        );
    }

    #[test]
    fn packed_form_orders_like_triple() {
        let a = Version::new(1, 2, 3);
        assert_eq!(a.to_packed(), 0x0001_0203);
        assert_eq!(Version::from_packed(0x0001_0203), Some(a));
        assert_eq!(Version::from_packed(0x0100_0000), None);
    }

    #[test]
    fn display_matches_parse_input() {
        assert_eq!(Version::new(10, 0, 7).to_string(), "10.0.7");
        assert_eq!("10.0.7".parse::<Version>(), Ok(Version::new(10, 0, 7)));
    }
}
