//! Device address type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of octets in a device address.
pub const ADDRESS_LEN: usize = 6;

/// Errors from parsing a textual device address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("expected {ADDRESS_LEN} octets, got {0}")]
    WrongLength(usize),

    #[error("invalid octet {0:?}")]
    InvalidOctet(String),
}

/// A 48-bit radio device address.
///
/// Displays as lowercase colon-separated hex (`aa:bb:cc:dd:ee:ff`), so every
/// address renders to the same fixed-length string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BdAddr([u8; ADDRESS_LEN]);

impl BdAddr {
    #[must_use]
    pub const fn new(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    #[must_use]
    pub const fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for BdAddr {
    fn from(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for BdAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != ADDRESS_LEN {
            return Err(AddressError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; ADDRESS_LEN];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AddressError::InvalidOctet(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| AddressError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BdAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_and_fixed_length() {
        let addr = BdAddr::new([0xAA, 0x0B, 0xCC, 0x01, 0xEE, 0xFF]);
        let text = addr.to_string();
        assert_eq!(text, "aa:0b:cc:01:ee:ff");
        assert_eq!(text.len(), 17);
    }

    #[test]
    fn parse_accepts_uppercase() {
        let addr: BdAddr = "AA:BB:CC:DD:EE:01".parse().unwrap();
        assert_eq!(addr.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
    }

    #[test]
    fn parse_rejects_short_address() {
        let err = "aa:bb:cc".parse::<BdAddr>().unwrap_err();
        assert_eq!(err, AddressError::WrongLength(3));
    }

    #[test]
    fn parse_rejects_bad_octet() {
        let err = "aa:bb:cc:dd:ee:zz".parse::<BdAddr>().unwrap_err();
        assert_eq!(err, AddressError::InvalidOctet("zz".to_string()));

        let err = "aa:bb:cc:dd:ee:f".parse::<BdAddr>().unwrap_err();
        assert_eq!(err, AddressError::InvalidOctet("f".to_string()));
    }

    #[test]
    fn serde_uses_text_form() {
        let addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"01:02:03:04:05:06\"");
        let decoded: BdAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, addr);
    }
}
