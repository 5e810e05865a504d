use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a hex identifier literal.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed hex literal '{0}'")]
pub struct ParseHexError(String);

/// Four-byte identifier naming one routable operation.
///
/// Derived from the leading bytes of the BLAKE3 hash of the operation's
/// declared signature, e.g. `Selector::from_signature("increment()")`.
/// Two operations route independently exactly when their selectors differ.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector([u8; 4]);

impl Selector {
    pub const WIDTH: usize = 4;

    /// Derive the selector for a declared call signature.
    pub fn from_signature(signature: &str) -> Self {
        let digest = blake3::hash(signature.as_bytes());
        let mut bytes = [0u8; Self::WIDTH];
        bytes.copy_from_slice(&digest.as_bytes()[..Self::WIDTH]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({self})")
    }
}

impl FromStr for Selector {
    type Err = ParseHexError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; Self::WIDTH];
        decode_hex(text, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// 32-byte principal identifier used for callers, administrators, and
/// installed modules alike. `Address::ZERO` is the reserved sentinel that
/// marks "unregistered / no owner".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const WIDTH: usize = 32;

    /// The sentinel address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Deterministic address for a label, via BLAKE3.
    pub fn derive(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ParseHexError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; Self::WIDTH];
        decode_hex(text, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "0x")?;
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

fn decode_hex(text: &str, out: &mut [u8]) -> Result<(), ParseHexError> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    if !stripped.is_ascii() || stripped.len() != out.len() * 2 {
        return Err(ParseHexError(text.to_string()));
    }
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&stripped[i * 2..i * 2 + 2], 16)
            .map_err(|_| ParseHexError(text.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_derivation_is_deterministic() {
        let a = Selector::from_signature("transfer(address,u64)");
        let b = Selector::from_signature("transfer(address,u64)");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_signatures_yield_distinct_selectors() {
        let a = Selector::from_signature("increment()");
        let b = Selector::from_signature("decrement()");
        assert_ne!(a, b);
    }

    #[test]
    fn selector_display_roundtrip() {
        let selector = Selector::from_bytes([0xc0, 0x01, 0xbe, 0xef]);
        assert_eq!(selector.to_string(), "0xc001beef");
        assert_eq!("0xc001beef".parse::<Selector>().unwrap(), selector);
    }

    #[test]
    fn malformed_literals_rejected() {
        assert!("0xc001".parse::<Selector>().is_err());
        assert!("0xzzzzzzzz".parse::<Selector>().is_err());
        assert!("not hex".parse::<Address>().is_err());
    }

    #[test]
    fn zero_address_is_sentinel() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::derive("module-a").is_zero());
    }

    #[test]
    fn derived_addresses_are_stable() {
        assert_eq!(Address::derive("module-a"), Address::derive("module-a"));
        assert_ne!(Address::derive("module-a"), Address::derive("module-b"));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let selector = Selector::from_bytes([1, 2, 3, 4]);
        let json = serde_json::to_string(&selector).unwrap();
        assert_eq!(json, "\"0x01020304\"");
        let restored: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, selector);
    }
}
