//! Opaque caller and wallet identities

use crate::crypto::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque identity: an owner, a recipient, a relayer or a wallet.
///
/// The engine never interprets the string; authenticity of the caller is
/// established by the hosting environment before a call reaches the engine.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an identity string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a contract-style address (`0x` + 40 hex chars) from arbitrary seed data
    pub fn derive(seed: &str) -> Self {
        let hex = sha256_hex(seed.as_bytes());
        Self(format!("0x{}", &hex[..40]))
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_format() {
        let address = Address::derive("creator:mama:0");
        assert!(address.as_str().starts_with("0x"));
        assert_eq!(address.as_str().len(), 42);
    }

    #[test]
    fn test_derive_determinism() {
        assert_eq!(Address::derive("seed"), Address::derive("seed"));
        assert_ne!(Address::derive("seed"), Address::derive("other"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let address = Address::from("alice");
        assert_eq!(serde_json::to_string(&address).unwrap(), "\"alice\"");
        let back: Address = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(back, address);
    }
}
