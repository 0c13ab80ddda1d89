//! Cryptographic utilities
//!
//! Only hashing is needed here: caller identities are authenticated by the
//! hosting environment before they reach the engine.

pub mod hash;

pub use hash::{sha256, sha256_hex};
