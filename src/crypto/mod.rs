//! Cryptographic primitives for Extended ORPort authentication
//!
//! - HMAC-SHA256 keyed hashes with domain separation (mac)
//! - Nonce generation and constant-time comparison (mac)

pub mod mac;
