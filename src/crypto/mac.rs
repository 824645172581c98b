//! HMAC-SHA256 primitives for SAFE_COOKIE authentication
//!
//! Both directions of the handshake hash the same material under the
//! shared cookie, separated only by a fixed domain string:
//!
//! ```text
//! HMAC-SHA256(cookie, domain || client_nonce || server_nonce)
//! ```

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 output
pub const HASH_LEN: usize = 32;

/// Length of a handshake nonce
pub const NONCE_LEN: usize = 32;

/// Domain string for the hash the server proves possession with
pub const SERVER_TO_CLIENT: &[u8] = b"ExtORPort authentication server-to-client hash";

/// Domain string for the hash the client proves possession with
pub const CLIENT_TO_SERVER: &[u8] = b"ExtORPort authentication client-to-server hash";

/// HMAC-SHA256(key, domain || client_nonce || server_nonce)
pub fn keyed_hash(
    key: &[u8],
    domain: &[u8],
    client_nonce: &[u8; NONCE_LEN],
    server_nonce: &[u8; NONCE_LEN],
) -> [u8; HASH_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(domain);
    mac.update(client_nonce);
    mac.update(server_nonce);
    mac.finalize().into_bytes().into()
}

/// Server-to-client hash
pub fn server_hash(
    key: &[u8],
    client_nonce: &[u8; NONCE_LEN],
    server_nonce: &[u8; NONCE_LEN],
) -> [u8; HASH_LEN] {
    keyed_hash(key, SERVER_TO_CLIENT, client_nonce, server_nonce)
}

/// Client-to-server hash
pub fn client_hash(
    key: &[u8],
    client_nonce: &[u8; NONCE_LEN],
    server_nonce: &[u8; NONCE_LEN],
) -> [u8; HASH_LEN] {
    keyed_hash(key, CLIENT_TO_SERVER, client_nonce, server_nonce)
}

/// Fresh nonce from the OS-seeded CSPRNG
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Constant-time equality for hashes.
///
/// Time taken does not depend on how many leading bytes match.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
