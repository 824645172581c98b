//! Extended ORPort auth cookie
//!
//! The cookie file written by tor is exactly 64 bytes: a fixed 32-byte
//! header (31 ASCII characters and a newline) followed by the 32-byte
//! secret. Anything longer, shorter, or with a different header is refused.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ConfigError;

/// Fixed header at the start of every cookie file
pub const COOKIE_HEADER: &[u8; 32] = b"! Extended ORPort Auth Cookie !\x0a";

/// Length of the secret
pub const COOKIE_LEN: usize = 32;

/// Total length of a cookie file
pub const COOKIE_FILE_LEN: usize = COOKIE_HEADER.len() + COOKIE_LEN;

/// Shared secret used to key SAFE_COOKIE hashes.
///
/// Cloning is cheap and shares the same zeroize-on-drop allocation, so one
/// loaded cookie can be handed to any number of concurrent handshakes.
#[derive(Clone)]
pub struct AuthCookie {
    secret: Arc<Zeroizing<[u8; COOKIE_LEN]>>,
}

impl AuthCookie {
    /// Wrap raw secret bytes
    pub fn from_bytes(secret: [u8; COOKIE_LEN]) -> Self {
        Self {
            secret: Arc::new(Zeroizing::new(secret)),
        }
    }

    /// Generate a fresh random cookie
    pub fn generate() -> Self {
        let mut secret = Zeroizing::new([0u8; COOKIE_LEN]);
        rand::thread_rng().fill_bytes(&mut secret[..]);
        Self {
            secret: Arc::new(secret),
        }
    }

    /// Load and validate a cookie file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let unreadable = |source| ConfigError::CookieUnreadable {
            path: path.display().to_string(),
            source,
        };

        let file = std::fs::File::open(path).map_err(unreadable)?;

        // One byte past the expected size is enough to detect trailing content
        let mut contents = Zeroizing::new(Vec::with_capacity(COOKIE_FILE_LEN + 1));
        file.take(COOKIE_FILE_LEN as u64 + 1)
            .read_to_end(&mut contents)
            .map_err(unreadable)?;

        Self::parse(&contents).map_err(|reason| ConfigError::InvalidCookie {
            path: path.display().to_string(),
            reason: reason.to_string(),
        })
    }

    /// Validate the contents of a cookie file
    pub fn parse(contents: &[u8]) -> Result<Self, &'static str> {
        if contents.len() < COOKIE_FILE_LEN {
            return Err("file is shorter than 64 bytes");
        }
        if contents.len() > COOKIE_FILE_LEN {
            return Err("file is longer than 64 bytes");
        }

        let (header, secret) = contents.split_at(COOKIE_HEADER.len());
        if header != COOKIE_HEADER {
            return Err("missing auth cookie header");
        }

        let mut cookie = [0u8; COOKIE_LEN];
        cookie.copy_from_slice(secret);
        Ok(Self::from_bytes(cookie))
    }

    /// Serialize into the 64-byte file format
    pub fn to_file_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut buf = Zeroizing::new(Vec::with_capacity(COOKIE_FILE_LEN));
        buf.extend_from_slice(COOKIE_HEADER);
        buf.extend_from_slice(self.as_bytes());
        buf
    }

    /// Write a cookie file readable only by its owner
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        std::fs::write(path, self.to_file_bytes().as_slice())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("Auth cookie written to {:?}", path);
        Ok(())
    }

    /// Raw secret, used as the HMAC key
    pub fn as_bytes(&self) -> &[u8; COOKIE_LEN] {
        &self.secret
    }
}

impl fmt::Debug for AuthCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthCookie(<redacted>)")
    }
}
