//! Error types for ptbridge

use std::fmt;

use thiserror::Error;

/// Main error type for ptbridge
#[derive(Error, Debug)]
pub enum PtError {
    /// Configuration errors (environment, cookie file)
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Peer did not follow the Extended ORPort protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer refused us (or we refused the peer) at the protocol level
    #[error("Authentication rejected: {0}")]
    Auth(#[from] AuthError),

    /// Deadline elapsed during handshake or setup
    #[error("Handshake timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Transport-level failures
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no {name} environment variable")]
    MissingVar { name: String },

    #[error("no supported managed transport version in {offered:?}")]
    UnsupportedVersion { offered: String },

    #[error("cannot resolve {var} {value:?}: {reason}")]
    InvalidAddress {
        var: String,
        value: String,
        reason: String,
    },

    #[error("TOR_PT_SERVER_BINDADDR: {spec:?}: {reason}")]
    InvalidBindAddr { spec: String, reason: String },

    #[error("error reading auth cookie file {path:?}: {reason}")]
    InvalidCookie { path: String, reason: String },

    #[error("error reading auth cookie file {path:?}: {source}")]
    CookieUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write auth cookie file {path:?}: {source}")]
    CookieWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extended ORPort {addr} configured without an auth cookie file")]
    MissingCookie { addr: String },
}

/// Protocol violations by a non-conforming peer
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("read {count} auth types without seeing \\x00")]
    AuthTypesTooLong { count: usize },

    #[error("command body of {len} bytes exceeds maximum length of 65535")]
    CommandTooLong { len: usize },

    #[error("unknown command 0x{id:04x}")]
    UnknownCommand { id: u16 },

    #[error("unexpected command {command} during {phase}")]
    UnexpectedCommand { command: String, phase: Phase },

    #[error("{count} bytes left after extended ORPort authentication")]
    TrailingData { count: usize },
}

/// Legitimate protocol-level refusals
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("server didn't offer auth type 1 (offered {offered:?})")]
    SafeCookieNotOffered { offered: Vec<u8> },

    #[error("client selected unsupported auth type {selected}")]
    UnsupportedSelection { selected: u8 },

    #[error("mismatch in server hash")]
    ServerHashMismatch,

    #[error("mismatch in client hash")]
    ClientHashMismatch,

    #[error("server rejected authentication (status {status})")]
    StatusRejected { status: u8 },

    #[error("server returned DENY after our USERADDR and DONE")]
    Denied,
}

/// Network-level errors, tagged with the phase they occurred in
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during {phase}: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },
}

/// Stage of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authentication,
    Setup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => f.write_str("authentication"),
            Self::Setup => f.write_str("session setup"),
        }
    }
}

impl Phase {
    /// Build a closure that wraps an I/O error with this phase
    pub(crate) fn io(self) -> impl FnOnce(std::io::Error) -> PtError {
        move |source| NetworkError::Io { phase: self, source }.into()
    }
}

/// Coarse classification of [`PtError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    ProtocolViolation,
    AuthRejected,
    Timeout,
    Io,
}

impl PtError {
    /// Classify this error so callers can choose a policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Protocol(_) => ErrorKind::ProtocolViolation,
            Self::Auth(_) => ErrorKind::AuthRejected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Io,
        }
    }

    /// Check if a fresh attempt could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Protocol(_) => false,
            Self::Auth(AuthError::SafeCookieNotOffered { .. }) => false,
            Self::Auth(_) => true,
            Self::Timeout { .. } => true,
            Self::Network(_) => true,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Auth(_) => 2,
            Self::Network(_) => 3,
            Self::Protocol(_) => 4,
            Self::Timeout { .. } => 5,
        }
    }

    /// Get a user-friendly error message with suggested action
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(ConfigError::MissingVar { name }) => {
                format!(
                    "{} is not set.\n  \
                    This program is meant to be launched by tor as a managed transport.",
                    name
                )
            }

            Self::Auth(AuthError::ServerHashMismatch) => {
                "Extended ORPort authentication failed.\n  \
                 The auth cookie file probably belongs to a different tor instance."
                    .to_string()
            }

            Self::Timeout { millis } => {
                format!(
                    "Extended ORPort did not answer within {}ms.\n  \
                    Check that tor is running and its ExtORPort is reachable.",
                    millis
                )
            }

            _ => format!("{}", self),
        }
    }
}

/// Result type alias for ptbridge operations
pub type Result<T> = std::result::Result<T, PtError>;
