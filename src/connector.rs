//! Upstream connection to the relay
//!
//! Connects either straight to the ORPort, or to the Extended ORPort where
//! the connection must first authenticate and announce itself:
//! - SAFE_COOKIE handshake
//! - USERADDR / TRANSPORT / DONE session setup
//!
//! Both steps share a single deadline. Once they finish the stream is
//! handed to the caller with no timeout attached.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{NetworkError, PtError, Result};
use crate::protocol::cookie::AuthCookie;
use crate::protocol::handshake;
use crate::protocol::session::{self, SessionInfo};

/// Default budget for authentication plus session setup
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where upstream connections go
#[derive(Debug, Clone)]
pub enum Target {
    /// Plain ORPort, no negotiation
    Direct(SocketAddr),
    /// Extended ORPort, authenticated with the cookie
    ExtOrPort { addr: SocketAddr, cookie: AuthCookie },
}

impl Target {
    /// Address that will actually be dialed
    pub fn addr(&self) -> SocketAddr {
        match self {
            Self::Direct(addr) => *addr,
            Self::ExtOrPort { addr, .. } => *addr,
        }
    }
}

/// Opens upstream connections on behalf of accepted client connections.
///
/// Cheap to clone; clones share the cookie.
#[derive(Debug, Clone)]
pub struct Connector {
    target: Target,
    handshake_timeout: Duration,
}

impl Connector {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the authentication + setup budget
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Connect upstream for a client that arrived from `user_addr` over
    /// `method`, using the configured timeout.
    pub async fn connect(&self, user_addr: SocketAddr, method: &str) -> Result<TcpStream> {
        self.connect_with_deadline(user_addr, method, Instant::now() + self.handshake_timeout)
            .await
    }

    /// Like [`Connector::connect`], with an explicit deadline for
    /// authentication and setup
    pub async fn connect_with_deadline(
        &self,
        user_addr: SocketAddr,
        method: &str,
        deadline: Instant,
    ) -> Result<TcpStream> {
        match &self.target {
            Target::Direct(addr) => {
                tracing::debug!("Connecting directly to ORPort {}", addr);
                dial(*addr).await
            }
            Target::ExtOrPort { addr, cookie } => {
                tracing::debug!("Connecting to extended ORPort {}", addr);
                let stream = dial(*addr).await?;
                let info = SessionInfo::new(user_addr, method);
                let stream = negotiate(stream, cookie, &info, deadline).await?;
                tracing::info!(
                    "Extended ORPort {} accepted {} connection from {}",
                    addr,
                    method,
                    user_addr
                );
                Ok(stream)
            }
        }
    }
}

/// Authenticate and run session setup on an already-open stream.
///
/// On failure the stream is dropped, which closes it. Cancelling the
/// returned future has the same effect.
pub async fn negotiate<S>(
    stream: S,
    cookie: &AuthCookie,
    info: &SessionInfo,
    deadline: Instant,
) -> Result<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let budget = deadline.saturating_duration_since(Instant::now());
    let exchange = async {
        let mut stream = handshake::authenticate(stream, cookie).await?;
        session::setup(&mut stream, info).await?;
        Ok::<S, PtError>(stream)
    };

    match tokio::time::timeout_at(deadline, exchange).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Extended ORPort negotiation timed out after {:?}", budget);
            Err(PtError::Timeout {
                millis: budget.as_millis() as u64,
            })
        }
    }
}

async fn dial(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| NetworkError::ConnectFailed {
            addr: addr.to_string(),
            source,
        })?;
    // Handshake messages are tiny and strictly request/response
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}
