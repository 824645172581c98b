//! Extended ORPort session setup
//!
//! After authentication the client tells the relay where the connection
//! really came from and which transport carried it, then waits for the
//! relay's verdict:
//!
//! ```text
//! client: USERADDR  "ip:port"
//! client: TRANSPORT "method"
//! client: DONE
//! server: OKAY | DENY
//! ```

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{AuthError, Phase, ProtocolError, PtError};
use crate::protocol::messages::{read_command, write_command, CommandId};

/// Metadata forwarded to the relay for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Remote address of the original inbound connection
    pub user_addr: SocketAddr,
    /// Transport method that carried it
    pub method: String,
}

impl SessionInfo {
    pub fn new(user_addr: SocketAddr, method: impl Into<String>) -> Self {
        Self {
            user_addr,
            method: method.into(),
        }
    }
}

/// Send USERADDR, TRANSPORT and DONE, then wait for OKAY.
///
/// DENY is an [`AuthError::Denied`]; any other reply is a protocol error.
pub async fn setup<S>(stream: &mut S, info: &SessionInfo) -> Result<(), PtError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let user_addr = info.user_addr.to_string();
    write_command(stream, CommandId::UserAddr, user_addr.as_bytes(), Phase::Setup).await?;
    write_command(stream, CommandId::Transport, info.method.as_bytes(), Phase::Setup).await?;
    write_command(stream, CommandId::Done, &[], Phase::Setup).await?;
    stream.flush().await.map_err(Phase::Setup.io())?;

    let reply = read_command(stream, Phase::Setup).await?;
    match reply.id {
        CommandId::Okay => {
            tracing::debug!(
                "Relay accepted {} connection from {}",
                info.method,
                info.user_addr
            );
            Ok(())
        }
        CommandId::Deny => {
            tracing::warn!(
                "Relay denied {} connection from {}",
                info.method,
                info.user_addr
            );
            Err(AuthError::Denied.into())
        }
        other => Err(ProtocolError::UnexpectedCommand {
            command: other.to_string(),
            phase: Phase::Setup,
        }
        .into()),
    }
}
