//! Relay side of the Extended ORPort
//!
//! Mirrors [`crate::protocol::handshake`] and [`crate::protocol::session`]
//! for the accepting end. Useful as a stand-in relay for tests and tools.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::mac::{self, HASH_LEN, NONCE_LEN};
use crate::error::{AuthError, Phase, ProtocolError, PtError};
use crate::protocol::cookie::AuthCookie;
use crate::protocol::handshake::{AUTH_TYPE_SAFE_COOKIE, STATUS_SUCCESS};
use crate::protocol::messages::{read_command, write_command, CommandId};

/// Status byte sent when the client hash does not verify
pub const STATUS_FAILURE: u8 = 0;

/// What the client announced before DONE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncedSession {
    pub user_addr: Option<String>,
    pub transport: Option<String>,
}

/// Run the server half of SAFE_COOKIE.
///
/// Always answers with a status byte once the client hash has been read,
/// so the client learns the outcome either way.
pub async fn authenticate<S>(stream: &mut S, cookie: &AuthCookie) -> Result<(), PtError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[AUTH_TYPE_SAFE_COOKIE, 0])
        .await
        .map_err(Phase::Authentication.io())?;
    stream.flush().await.map_err(Phase::Authentication.io())?;

    let selected = stream
        .read_u8()
        .await
        .map_err(Phase::Authentication.io())?;
    if selected != AUTH_TYPE_SAFE_COOKIE {
        return Err(AuthError::UnsupportedSelection { selected }.into());
    }

    let mut client_nonce = [0u8; NONCE_LEN];
    stream
        .read_exact(&mut client_nonce)
        .await
        .map_err(Phase::Authentication.io())?;

    let server_nonce = mac::generate_nonce();
    let key = cookie.as_bytes();
    let mut reply = Vec::with_capacity(HASH_LEN + NONCE_LEN);
    reply.extend_from_slice(&mac::server_hash(key, &client_nonce, &server_nonce));
    reply.extend_from_slice(&server_nonce);
    stream
        .write_all(&reply)
        .await
        .map_err(Phase::Authentication.io())?;
    stream.flush().await.map_err(Phase::Authentication.io())?;

    let mut client_hash = [0u8; HASH_LEN];
    stream
        .read_exact(&mut client_hash)
        .await
        .map_err(Phase::Authentication.io())?;

    let expected = mac::client_hash(key, &client_nonce, &server_nonce);
    let ok = mac::constant_time_eq(&client_hash, &expected);
    let status = if ok { STATUS_SUCCESS } else { STATUS_FAILURE };
    stream
        .write_all(&[status])
        .await
        .map_err(Phase::Authentication.io())?;
    stream.flush().await.map_err(Phase::Authentication.io())?;

    if !ok {
        tracing::warn!("Client hash mismatch on extended ORPort");
        return Err(AuthError::ClientHashMismatch.into());
    }
    Ok(())
}

/// Read commands up to and including DONE.
///
/// Repeated USERADDR or TRANSPORT commands overwrite earlier ones.
pub async fn read_session_info<S>(stream: &mut S) -> Result<AnnouncedSession, PtError>
where
    S: AsyncRead + Unpin,
{
    let mut session = AnnouncedSession::default();
    loop {
        let cmd = read_command(stream, Phase::Setup).await?;
        match cmd.id {
            CommandId::Done => return Ok(session),
            CommandId::UserAddr => {
                session.user_addr = Some(String::from_utf8_lossy(&cmd.body).into_owned());
            }
            CommandId::Transport => {
                session.transport = Some(String::from_utf8_lossy(&cmd.body).into_owned());
            }
            other @ (CommandId::Okay | CommandId::Deny) => {
                return Err(ProtocolError::UnexpectedCommand {
                    command: other.to_string(),
                    phase: Phase::Setup,
                }
                .into());
            }
        }
    }
}

/// Send the verdict: OKAY if `accept`, DENY otherwise
pub async fn reply<S>(stream: &mut S, accept: bool) -> Result<(), PtError>
where
    S: AsyncWrite + Unpin,
{
    let id = if accept { CommandId::Okay } else { CommandId::Deny };
    write_command(stream, id, &[], Phase::Setup).await?;
    stream.flush().await.map_err(Phase::Setup.io())
}
