//! Extended ORPort command framing
//!
//! Every command after authentication is framed as:
//!
//! ```text
//! command(2, big-endian) | body_len(2, big-endian) | body(body_len)
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Phase, ProtocolError, PtError};

/// Size of the command header
pub const HEADER_LEN: usize = 4;

/// Largest body a frame can carry
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// Extended ORPort command ids
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    Done = 0x0000,
    UserAddr = 0x0001,
    Transport = 0x0002,
    Okay = 0x1000,
    Deny = 0x1001,
}

impl TryFrom<u16> for CommandId {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::Done),
            0x0001 => Ok(Self::UserAddr),
            0x0002 => Ok(Self::Transport),
            0x1000 => Ok(Self::Okay),
            0x1001 => Ok(Self::Deny),
            _ => Err(ProtocolError::UnknownCommand { id: value }),
        }
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Done => "DONE",
            Self::UserAddr => "USERADDR",
            Self::Transport => "TRANSPORT",
            Self::Okay => "OKAY",
            Self::Deny => "DENY",
        };
        f.write_str(name)
    }
}

/// One decoded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub body: Vec<u8>,
}

impl Command {
    pub fn new(id: CommandId, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    /// Serialize to a complete frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.id, &self.body)
    }
}

/// Encode a frame. Nothing is produced if the body is too long.
pub fn encode(id: CommandId, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(body.len())
        .map_err(|_| ProtocolError::CommandTooLong { len: body.len() })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&(id as u16).to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Write one command with a single write. Nothing is written on error.
pub async fn write_command<W>(
    writer: &mut W,
    id: CommandId,
    body: &[u8],
    phase: Phase,
) -> Result<(), PtError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(id, body)?;
    writer.write_all(&frame).await.map_err(phase.io())?;
    tracing::trace!("Sent {} ({} byte body)", id, body.len());
    Ok(())
}

/// Read exactly one command.
///
/// Blocks until the header and the full body have arrived. A stream that
/// closes mid-frame is an error; partial frames are never returned.
pub async fn read_command<R>(reader: &mut R, phase: Phase) -> Result<Command, PtError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(phase.io())?;

    let raw_id = u16::from_be_bytes([header[0], header[1]]);
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(phase.io())?;

    let id = CommandId::try_from(raw_id)?;
    tracing::trace!("Received {} ({} byte body)", id, len);
    Ok(Command { id, body })
}
