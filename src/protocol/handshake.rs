//! SAFE_COOKIE authentication, client side
//!
//! ```text
//! server: auth_type* 0x00
//! client: 0x01                          (select SAFE_COOKIE)
//! client: client_nonce(32)
//! server: server_hash(32) server_nonce(32)
//! client: client_hash(32)
//! server: status(1)                     (1 = success)
//! ```
//!
//! The server hash is checked before anything derived from the cookie is
//! sent, so a peer that cannot prove possession of the cookie never sees
//! our hash.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::crypto::mac::{self, HASH_LEN, NONCE_LEN};
use crate::error::{AuthError, Phase, ProtocolError, PtError};
use crate::protocol::cookie::AuthCookie;

/// Auth type number for SAFE_COOKIE
pub const AUTH_TYPE_SAFE_COOKIE: u8 = 1;

/// Maximum number of auth types accepted before the terminator
pub const MAX_AUTH_TYPES: usize = 256;

/// Status byte signalling successful authentication
pub const STATUS_SUCCESS: u8 = 1;

/// Steps of the client handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitAuthTypes,
    SendSelection,
    SendClientNonce,
    AwaitServerResponse,
    VerifyServer,
    SendClientHash,
    AwaitStatus,
    Authenticated,
}

/// Client half of one SAFE_COOKIE exchange.
///
/// A value is good for exactly one attempt; its nonce is generated when
/// the selection is sent and never reused.
pub struct ClientHandshake<'a> {
    cookie: &'a AuthCookie,
    state: HandshakeState,
}

impl<'a> ClientHandshake<'a> {
    pub fn new(cookie: &'a AuthCookie) -> Self {
        Self {
            cookie,
            state: HandshakeState::AwaitAuthTypes,
        }
    }

    /// Step reached so far (the failing step, after an error)
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the exchange to completion over a buffered stream.
    ///
    /// Returns once the server has accepted us and nothing beyond the
    /// status byte is sitting in the read buffer.
    pub async fn run<S>(&mut self, stream: &mut BufReader<S>) -> Result<(), PtError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let offered = read_auth_types(stream).await?;
        if !offered.contains(&AUTH_TYPE_SAFE_COOKIE) {
            tracing::warn!("Server offered auth types {:?}, no SAFE_COOKIE", offered);
            return Err(AuthError::SafeCookieNotOffered { offered }.into());
        }

        self.state = HandshakeState::SendSelection;
        stream
            .write_all(&[AUTH_TYPE_SAFE_COOKIE])
            .await
            .map_err(Phase::Authentication.io())?;

        self.state = HandshakeState::SendClientNonce;
        let client_nonce = mac::generate_nonce();
        tracing::trace!("Client nonce: {}", hex::encode(client_nonce));
        stream
            .write_all(&client_nonce)
            .await
            .map_err(Phase::Authentication.io())?;
        stream.flush().await.map_err(Phase::Authentication.io())?;

        self.state = HandshakeState::AwaitServerResponse;
        let mut server_hash = [0u8; HASH_LEN];
        let mut server_nonce = [0u8; NONCE_LEN];
        stream
            .read_exact(&mut server_hash)
            .await
            .map_err(Phase::Authentication.io())?;
        stream
            .read_exact(&mut server_nonce)
            .await
            .map_err(Phase::Authentication.io())?;
        tracing::trace!("Server nonce: {}", hex::encode(server_nonce));

        self.state = HandshakeState::VerifyServer;
        let key = self.cookie.as_bytes();
        let expected = mac::server_hash(key, &client_nonce, &server_nonce);
        if !mac::constant_time_eq(&server_hash, &expected) {
            tracing::warn!("Extended ORPort server hash mismatch");
            return Err(AuthError::ServerHashMismatch.into());
        }

        self.state = HandshakeState::SendClientHash;
        let client_hash = mac::client_hash(key, &client_nonce, &server_nonce);
        stream
            .write_all(&client_hash)
            .await
            .map_err(Phase::Authentication.io())?;
        stream.flush().await.map_err(Phase::Authentication.io())?;

        self.state = HandshakeState::AwaitStatus;
        let status = stream
            .read_u8()
            .await
            .map_err(Phase::Authentication.io())?;
        if status != STATUS_SUCCESS {
            tracing::warn!("Extended ORPort rejected authentication (status {})", status);
            return Err(AuthError::StatusRejected { status }.into());
        }

        let leftover = stream.buffer().len();
        if leftover != 0 {
            return Err(ProtocolError::TrailingData { count: leftover }.into());
        }

        self.state = HandshakeState::Authenticated;
        tracing::debug!("Extended ORPort authentication complete");
        Ok(())
    }
}

/// Authenticate over `stream` and hand it back unbuffered.
///
/// The returned stream is positioned exactly after the status byte.
pub async fn authenticate<S>(stream: S, cookie: &AuthCookie) -> Result<S, PtError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    ClientHandshake::new(cookie).run(&mut reader).await?;
    Ok(reader.into_inner())
}

/// Read the zero-terminated list of auth types the server supports
async fn read_auth_types<R>(reader: &mut R) -> Result<Vec<u8>, PtError>
where
    R: AsyncRead + Unpin,
{
    let mut offered = Vec::new();
    while offered.len() < MAX_AUTH_TYPES {
        let auth_type = reader
            .read_u8()
            .await
            .map_err(Phase::Authentication.io())?;
        if auth_type == 0 {
            tracing::debug!("Server offered auth types {:?}", offered);
            return Ok(offered);
        }
        offered.push(auth_type);
    }
    Err(ProtocolError::AuthTypesTooLong {
        count: offered.len(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::io::{duplex, DuplexStream};

    /// Scripted server that follows the protocol with its own cookie
    async fn scripted_server(
        mut peer: DuplexStream,
        cookie: [u8; 32],
        status: u8,
    ) -> (DuplexStream, Option<[u8; 32]>) {
        peer.write_all(&[3, 1, 2, 0]).await.unwrap();

        let selection = peer.read_u8().await.unwrap();
        assert_eq!(selection, AUTH_TYPE_SAFE_COOKIE);

        let mut client_nonce = [0u8; 32];
        peer.read_exact(&mut client_nonce).await.unwrap();

        let server_nonce = [0x5Au8; 32];
        let hash = mac::server_hash(&cookie, &client_nonce, &server_nonce);
        peer.write_all(&hash).await.unwrap();
        peer.write_all(&server_nonce).await.unwrap();

        let mut client_hash = [0u8; 32];
        if peer.read_exact(&mut client_hash).await.is_err() {
            return (peer, None);
        }
        assert!(mac::constant_time_eq(
            &client_hash,
            &mac::client_hash(&cookie, &client_nonce, &server_nonce)
        ));
        peer.write_all(&[status]).await.unwrap();
        (peer, Some(client_hash))
    }

    #[tokio::test]
    async fn test_authenticated_with_matching_cookie() {
        let secret = [0x11u8; 32];
        let cookie = AuthCookie::from_bytes(secret);
        let (client, server) = duplex(4096);

        let server = tokio::spawn(scripted_server(server, secret, STATUS_SUCCESS));

        let mut reader = BufReader::new(client);
        let mut handshake = ClientHandshake::new(&cookie);
        handshake.run(&mut reader).await.unwrap();
        assert_eq!(handshake.state(), HandshakeState::Authenticated);

        let (_, client_hash) = server.await.unwrap();
        assert!(client_hash.is_some());
    }

    #[tokio::test]
    async fn test_rejected_with_different_cookie_and_no_client_hash() {
        let cookie = AuthCookie::from_bytes([0x11u8; 32]);
        let (client, server) = duplex(4096);

        let server = tokio::spawn(scripted_server(server, [0x22u8; 32], STATUS_SUCCESS));

        let mut reader = BufReader::new(client);
        let mut handshake = ClientHandshake::new(&cookie);
        let err = handshake.run(&mut reader).await.unwrap_err();
        assert!(matches!(err, PtError::Auth(AuthError::ServerHashMismatch)));
        assert_eq!(handshake.state(), HandshakeState::VerifyServer);

        // Closing our side must leave the server with nothing to read
        drop(reader);
        let (_, client_hash) = server.await.unwrap();
        assert!(client_hash.is_none());
    }

    #[tokio::test]
    async fn test_rejected_when_safe_cookie_not_offered() {
        let cookie = AuthCookie::from_bytes([0x11u8; 32]);
        let (client, mut server) = duplex(4096);

        server.write_all(&[2, 3, 0]).await.unwrap();

        let err = authenticate(client, &cookie).await.unwrap_err();
        assert!(matches!(
            err,
            PtError::Auth(AuthError::SafeCookieNotOffered { ref offered }) if offered == &[2, 3]
        ));

        // No selection byte, no nonce
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_too_many_auth_types() {
        let cookie = AuthCookie::from_bytes([0x11u8; 32]);
        let (client, mut server) = duplex(4096);

        server.write_all(&[1u8; 300]).await.unwrap();

        let err = authenticate(client, &cookie).await.unwrap_err();
        assert!(matches!(
            err,
            PtError::Protocol(ProtocolError::AuthTypesTooLong { count: 256 })
        ));
    }

    #[tokio::test]
    async fn test_255_auth_types_then_terminator_is_accepted() {
        let mut offered: Vec<u8> = (1..=255).collect();
        offered.push(0);
        let mut reader = offered.as_slice();
        let types = read_auth_types(&mut reader).await.unwrap();
        assert_eq!(types.len(), 255);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let secret = [0x33u8; 32];
        let cookie = AuthCookie::from_bytes(secret);
        let (client, server) = duplex(4096);

        let server = tokio::spawn(scripted_server(server, secret, 0));

        let err = authenticate(client, &cookie).await.unwrap_err();
        assert!(matches!(
            err,
            PtError::Auth(AuthError::StatusRejected { status: 0 })
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_trailing_bytes_after_status() {
        let secret = [0x44u8; 32];
        let cookie = AuthCookie::from_bytes(secret);
        let (client, mut peer) = duplex(4096);

        let server = tokio::spawn(async move {
            peer.write_all(&[1, 0]).await.unwrap();
            let mut selection_and_nonce = [0u8; 33];
            peer.read_exact(&mut selection_and_nonce).await.unwrap();
            let client_nonce: [u8; 32] = selection_and_nonce[1..].try_into().unwrap();

            let server_nonce = [9u8; 32];
            let mut reply = mac::server_hash(&secret, &client_nonce, &server_nonce).to_vec();
            reply.extend_from_slice(&server_nonce);
            peer.write_all(&reply).await.unwrap();

            let mut client_hash = [0u8; 32];
            peer.read_exact(&mut client_hash).await.unwrap();
            // Status plus an unsolicited command header in one write
            peer.write_all(&[1, 0x10, 0x00, 0x00, 0x00]).await.unwrap();
            peer
        });

        let err = authenticate(client, &cookie).await.unwrap_err();
        assert!(matches!(
            err,
            PtError::Protocol(ProtocolError::TrailingData { count: 4 })
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_closes_midway() {
        let cookie = AuthCookie::from_bytes([0x11u8; 32]);
        let (client, mut server) = duplex(4096);

        server.write_all(&[1, 0]).await.unwrap();
        drop(server);

        let err = authenticate(client, &cookie).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_fresh_nonce_per_attempt() {
        let cookie = AuthCookie::from_bytes([0x11u8; 32]);
        let mut nonces = Vec::new();

        for _ in 0..2 {
            let (client, mut server) = duplex(4096);
            server.write_all(&[1, 0]).await.unwrap();
            let attempt = tokio::spawn({
                let cookie = cookie.clone();
                async move { authenticate(client, &cookie).await.map(|_| ()) }
            });

            let mut sent = [0u8; 33];
            server.read_exact(&mut sent).await.unwrap();
            nonces.push(sent[1..].to_vec());
            drop(server);
            assert!(attempt.await.unwrap().is_err());
        }

        assert_ne!(nonces[0], nonces[1]);
    }
}
