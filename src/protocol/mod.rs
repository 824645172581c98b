//! Extended ORPort protocol implementation
//!
//! This module contains the core protocol components:
//! - Auth cookie file handling
//! - Command framing
//! - SAFE_COOKIE handshake (client side)
//! - Session setup (USERADDR / TRANSPORT / DONE)
//! - The relay side of both, for tests and tools

pub mod cookie;
pub mod handshake;
pub mod messages;
pub mod responder;
pub mod session;

pub use cookie::AuthCookie;
pub use handshake::{authenticate, ClientHandshake, HandshakeState};
pub use messages::{Command, CommandId};
pub use session::{setup, SessionInfo};
