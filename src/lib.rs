//! ptbridge - Pluggable transport plumbing for tor
//!
//! Helpers for a pluggable transport proxy launched by tor as a managed
//! transport.
//!
//! # Features
//!
//! - Managed transport environment parsing (client and server roles)
//! - Status line reporting on stdout
//! - Extended ORPort connector with SAFE_COOKIE authentication
//! - USERADDR / TRANSPORT session setup
//!
//! # Usage
//!
//! ```no_run
//! use ptbridge::{Connector, ServerInfo, StatusWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ptbridge::PtError> {
//!     let mut status = StatusWriter::stdout();
//!     let info = match ServerInfo::from_process_env(&["obfs4"]) {
//!         Ok(info) => info,
//!         Err(e) => {
//!             let _ = status.report_config_error(&e);
//!             return Err(e.into());
//!         }
//!     };
//!     let _ = status.version(&info.version);
//!
//!     let connector = Connector::new(info.target()?);
//!     let upstream = connector
//!         .connect("192.0.2.1:5000".parse().unwrap(), "obfs4")
//!         .await?;
//!     drop(upstream);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod status;

pub use config::{BindAddr, ClientInfo, ServerInfo};
pub use connector::{negotiate, Connector, Target};
pub use error::{ErrorKind, PtError};
pub use protocol::{AuthCookie, SessionInfo};
pub use status::StatusWriter;
