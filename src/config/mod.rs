//! Configuration handed down by tor
//!
//! This module turns the managed transport environment into validated
//! client and server settings.

mod env;

pub use env::{
    managed_transport_version, process_env, resolve_addr, resolve_bind_addr, BindAddr, ClientInfo,
    EnvMap, ServerInfo, AUTH_COOKIE_FILE, CLIENT_TRANSPORTS, EXTENDED_SERVER_PORT,
    MANAGED_TRANSPORT_VER, ORPORT, SERVER_BINDADDR, SERVER_TRANSPORTS, TRANSPORT_VERSION,
};
