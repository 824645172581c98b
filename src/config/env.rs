//! Managed transport environment
//!
//! tor hands a managed transport its configuration through `TOR_PT_*`
//! environment variables. Everything here works on a plain name → value
//! map so it can be exercised without touching the process environment.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::connector::Target;
use crate::error::ConfigError;
use crate::protocol::cookie::AuthCookie;

/// The only managed transport protocol version we speak
pub const TRANSPORT_VERSION: &str = "1";

pub const MANAGED_TRANSPORT_VER: &str = "TOR_PT_MANAGED_TRANSPORT_VER";
pub const CLIENT_TRANSPORTS: &str = "TOR_PT_CLIENT_TRANSPORTS";
pub const SERVER_BINDADDR: &str = "TOR_PT_SERVER_BINDADDR";
pub const SERVER_TRANSPORTS: &str = "TOR_PT_SERVER_TRANSPORTS";
pub const ORPORT: &str = "TOR_PT_ORPORT";
pub const EXTENDED_SERVER_PORT: &str = "TOR_PT_EXTENDED_SERVER_PORT";
pub const AUTH_COOKIE_FILE: &str = "TOR_PT_AUTH_COOKIE_FILE";

/// Environment snapshot
pub type EnvMap = HashMap<String, String>;

/// Collect the process environment into an [`EnvMap`]
pub fn process_env() -> EnvMap {
    std::env::vars().collect()
}

/// Client-side configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Negotiated managed transport version
    pub version: String,
    /// Methods tor asked for that we support, in tor's order
    pub method_names: Vec<String>,
}

/// A method name with the address to listen on for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddr {
    pub method_name: String,
    pub addr: SocketAddr,
}

/// Server-side configuration
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Negotiated managed transport version
    pub version: String,
    /// Listeners to open, filtered to methods tor enabled and we support
    pub bind_addrs: Vec<BindAddr>,
    /// Plain ORPort
    pub or_addr: SocketAddr,
    /// Extended ORPort, if tor has one
    pub extended_or_addr: Option<SocketAddr>,
    /// Cookie for the extended ORPort, if tor wrote one
    pub auth_cookie: Option<AuthCookie>,
}

impl ClientInfo {
    /// Validate the client environment against the methods we implement
    pub fn from_env_map<S: AsRef<str>>(env: &EnvMap, supported: &[S]) -> Result<Self, ConfigError> {
        let version = managed_transport_version(env)?;

        let requested = required(env, CLIENT_TRANSPORTS)?;
        let method_names = if requested == "*" {
            supported.iter().map(|m| m.as_ref().to_string()).collect()
        } else {
            requested
                .split(',')
                .filter(|name| supported.iter().any(|m| m.as_ref() == *name))
                .map(str::to_string)
                .collect()
        };

        Ok(Self {
            version,
            method_names,
        })
    }

    /// Same as [`ClientInfo::from_env_map`] over the process environment
    pub fn from_process_env<S: AsRef<str>>(supported: &[S]) -> Result<Self, ConfigError> {
        Self::from_env_map(&process_env(), supported)
    }
}

impl ServerInfo {
    /// Validate the server environment against the methods we implement.
    ///
    /// Reads the auth cookie file, if one is named.
    pub fn from_env_map<S: AsRef<str>>(env: &EnvMap, supported: &[S]) -> Result<Self, ConfigError> {
        let version = managed_transport_version(env)?;

        let or_port = required(env, ORPORT)?;
        let or_addr = resolve_addr(or_port).map_err(|reason| ConfigError::InvalidAddress {
            var: ORPORT.to_string(),
            value: or_port.to_string(),
            reason,
        })?;

        let bind_addrs = server_bind_addrs(env, supported)?;

        let extended_or_addr = match optional(env, EXTENDED_SERVER_PORT) {
            Some(value) => Some(resolve_addr(value).map_err(|reason| {
                ConfigError::InvalidAddress {
                    var: EXTENDED_SERVER_PORT.to_string(),
                    value: value.to_string(),
                    reason,
                }
            })?),
            None => None,
        };

        let auth_cookie = match optional(env, AUTH_COOKIE_FILE) {
            Some(path) => Some(AuthCookie::load(PathBuf::from(path))?),
            None => None,
        };

        Ok(Self {
            version,
            bind_addrs,
            or_addr,
            extended_or_addr,
            auth_cookie,
        })
    }

    /// Same as [`ServerInfo::from_env_map`] over the process environment
    pub fn from_process_env<S: AsRef<str>>(supported: &[S]) -> Result<Self, ConfigError> {
        Self::from_env_map(&process_env(), supported)
    }

    /// Where upstream connections should go.
    ///
    /// The extended ORPort wins when configured, and then needs a cookie.
    pub fn target(&self) -> Result<Target, ConfigError> {
        match (self.extended_or_addr, &self.auth_cookie) {
            (None, _) => Ok(Target::Direct(self.or_addr)),
            (Some(addr), Some(cookie)) => Ok(Target::ExtOrPort {
                addr,
                cookie: cookie.clone(),
            }),
            (Some(addr), None) => Err(ConfigError::MissingCookie {
                addr: addr.to_string(),
            }),
        }
    }
}

fn required<'a>(env: &'a EnvMap, name: &str) -> Result<&'a str, ConfigError> {
    optional(env, name).ok_or_else(|| ConfigError::MissingVar {
        name: name.to_string(),
    })
}

/// Unset and empty are the same thing
fn optional<'a>(env: &'a EnvMap, name: &str) -> Option<&'a str> {
    env.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Pick the managed transport version from the ones tor offers.
///
/// This is the first check either role makes; tor expects `VERSION` before
/// any later `ENV-ERROR`.
pub fn managed_transport_version(env: &EnvMap) -> Result<String, ConfigError> {
    let offered = required(env, MANAGED_TRANSPORT_VER)?;
    if offered.split(',').any(|v| v == TRANSPORT_VERSION) {
        Ok(TRANSPORT_VERSION.to_string())
    } else {
        Err(ConfigError::UnsupportedVersion {
            offered: offered.to_string(),
        })
    }
}

fn server_bind_addrs<S: AsRef<str>>(
    env: &EnvMap,
    supported: &[S],
) -> Result<Vec<BindAddr>, ConfigError> {
    let mut bind_addrs = Vec::new();
    for spec in required(env, SERVER_BINDADDR)?.split(',') {
        let Some((method_name, addr)) = spec.split_once('-') else {
            return Err(ConfigError::InvalidBindAddr {
                spec: spec.to_string(),
                reason: "doesn't contain \"-\"".to_string(),
            });
        };
        let addr = resolve_bind_addr(addr).map_err(|reason| ConfigError::InvalidBindAddr {
            spec: spec.to_string(),
            reason,
        })?;
        bind_addrs.push(BindAddr {
            method_name: method_name.to_string(),
            addr,
        });
    }

    let enabled = required(env, SERVER_TRANSPORTS)?;
    if enabled != "*" {
        let enabled: Vec<&str> = enabled.split(',').collect();
        bind_addrs.retain(|b| enabled.contains(&b.method_name.as_str()));
    }

    bind_addrs.retain(|b| supported.iter().any(|m| m.as_ref() == b.method_name));
    Ok(bind_addrs)
}

/// Resolve `host:port` to the first address it names
pub fn resolve_addr(value: &str) -> Result<SocketAddr, String> {
    value
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| "no addresses found".to_string())
}

/// Resolve a bind address, tolerating unbracketed IPv6.
///
/// Older tor versions wrote IPv6 bind addresses without brackets. If plain
/// resolution fails and there is more than one colon, the text after the
/// last colon is taken as the port and the rest is bracketed.
pub fn resolve_bind_addr(value: &str) -> Result<SocketAddr, String> {
    let err = match resolve_addr(value) {
        Ok(addr) => return Ok(addr),
        Err(e) => e,
    };

    let Some((host, port)) = value.rsplit_once(':') else {
        return Err(err);
    };
    if !host.contains(':') {
        return Err(err);
    }
    resolve_addr(&format!("[{}]:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const METHODS: &[&str] = &["obfs4", "meek"];

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn server_env(extra: &[(&str, &str)]) -> EnvMap {
        let mut map = env(&[
            (MANAGED_TRANSPORT_VER, "1"),
            (ORPORT, "127.0.0.1:9001"),
            (SERVER_BINDADDR, "obfs4-0.0.0.0:4443,meek-127.0.0.1:8080,fte-127.0.0.1:5555"),
            (SERVER_TRANSPORTS, "*"),
        ]);
        map.extend(env(extra));
        map
    }

    #[test]
    fn test_version_without_rest_of_environment() {
        let only_version = env(&[(MANAGED_TRANSPORT_VER, "1")]);
        assert_eq!(managed_transport_version(&only_version).unwrap(), "1");
        assert!(ServerInfo::from_env_map(&only_version, METHODS).is_err());
    }

    #[test]
    fn test_version_negotiation() {
        let info = ClientInfo::from_env_map(
            &env(&[(MANAGED_TRANSPORT_VER, "2,1"), (CLIENT_TRANSPORTS, "*")]),
            METHODS,
        )
        .unwrap();
        assert_eq!(info.version, "1");

        let err = ClientInfo::from_env_map(
            &env(&[(MANAGED_TRANSPORT_VER, "2,3"), (CLIENT_TRANSPORTS, "*")]),
            METHODS,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { .. }));

        let err = ClientInfo::from_env_map(&env(&[(CLIENT_TRANSPORTS, "*")]), METHODS).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar { ref name } if name == MANAGED_TRANSPORT_VER
        ));
    }

    #[test]
    fn test_client_transports() {
        let info = ClientInfo::from_env_map(
            &env(&[(MANAGED_TRANSPORT_VER, "1"), (CLIENT_TRANSPORTS, "*")]),
            METHODS,
        )
        .unwrap();
        assert_eq!(info.method_names, vec!["obfs4", "meek"]);

        let info = ClientInfo::from_env_map(
            &env(&[(MANAGED_TRANSPORT_VER, "1"), (CLIENT_TRANSPORTS, "meek,scramblesuit,obfs4")]),
            METHODS,
        )
        .unwrap();
        assert_eq!(info.method_names, vec!["meek", "obfs4"]);

        let err =
            ClientInfo::from_env_map(&env(&[(MANAGED_TRANSPORT_VER, "1")]), METHODS).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { .. }));
    }

    #[test]
    fn test_server_bind_addrs_filtered() {
        let info = ServerInfo::from_env_map(&server_env(&[]), METHODS).unwrap();
        let names: Vec<&str> = info.bind_addrs.iter().map(|b| b.method_name.as_str()).collect();
        assert_eq!(names, vec!["obfs4", "meek"]);
        assert_eq!(info.bind_addrs[0].addr, "0.0.0.0:4443".parse().unwrap());
        assert_eq!(info.or_addr, "127.0.0.1:9001".parse().unwrap());
        assert!(info.extended_or_addr.is_none());
        assert!(info.auth_cookie.is_none());

        let info =
            ServerInfo::from_env_map(&server_env(&[(SERVER_TRANSPORTS, "meek,fte")]), METHODS)
                .unwrap();
        let names: Vec<&str> = info.bind_addrs.iter().map(|b| b.method_name.as_str()).collect();
        assert_eq!(names, vec!["meek"]);
    }

    #[test]
    fn test_bind_addr_without_dash() {
        let err = ServerInfo::from_env_map(&server_env(&[(SERVER_BINDADDR, "obfs4")]), METHODS)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
        assert!(err.to_string().contains("doesn't contain"));
    }

    #[test]
    fn test_bind_addr_unbracketed_ipv6() {
        assert_eq!(
            resolve_bind_addr("::1:4443").unwrap(),
            "[::1]:4443".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_bind_addr("2001:db8::7:80").unwrap(),
            "[2001:db8::7]:80".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_bind_addr("[::1]:4443").unwrap(),
            "[::1]:4443".parse::<SocketAddr>().unwrap()
        );
        assert!(resolve_bind_addr("1.2.3.4").is_err());
        assert!(resolve_bind_addr("::1").is_err());
    }

    #[test]
    fn test_extended_orport_and_cookie() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(crate::protocol::cookie::COOKIE_HEADER).unwrap();
        file.write_all(&[5u8; 32]).unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let info = ServerInfo::from_env_map(
            &server_env(&[
                (EXTENDED_SERVER_PORT, "127.0.0.1:9002"),
                (AUTH_COOKIE_FILE, path.as_str()),
            ]),
            METHODS,
        )
        .unwrap();
        assert_eq!(info.extended_or_addr, Some("127.0.0.1:9002".parse().unwrap()));
        assert_eq!(info.auth_cookie.as_ref().unwrap().as_bytes(), &[5u8; 32]);

        match info.target().unwrap() {
            Target::ExtOrPort { addr, .. } => assert_eq!(addr.port(), 9002),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_empty_optional_vars_are_unset() {
        let info = ServerInfo::from_env_map(
            &server_env(&[(EXTENDED_SERVER_PORT, ""), (AUTH_COOKIE_FILE, "")]),
            METHODS,
        )
        .unwrap();
        assert!(matches!(info.target().unwrap(), Target::Direct(_)));
    }

    #[test]
    fn test_extended_orport_without_cookie() {
        let info = ServerInfo::from_env_map(
            &server_env(&[(EXTENDED_SERVER_PORT, "127.0.0.1:9002")]),
            METHODS,
        )
        .unwrap();
        assert!(matches!(info.target(), Err(ConfigError::MissingCookie { .. })));
    }

    #[test]
    fn test_bad_cookie_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 40]).unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err =
            ServerInfo::from_env_map(&server_env(&[(AUTH_COOKIE_FILE, path.as_str())]), METHODS)
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCookie { .. }));
    }

    #[test]
    fn test_bad_orport() {
        let err = ServerInfo::from_env_map(&server_env(&[(ORPORT, "not an address")]), METHODS)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { ref var, .. } if var == ORPORT));
    }
}
