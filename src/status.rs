//! Status lines for the controlling tor process
//!
//! A managed transport reports to tor on stdout, one line per message: an
//! unescaped keyword followed by space-separated escaped arguments.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::net::SocketAddr;

use crate::error::ConfigError;

/// Escape a string so it has no NUL, no newline and no byte above 127
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\\' => out.push_str("\\\\"),
            1..=127 => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out
}

/// Keyword followed by escaped arguments
pub fn format_line(keyword: &str, args: &[&str]) -> String {
    let mut line = keyword.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&escape(arg));
    }
    line
}

/// Writes status lines, flushing after each one
pub struct StatusWriter<W: Write> {
    out: W,
}

impl StatusWriter<io::Stdout> {
    /// Reporter on the process's stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StatusWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Emit a raw status line
    pub fn line(&mut self, keyword: &str, args: &[&str]) -> io::Result<()> {
        writeln!(self.out, "{}", format_line(keyword, args))?;
        self.out.flush()
    }

    pub fn version(&mut self, version: &str) -> io::Result<()> {
        self.line("VERSION", &[version])
    }

    pub fn env_error(&mut self, msg: &str) -> io::Result<()> {
        self.line("ENV-ERROR", &[msg])
    }

    pub fn version_error(&mut self, msg: &str) -> io::Result<()> {
        self.line("VERSION-ERROR", &[msg])
    }

    /// `socks` is "socks4" or "socks5"
    pub fn cmethod(&mut self, name: &str, socks: &str, addr: SocketAddr) -> io::Result<()> {
        self.line("CMETHOD", &[name, socks, &addr.to_string()])
    }

    pub fn cmethod_error(&mut self, name: &str, msg: &str) -> io::Result<()> {
        self.line("CMETHOD-ERROR", &[name, msg])
    }

    pub fn cmethods_done(&mut self) -> io::Result<()> {
        self.line("CMETHODS", &["DONE"])
    }

    pub fn smethod(&mut self, name: &str, addr: SocketAddr) -> io::Result<()> {
        self.line("SMETHOD", &[name, &addr.to_string()])
    }

    pub fn smethod_error(&mut self, name: &str, msg: &str) -> io::Result<()> {
        self.line("SMETHOD-ERROR", &[name, msg])
    }

    pub fn smethods_done(&mut self) -> io::Result<()> {
        self.line("SMETHODS", &["DONE"])
    }

    /// Report a setup failure with the keyword tor expects for it
    pub fn report_config_error(&mut self, error: &ConfigError) -> io::Result<()> {
        match error {
            ConfigError::UnsupportedVersion { .. } => self.version_error("no-version"),
            other => self.env_error(&other.to_string()),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
