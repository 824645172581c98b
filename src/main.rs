//! ptbridge CLI - managed transport diagnostics
//!
//! Inspects the environment tor provides to a managed transport, manages
//! Extended ORPort auth cookie files, and probes an Extended ORPort with a
//! full SAFE_COOKIE handshake and session setup.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use ptbridge::config::{managed_transport_version, process_env, EnvMap};
use ptbridge::error::ConfigError;
use ptbridge::{AuthCookie, ClientInfo, Connector, PtError, ServerInfo, StatusWriter, Target};

/// ptbridge - pluggable transport plumbing for tor
#[derive(Parser, Debug)]
#[command(name = "ptbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Auth cookie file operations
    Cookie {
        #[command(subcommand)]
        action: CookieAction,
    },

    /// Validate the managed transport environment and report to tor
    Setup {
        /// Which side of the transport we are
        #[arg(value_enum)]
        role: Role,

        /// Transport methods this proxy implements
        #[arg(long, value_delimiter = ',', required = true)]
        methods: Vec<String>,
    },

    /// Authenticate to an Extended ORPort and announce a connection
    Probe {
        /// Extended ORPort address
        #[arg(long)]
        ext_orport: SocketAddr,

        /// Auth cookie file written by tor
        #[arg(long)]
        cookie: PathBuf,

        /// Transport method to announce
        #[arg(long)]
        method: String,

        /// Client address to announce
        #[arg(long, default_value = "127.0.0.1:0")]
        user_addr: SocketAddr,

        /// Budget for authentication and setup
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
enum CookieAction {
    /// Check that a cookie file is well-formed
    Check { path: PathBuf },
    /// Write a fresh random cookie file
    Generate { path: PathBuf },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // stdout belongs to tor; logs go to stderr
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(command: Command) -> Result<(), PtError> {
    match command {
        Command::Cookie { action } => run_cookie(action),
        Command::Setup { role, methods } => run_setup(role, &methods),
        Command::Probe {
            ext_orport,
            cookie,
            method,
            user_addr,
            timeout_ms,
        } => {
            let cookie = AuthCookie::load(&cookie)?;
            let connector = Connector::new(Target::ExtOrPort {
                addr: ext_orport,
                cookie,
            })
            .with_handshake_timeout(Duration::from_millis(timeout_ms));

            let stream = connector.connect(user_addr, &method).await?;
            tracing::info!(
                "Extended ORPort {} ready (local {})",
                ext_orport,
                stream
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string())
            );
            Ok(())
        }
    }
}

fn run_cookie(action: CookieAction) -> Result<(), PtError> {
    match action {
        CookieAction::Check { path } => {
            AuthCookie::load(&path)?;
            tracing::info!("{} is a valid auth cookie file", path.display());
            Ok(())
        }
        CookieAction::Generate { path } => {
            AuthCookie::generate().write_file(&path).map_err(|source| {
                ConfigError::CookieWriteFailed {
                    path: path.display().to_string(),
                    source,
                }
            })?;
            Ok(())
        }
    }
}

fn run_setup(role: Role, methods: &[String]) -> Result<(), PtError> {
    let mut status = StatusWriter::stdout();
    report_setup(role, methods, &process_env(), &mut status)
}

/// Negotiate the version first, then validate the rest of the role's
/// environment, telling tor about each outcome on `status`.
fn report_setup<W: Write>(
    role: Role,
    methods: &[String],
    env: &EnvMap,
    status: &mut StatusWriter<W>,
) -> Result<(), PtError> {
    let version = managed_transport_version(env).map_err(|e| report(status, e))?;
    emit(status.version(&version));

    match role {
        Role::Client => {
            let info = ClientInfo::from_env_map(env, methods).map_err(|e| report(status, e))?;
            tracing::info!("Client methods enabled: {:?}", info.method_names);
        }
        Role::Server => {
            let info = ServerInfo::from_env_map(env, methods).map_err(|e| report(status, e))?;
            for bind in &info.bind_addrs {
                tracing::info!("Server method {} on {}", bind.method_name, bind.addr);
            }
            match info.target().map_err(|e| report(status, e))? {
                Target::Direct(addr) => tracing::info!("Upstream ORPort {}", addr),
                Target::ExtOrPort { addr, .. } => {
                    tracing::info!("Upstream extended ORPort {}", addr)
                }
            }
        }
    }
    Ok(())
}

fn report<W: Write>(status: &mut StatusWriter<W>, error: ConfigError) -> ConfigError {
    emit(status.report_config_error(&error));
    error
}

/// tor may have closed our stdout; that must not hide the real outcome
fn emit(result: io::Result<()>) {
    if let Err(e) = result {
        tracing::warn!("Failed to write status line: {}", e);
    }
}
