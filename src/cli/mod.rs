pub mod display;
pub mod error;
pub mod format;
pub mod ranking;
pub mod sampler;
pub mod socket;
pub mod tail;
pub mod tui;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cli::error::{Result, TopError};
use crate::cli::socket::SocketKey;
use crate::cli::tail::LogColumns;
use crate::cli::tui::ViewState;

pub const DEFAULT_ACCESS_LOG: &str = "/var/log/squid/access.log";
pub const DEFAULT_TCP_TABLE: &str = "/proc/net/tcp";

/// Monitor a forward proxy's top users and the sites they use.
#[derive(Parser, Debug)]
#[command(name = "proxytop", version, about, long_about = None)]
pub struct Args {
    /// Proxy access log to follow
    #[arg(short = 'f', long = "file", default_value = DEFAULT_ACCESS_LOG)]
    pub log_file: PathBuf,

    /// Field index of the client address in a log line
    #[arg(short, long, default_value_t = 2)]
    pub user: usize,

    /// Field index of the delivered byte count in a log line
    #[arg(short, long, default_value_t = 4)]
    pub size: usize,

    /// Field index of the requested URL in a log line
    #[arg(short = 'l', long = "link", default_value_t = 6)]
    pub site: usize,

    /// Proxy listen socket to watch (A.B.C.D:PORT), repeat for each one
    #[arg(short = 'L', long = "listen", env = "PROXYTOP_LISTEN", value_delimiter = ',')]
    pub listen: Vec<String>,

    /// Refresh interval in seconds
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..=10))]
    pub interval: u64,

    /// Start with plain numbers instead of K/M/G units
    #[arg(long)]
    pub raw: bool,

    /// Kernel TCP socket table to sample
    #[arg(long, env = "PROXYTOP_TCP_TABLE", default_value = DEFAULT_TCP_TABLE)]
    pub tcp_table: PathBuf,

    /// Write diagnostics to this file (filtered by RUST_LOG)
    #[arg(long = "log-file", value_name = "PATH")]
    pub debug_log: Option<PathBuf>,
}

/// Validated runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_file: PathBuf,
    pub columns: LogColumns,
    pub listen: Vec<SocketKey>,
    pub tcp_table: PathBuf,
    pub view: ViewState,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let columns = LogColumns::new(args.user, args.size, args.site)?;
        let listen = args
            .listen
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| SocketKey::parse(s))
            .collect::<Result<Vec<_>>>()?;
        if listen.is_empty() {
            return Err(TopError::NoListenSockets);
        }

        Ok(Self {
            log_file: args.log_file.clone(),
            columns,
            listen,
            tcp_table: args.tcp_table.clone(),
            view: ViewState {
                interval: Duration::from_secs(args.interval),
                units: !args.raw,
                ..ViewState::default()
            },
        })
    }
}
