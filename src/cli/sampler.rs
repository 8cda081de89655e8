use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::cli::error::{Result, TopError};
use crate::cli::socket::SocketKey;
use crate::cli::types::ConnectionStats;

/// TCP state code for ESTABLISHED in `/proc/net/tcp`.
pub const TCP_ESTABLISHED: &str = "01";

/// One row of the TCP table that belongs to a watched listen socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConnection {
    pub remote_ip: String,
    pub established: bool,
}

/// Scans the kernel TCP table for connections to the proxy's listen sockets.
pub struct ConnectionSampler {
    path: PathBuf,
    listen: Vec<SocketKey>,
    seen: HashSet<String>,
}

impl ConnectionSampler {
    pub fn new(path: impl Into<PathBuf>, listen: Vec<SocketKey>) -> Self {
        Self { path: path.into(), listen, seen: HashSet::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the table once and folds the remote addresses into the lifetime set.
    pub fn sample(&mut self) -> Result<ConnectionStats> {
        let file = File::open(&self.path).map_err(|source| self.table_error(source))?;
        let reader = BufReader::new(file);

        let mut users = HashSet::new();
        let mut stats = ConnectionStats::default();
        for line in reader.lines() {
            let line = line.map_err(|source| self.table_error(source))?;
            let Some(conn) = parse_tcp_line(&line, &self.listen) else {
                continue;
            };
            stats.total_connections += 1;
            if conn.established {
                stats.established += 1;
            }
            users.insert(conn.remote_ip);
        }

        stats.active_users = users.len();
        self.seen.extend(users);
        stats.total_users = self.seen.len();
        debug!("sampled {}: {:?}", self.path.display(), stats);
        Ok(stats)
    }

    fn table_error(&self, source: std::io::Error) -> TopError {
        TopError::SocketTable { path: self.path.clone(), source }
    }
}

/// Parses a `/proc/net/tcp` row, keeping it only if its local endpoint is one
/// of `listen`. The header row never matches.
pub fn parse_tcp_line(line: &str, listen: &[SocketKey]) -> Option<ClientConnection> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let local = parts[1];
    if !listen.iter().any(|key| key.matches(local)) {
        return None;
    }
    let (remote_ip, _port) = parts[2].split_once(':')?;

    Some(ClientConnection {
        remote_ip: remote_ip.to_string(),
        established: parts[3] == TCP_ESTABLISHED,
    })
}
