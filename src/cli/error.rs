//! Error types for proxytop.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by configuration, log tailing and socket sampling.
#[derive(Error, Debug)]
pub enum TopError {
    #[error("Invalid listen socket {socket:?}: {reason}")]
    InvalidSocketFormat { socket: String, reason: String },

    #[error("No listen sockets configured, pass at least one --listen A.B.C.D:PORT")]
    NoListenSockets,

    #[error("Field indices must not match (user={user}, size={size}, site={site})")]
    DuplicateColumns { user: usize, size: usize, site: usize },

    #[error("Cannot open log file {path}: {source}")]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty log {0}, cannot check format")]
    EmptyLog(PathBuf),

    #[error("Unknown log format: line has {columns} fields but index {index} was requested, set indexes properly")]
    ColumnOutOfRange { index: usize, columns: usize },

    #[error("Wrong index for bytes field in the log: {value:?} is not a byte count")]
    InvalidSize { value: String },

    #[error("Empty user or site field in log line")]
    EmptyField,

    #[error("Cannot read TCP socket table {path}: {source}")]
    SocketTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proxytop operations.
pub type Result<T> = std::result::Result<T, TopError>;
