use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info, trace};

use crate::cli::error::{Result, TopError};
use crate::cli::types::LogRecord;

/// 0-based whitespace-separated field positions of the interesting columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogColumns {
    user: usize,
    size: usize,
    site: usize,
}

impl Default for LogColumns {
    fn default() -> Self {
        Self { user: 2, size: 4, site: 6 }
    }
}

impl LogColumns {
    pub fn new(user: usize, size: usize, site: usize) -> Result<Self> {
        if user == size || size == site || user == site {
            return Err(TopError::DuplicateColumns { user, size, site });
        }
        Ok(Self { user, size, site })
    }

    pub fn parse(&self, line: &str) -> Result<LogRecord> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let max = self.user.max(self.size).max(self.site);
        if fields.len() <= max {
            return Err(TopError::ColumnOutOfRange { index: max, columns: fields.len() });
        }

        let user = fields[self.user];
        let site = fields[self.site];
        let raw_size = fields[self.size];
        let byte_size = raw_size
            .parse::<u64>()
            .map_err(|_| TopError::InvalidSize { value: raw_size.to_string() })?;
        if user.is_empty() || site.is_empty() {
            return Err(TopError::EmptyField);
        }

        Ok(LogRecord::new(user, byte_size, site))
    }
}

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Follows a growing access log from its end.
pub struct LogTailer {
    path: PathBuf,
    reader: BufReader<File>,
    columns: LogColumns,
    position: u64,
    partial: Vec<u8>,
    /// Skipping the rest of an overlong line.
    discarding: bool,
}

impl LogTailer {
    /// Opens `path`, checks that its first line parses with `columns` and
    /// positions the reader at end-of-file.
    pub fn open(path: impl AsRef<Path>, columns: LogColumns) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| TopError::LogOpen { path: path.clone(), source })?;
        let mut reader = BufReader::new(file);

        let mut first = String::new();
        let read = (&mut reader).take(MAX_LINE_BYTES as u64).read_line(&mut first)?;
        if read == 0 || first.split_whitespace().next().is_none() {
            return Err(TopError::EmptyLog(path));
        }
        let sample = columns.parse(&first)?;
        debug!("first log line parses as {:?}", sample);

        let position = reader.seek(SeekFrom::End(0))?;
        info!("tailing {} from offset {}", path.display(), position);

        Ok(Self { path, reader, columns, position, partial: Vec::new(), discarding: false })
    }

    /// Returns every record completed since the previous poll. Lines that do
    /// not parse, or grow past [`MAX_LINE_BYTES`], are skipped.
    pub fn poll(&mut self) -> Result<Vec<LogRecord>> {
        self.check_truncation()?;

        let mut records = Vec::new();
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                // Writer is mid-line or done; a partial line waits for its newline.
                break;
            }
            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            if !self.discarding {
                if self.partial.len() + used > MAX_LINE_BYTES {
                    debug!("dropping log line longer than {} bytes", MAX_LINE_BYTES);
                    self.partial.clear();
                    self.discarding = true;
                } else {
                    self.partial.extend_from_slice(&available[..used]);
                }
            }
            self.reader.consume(used);
            self.position += used as u64;
            if !complete {
                continue;
            }

            if !self.discarding {
                let line = String::from_utf8_lossy(&self.partial);
                match self.columns.parse(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => trace!("skipping log line {:?}: {}", line.trim_end(), e),
                }
            }
            self.partial.clear();
            self.discarding = false;
        }
        Ok(records)
    }

    fn check_truncation(&mut self) -> Result<()> {
        let len = self.reader.get_ref().metadata()?.len();
        if len < self.position {
            info!("{} shrank from {} to {} bytes, reading from the start", self.path.display(), self.position, len);
            self.position = self.reader.seek(SeekFrom::Start(0))?;
            self.partial.clear();
            self.discarding = false;
        }
        Ok(())
    }
}
