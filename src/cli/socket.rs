use std::fmt;
use std::str::FromStr;

use crate::cli::error::{Result, TopError};

/// A validated listen endpoint together with the key the kernel TCP table
/// uses for it (`0A01010A:0C38` for `10.1.1.10:3128` on little-endian).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketKey {
    display: String,
    key: String,
}

impl SocketKey {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| TopError::InvalidSocketFormat {
            socket: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.trim().split(':');
        let (addr, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(addr), Some(port), None) => (addr, port),
            _ => return Err(invalid("expected A.B.C.D:PORT")),
        };

        let port: u32 = port.parse().map_err(|_| invalid("port is not a decimal number"))?;
        if !(1..=65535).contains(&port) {
            return Err(invalid("port must be in 1..=65535"));
        }

        let octets: Vec<&str> = addr.split('.').collect();
        if octets.len() != 4 {
            return Err(invalid("address must have four octets"));
        }
        let mut bytes = [0u8; 4];
        for (slot, octet) in bytes.iter_mut().zip(&octets) {
            *slot = octet.parse().map_err(|_| invalid("octet must be a decimal number in 0..=255"))?;
        }

        // The kernel prints the address as a native-endian u32.
        if cfg!(target_endian = "little") {
            bytes.reverse();
        }
        let hex_addr: String = bytes.iter().map(|b| format!("{b:02X}")).collect();

        Ok(Self {
            display: format!("{}.{}.{}.{}:{}", octets[0], octets[1], octets[2], octets[3], port),
            key: format!("{hex_addr}:{port:04X}"),
        })
    }

    /// Canonical `ADDRHEX:PORTHEX` form as found in `/proc/net/tcp`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, local: &str) -> bool {
        self.key.eq_ignore_ascii_case(local)
    }
}

impl FromStr for SocketKey {
    type Err = TopError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SocketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
