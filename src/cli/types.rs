use std::fmt;

/// One parsed access-log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub user: String,
    pub byte_size: u64,
    pub site: String,
}

impl LogRecord {
    pub fn new(user: impl Into<String>, byte_size: u64, site: impl Into<String>) -> Self {
        Self { user: user.into(), byte_size, site: site.into() }
    }
}

/// Connection counters published once per tick.
///
/// `total_users` is the number of distinct remote addresses seen since
/// startup, the other three describe the latest sample only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub active_users: usize,
    pub total_users: usize,
    pub established: usize,
    pub total_connections: usize,
}

/// Which table the ranked view shows.
///
/// Bit 0 selects requests over bytes, bit 1 selects sites over users, so the
/// key commands reduce to bit operations on the index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    BytesByUser = 0,
    RequestsByUser = 1,
    BytesBySite = 2,
    RequestsBySite = 3,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::BytesByUser, Mode::RequestsByUser, Mode::BytesBySite, Mode::RequestsBySite];

    pub fn index(self) -> usize {
        self as usize
    }

    fn from_bits(bits: usize) -> Self {
        Self::ALL[bits & 3]
    }

    pub fn cycle(self) -> Self {
        Self::from_bits(self.index() + 1)
    }

    pub fn toggle_axis(self) -> Self {
        Self::from_bits(self.index() ^ 2)
    }

    pub fn toggle_metric(self) -> Self {
        Self::from_bits(self.index() ^ 1)
    }

    pub fn counts_requests(self) -> bool {
        self.index() & 1 == 1
    }

    pub fn by_site(self) -> bool {
        self.index() & 2 == 2
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::BytesByUser => "Bytes/User",
            Mode::RequestsByUser => "Requests/User",
            Mode::BytesBySite => "Bytes/Site",
            Mode::RequestsBySite => "Requests/Site",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_cycles_return_to_start() {
        for mode in Mode::ALL {
            assert_eq!(mode.cycle().cycle().cycle().cycle(), mode);
        }
        assert_eq!(Mode::RequestsBySite.cycle(), Mode::BytesByUser);
    }

    #[test]
    fn axis_toggles_flip_one_dimension() {
        assert_eq!(Mode::BytesByUser.toggle_axis(), Mode::BytesBySite);
        assert_eq!(Mode::RequestsBySite.toggle_axis(), Mode::RequestsByUser);
        assert_eq!(Mode::BytesByUser.toggle_metric(), Mode::RequestsByUser);
        assert_eq!(Mode::RequestsBySite.toggle_metric(), Mode::BytesBySite);
        assert!(Mode::RequestsBySite.counts_requests());
        assert!(Mode::RequestsBySite.by_site());
        assert!(!Mode::BytesByUser.by_site());
    }
}
