use std::collections::HashMap;

use crate::cli::types::{LogRecord, Mode};

/// Cumulative per-key counter. Values only grow.
pub type MetricTable = HashMap<String, u64>;

/// List size used until the first render knows the terminal height.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded ranking of keys, largest value first.
#[derive(Clone, Debug, Default)]
pub struct TopKList {
    entries: Vec<(String, u64)>,
    capacity: usize,
}

impl TopKList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity), capacity }
    }

    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records that `key` now totals `value`.
    ///
    /// An existing entry for `key` is replaced. A new key only enters a full
    /// list if it beats the current minimum; otherwise it stays unranked until
    /// a later update pushes it over. Among equal values the earlier entry
    /// keeps the higher rank.
    pub fn upsert(&mut self, key: &str, value: u64) {
        if self.capacity == 0 {
            return;
        }

        let existing = self.entries.iter().position(|(k, _)| k == key);
        match existing {
            Some(pos) => {
                self.entries.remove(pos);
            }
            None => {
                if self.entries.len() >= self.capacity {
                    match self.entries.last() {
                        Some((_, min)) if value <= *min => return,
                        _ => {}
                    }
                }
            }
        }

        let at = self
            .entries
            .iter()
            .position(|(_, v)| *v < value)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, (key.to_string(), value));
        self.entries.truncate(self.capacity);
    }

    /// Refills from `table`. Ranked keys keep their relative order among equal
    /// values; newcomers follow them, by key.
    fn rebuild(&mut self, table: &MetricTable) {
        let rank: HashMap<&str, usize> =
            self.entries.iter().enumerate().map(|(i, (k, _))| (k.as_str(), i)).collect();
        let mut all: Vec<(&str, u64, usize)> = table
            .iter()
            .map(|(k, v)| (k.as_str(), *v, rank.get(k.as_str()).copied().unwrap_or(usize::MAX)))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then_with(|| a.0.cmp(&b.0)));
        all.truncate(self.capacity);
        self.entries = all.into_iter().map(|(k, v, _)| (k.to_string(), v)).collect();
    }
}

/// Owns the four metric tables, their rankings and the request/byte totals.
#[derive(Debug)]
pub struct AggregationEngine {
    tables: [MetricTable; 4],
    tops: [TopKList; 4],
    requests_total: u64,
    requests_recent: u64,
    bytes_total: u64,
    bytes_recent: u64,
}

impl AggregationEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            tables: Default::default(),
            tops: std::array::from_fn(|_| TopKList::with_capacity(capacity)),
            requests_total: 0,
            requests_recent: 0,
            bytes_total: 0,
            bytes_recent: 0,
        }
    }

    pub fn update(&mut self, records: &[LogRecord]) {
        for record in records {
            self.requests_total = self.requests_total.saturating_add(1);
            self.requests_recent = self.requests_recent.saturating_add(1);
            self.bytes_total = self.bytes_total.saturating_add(record.byte_size);
            self.bytes_recent = self.bytes_recent.saturating_add(record.byte_size);

            for (mode, key, delta) in [
                (Mode::RequestsByUser, &record.user, 1),
                (Mode::RequestsBySite, &record.site, 1),
                (Mode::BytesByUser, &record.user, record.byte_size),
                (Mode::BytesBySite, &record.site, record.byte_size),
            ] {
                let i = mode.index();
                let value = self.tables[i].entry(key.clone()).or_insert(0);
                *value = value.saturating_add(delta);
                self.tops[i].upsert(key, *value);
            }
        }
    }

    /// Resizes every ranking. Growing rebuilds from the tables so keys that
    /// fell off a smaller list come back behind the entries already ranked.
    pub fn set_capacity(&mut self, capacity: usize) {
        for (top, table) in self.tops.iter_mut().zip(&self.tables) {
            let old = top.capacity;
            top.capacity = capacity;
            if capacity > old {
                top.rebuild(table);
            } else {
                top.entries.truncate(capacity);
            }
        }
    }

    pub fn table(&self, mode: Mode) -> &MetricTable {
        &self.tables[mode.index()]
    }

    pub fn top(&self, mode: Mode) -> &TopKList {
        &self.tops[mode.index()]
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    /// Returns `(requests, bytes)` seen since the last call and zeroes them.
    pub fn take_recent(&mut self) -> (u64, u64) {
        let recent = (self.requests_recent, self.bytes_recent);
        self.requests_recent = 0;
        self.bytes_recent = 0;
        recent
    }
}
