use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::cli::display::{Display, Input};
use crate::cli::format::{self, BINARY, DECIMAL};
use crate::cli::ranking::{AggregationEngine, DEFAULT_CAPACITY};
use crate::cli::sampler::ConnectionSampler;
use crate::cli::tail::LogTailer;
use crate::cli::types::{ConnectionStats, Mode};

/// Sleep between idle loop iterations; bounds key latency.
pub const IDLE_QUANTUM: Duration = Duration::from_millis(100);

/// Rows above the ranking: connections, requests, bytes, status.
const HEADER_ROWS: u16 = 4;
/// Minimum value column width when units are shown.
const SCALED_WIDTH: usize = 10;

/// What one loop iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ModeSwitch,
    Tick,
    Terminating,
}

/// Single-key commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleUnits,
    SetInterval(u64),
    CycleMode,
    ToggleAxis,
    ToggleMetric,
}

impl Command {
    pub fn from_key(c: char) -> Option<Self> {
        Some(match c {
            'q' | 'Q' | 'x' | 'X' => Command::Quit,
            'i' | 'I' => Command::ToggleUnits,
            '0' => Command::SetInterval(10),
            '1'..='9' => Command::SetInterval(c as u64 - '0' as u64),
            'm' | 'M' => Command::CycleMode,
            's' | 'S' | 'u' | 'U' => Command::ToggleAxis,
            'b' | 'B' | 'r' | 'R' => Command::ToggleMetric,
            _ => return None,
        })
    }
}

/// User-adjustable view settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewState {
    pub mode: Mode,
    pub interval: Duration,
    pub units: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { mode: Mode::default(), interval: Duration::from_secs(2), units: true }
    }
}

/// Drives ingestion, key handling and the redraw schedule.
pub struct Dashboard<D: Display> {
    engine: AggregationEngine,
    tailer: LogTailer,
    sampler: ConnectionSampler,
    display: D,
    view: ViewState,
    stats: ConnectionStats,
    started: Instant,
    last_render: Instant,
    next_tick: Instant,
}

impl<D: Display> Dashboard<D> {
    pub fn new(
        tailer: LogTailer,
        sampler: ConnectionSampler,
        display: D,
        view: ViewState,
        stats: ConnectionStats,
        now: Instant,
    ) -> Self {
        Self {
            engine: AggregationEngine::new(DEFAULT_CAPACITY),
            tailer,
            sampler,
            display,
            view,
            stats,
            started: now,
            last_render: now,
            next_tick: now + view.interval,
        }
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Loops until a quit key, an interrupt key or `shutdown` is set.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("interrupted, shutting down");
                return Ok(());
            }
            match self.step(Instant::now())? {
                Phase::Terminating => return Ok(()),
                Phase::Idle => tokio::time::sleep(IDLE_QUANTUM).await,
                Phase::ModeSwitch | Phase::Tick => {}
            }
        }
    }

    /// One pass: ingest, read a key, then redraw if a toggle or the schedule
    /// asks for it.
    pub fn step(&mut self, now: Instant) -> anyhow::Result<Phase> {
        let records = self.tailer.poll()?;
        self.engine.update(&records);

        if let Some(input) = self.display.read_key()? {
            let phase = match input {
                Input::Interrupt => Phase::Terminating,
                Input::Char(c) => match Command::from_key(c) {
                    Some(command) => self.apply(command, now),
                    None => Phase::Idle,
                },
            };
            match phase {
                Phase::Terminating => return Ok(phase),
                Phase::ModeSwitch => {
                    self.render(now)?;
                    return Ok(phase);
                }
                Phase::Idle | Phase::Tick => {}
            }
        }

        if now >= self.next_tick {
            if now > self.next_tick + self.view.interval {
                debug!("lagged {:?} behind schedule, resyncing", now - self.next_tick);
                self.next_tick = now;
            }
            self.next_tick += self.view.interval;
            self.stats = self.sampler.sample()?;
            self.render(now)?;
            return Ok(Phase::Tick);
        }
        Ok(Phase::Idle)
    }

    fn apply(&mut self, command: Command, now: Instant) -> Phase {
        match command {
            Command::Quit => return Phase::Terminating,
            Command::ToggleUnits => self.view.units = !self.view.units,
            Command::SetInterval(secs) => {
                self.view.interval = Duration::from_secs(secs);
                if now.saturating_duration_since(self.last_render) >= self.view.interval {
                    self.next_tick = now;
                }
            }
            Command::CycleMode => {
                self.view.mode = self.view.mode.cycle();
                return Phase::ModeSwitch;
            }
            Command::ToggleAxis => {
                self.view.mode = self.view.mode.toggle_axis();
                return Phase::ModeSwitch;
            }
            Command::ToggleMetric => {
                self.view.mode = self.view.mode.toggle_metric();
                return Phase::ModeSwitch;
            }
        }
        Phase::Idle
    }

    /// Draws the current view and starts a new rate interval at `now`.
    pub fn render(&mut self, now: Instant) -> anyhow::Result<()> {
        let (rows, _cols) = self.display.size()?;
        self.engine.set_capacity(rows.saturating_sub(1).max(1) as usize);

        let (recent_requests, recent_bytes) = self.engine.take_recent();
        let since_render = now.saturating_duration_since(self.last_render).as_secs_f64();
        let uptime = now.saturating_duration_since(self.started);
        let uptime_secs = uptime.as_secs_f64();
        self.last_render = now;

        let units = self.view.units;
        let byte_rate = |n: f64| if units { format::scale(n, BINARY) } else { format!("{n:.2}") };
        let requests_total = self.engine.requests_total();
        let bytes_total = self.engine.bytes_total();
        let top = self.engine.top(self.view.mode);

        let mut lines = vec![
            format!(
                "Users(Act/Tot): {}/{}, Conn(Estab/Tot): {}/{}",
                self.stats.active_users, self.stats.total_users, self.stats.established, self.stats.total_connections
            ),
            format!(
                "Requests(Last,Avg,Tot): {:.2}/s, {:.2}/s, {}",
                rate(recent_requests, since_render),
                rate(requests_total, uptime_secs),
                requests_total
            ),
            format!(
                "Bytes(Last,Avg,Tot): {}/s, {}/s, {}; Top: {}",
                byte_rate(rate(recent_bytes, since_render)),
                byte_rate(rate(bytes_total, uptime_secs)),
                if units { format::scale(bytes_total as f64, BINARY) } else { bytes_total.to_string() },
                top.len()
            ),
            format!(
                "Mode: {}, Interval: {}s, Time elapsed: {}",
                self.view.mode,
                self.view.interval.as_secs(),
                format::elapsed(uptime.as_secs())
            ),
        ];
        lines.extend(ranked_rows(top.entries(), self.view.mode, units, rows.saturating_sub(HEADER_ROWS) as usize));

        self.display.clear();
        for (row, line) in (0..rows).zip(&lines) {
            self.display.write_at(row, 0, line);
        }
        self.display.flush()
    }
}

fn rate(count: u64, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Right-aligned value and key, one per ranked entry, at most `limit` rows.
fn ranked_rows(entries: &[(String, u64)], mode: Mode, units: bool, limit: usize) -> Vec<String> {
    let base = if mode.counts_requests() { DECIMAL } else { BINARY };
    let value = |v: u64| if units { format::scale(v as f64, base) } else { v.to_string() };

    let Some((_, largest)) = entries.first() else {
        return Vec::new();
    };
    let mut width = value(*largest).len();
    if units {
        width = width.max(SCALED_WIDTH);
    }

    entries
        .iter()
        .take(limit)
        .map(|(key, v)| format!("{:>width$}  {}", value(*v), key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::display::GridDisplay;
    use crate::cli::socket::SocketKey;
    use crate::cli::tail::LogColumns;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SEED_LINE: &str = "1700000000.000 1 10.0.0.9 TCP_MISS/200 1 GET http://seed/ - DIRECT/- text/html\n";

    struct Fixture {
        log: NamedTempFile,
        _table: NamedTempFile,
        dashboard: Dashboard<GridDisplay>,
        t0: Instant,
    }

    impl Fixture {
        fn new(rows: u16, cols: u16) -> Self {
            let mut log = NamedTempFile::new().unwrap();
            log.write_all(SEED_LINE.as_bytes()).unwrap();
            log.flush().unwrap();

            let listen = SocketKey::parse("10.1.1.10:3128").unwrap();
            let mut table = NamedTempFile::new().unwrap();
            writeln!(table, "  sl  local_address rem_address   st").unwrap();
            writeln!(table, "   0: {} 0200000A:D431 01 0", listen.key()).unwrap();
            writeln!(table, "   1: {} 0300000A:D432 06 0", listen.key()).unwrap();
            table.flush().unwrap();

            let tailer = LogTailer::open(log.path(), LogColumns::default()).unwrap();
            let sampler = ConnectionSampler::new(table.path(), vec![listen]);
            let t0 = Instant::now();
            let dashboard = Dashboard::new(
                tailer,
                sampler,
                GridDisplay::new(rows, cols),
                ViewState::default(),
                ConnectionStats::default(),
                t0,
            );
            Self { log, _table: table, dashboard, t0 }
        }

        fn append(&mut self, user: &str, size: u64, site: &str) {
            writeln!(self.log, "1700000001.000 5 {user} TCP_MISS/200 {size} GET {site} - DIRECT/- text/html").unwrap();
            self.log.flush().unwrap();
        }

        fn at(&self, secs: f64) -> Instant {
            self.t0 + Duration::from_secs_f64(secs)
        }

        fn line(&self, row: usize) -> String {
            self.dashboard.display().line(row).to_string()
        }
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key('0'), Some(Command::SetInterval(10)));
        assert_eq!(Command::from_key('7'), Some(Command::SetInterval(7)));
        assert_eq!(Command::from_key('1'), Some(Command::SetInterval(1)));
        for c in ['q', 'Q', 'x', 'X'] {
            assert_eq!(Command::from_key(c), Some(Command::Quit));
        }
        for c in ['s', 'S', 'u', 'U'] {
            assert_eq!(Command::from_key(c), Some(Command::ToggleAxis));
        }
        for c in ['b', 'B', 'r', 'R'] {
            assert_eq!(Command::from_key(c), Some(Command::ToggleMetric));
        }
        assert_eq!(Command::from_key('M'), Some(Command::CycleMode));
        assert_eq!(Command::from_key('i'), Some(Command::ToggleUnits));
        assert_eq!(Command::from_key('z'), None);
    }

    #[test]
    fn idle_until_first_tick() {
        let mut fx = Fixture::new(24, 100);
        assert_eq!(fx.dashboard.step(fx.at(0.5)).unwrap(), Phase::Idle);
        assert_eq!(fx.dashboard.display().flushes, 0);
        assert_eq!(fx.dashboard.step(fx.at(2.0)).unwrap(), Phase::Tick);
        assert_eq!(fx.dashboard.display().flushes, 1);
        assert_eq!(fx.line(0), "Users(Act/Tot): 2/2, Conn(Estab/Tot): 1/2");
        assert_eq!(fx.dashboard.step(fx.at(2.1)).unwrap(), Phase::Idle);
    }

    #[test]
    fn recent_rate_divides_by_time_since_last_render() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.render(fx.at(1.0)).unwrap();
        for i in 0..10 {
            fx.append(&format!("10.0.0.{i}"), 100, "http://a/");
        }
        fx.dashboard.step(fx.at(1.5)).unwrap();
        fx.dashboard.render(fx.at(3.0)).unwrap();
        assert_eq!(fx.line(1), "Requests(Last,Avg,Tot): 5.00/s, 3.33/s, 10");
    }

    #[test]
    fn first_render_has_positive_or_zero_elapsed() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.render(fx.t0).unwrap();
        assert_eq!(fx.line(1), "Requests(Last,Avg,Tot): 0.00/s, 0.00/s, 0");
        assert_eq!(fx.line(3), "Mode: Bytes/User, Interval: 2s, Time elapsed: 00:00:00");
    }

    #[test]
    fn mode_switch_redraws_without_moving_schedule() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.display_mut().press('m');
        assert_eq!(fx.dashboard.step(fx.at(0.5)).unwrap(), Phase::ModeSwitch);
        assert_eq!(fx.dashboard.view().mode, Mode::RequestsByUser);
        assert_eq!(fx.line(0), "Users(Act/Tot): 0/0, Conn(Estab/Tot): 0/0");
        assert!(fx.line(3).starts_with("Mode: Requests/User"));

        // Tick deadline is still t0 + 2s.
        assert_eq!(fx.dashboard.step(fx.at(1.9)).unwrap(), Phase::Idle);
        assert_eq!(fx.dashboard.step(fx.at(2.0)).unwrap(), Phase::Tick);
    }

    #[test]
    fn four_mode_cycles_restore_mode() {
        let mut fx = Fixture::new(24, 100);
        for i in 0..4 {
            fx.dashboard.display_mut().press('M');
            fx.dashboard.step(fx.at(0.1 * (i + 1) as f64)).unwrap();
        }
        assert_eq!(fx.dashboard.view().mode, Mode::BytesByUser);
        fx.dashboard.display_mut().press('s');
        fx.dashboard.step(fx.at(0.6)).unwrap();
        assert_eq!(fx.dashboard.view().mode, Mode::BytesBySite);
        fx.dashboard.display_mut().press('r');
        fx.dashboard.step(fx.at(0.7)).unwrap();
        assert_eq!(fx.dashboard.view().mode, Mode::RequestsBySite);
    }

    #[test]
    fn interval_keys_set_seconds() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.display_mut().press('0');
        fx.dashboard.step(fx.at(0.1)).unwrap();
        assert_eq!(fx.dashboard.view().interval, Duration::from_secs(10));
        fx.dashboard.display_mut().press('7');
        fx.dashboard.step(fx.at(0.2)).unwrap();
        assert_eq!(fx.dashboard.view().interval, Duration::from_secs(7));
    }

    #[test]
    fn shorter_interval_already_elapsed_ticks_now() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.display_mut().press('9');
        fx.dashboard.step(fx.at(0.1)).unwrap();
        assert_eq!(fx.dashboard.step(fx.at(2.0)).unwrap(), Phase::Tick);
        // Next deadline is 2s + 9s; a shorter interval already exceeded rebases it.
        assert_eq!(fx.dashboard.step(fx.at(3.5)).unwrap(), Phase::Idle);
        fx.dashboard.display_mut().press('1');
        assert_eq!(fx.dashboard.step(fx.at(3.6)).unwrap(), Phase::Tick);
        assert_eq!(fx.dashboard.step(fx.at(4.0)).unwrap(), Phase::Idle);
        assert_eq!(fx.dashboard.step(fx.at(4.6)).unwrap(), Phase::Tick);
    }

    #[test]
    fn lagging_schedule_resyncs_to_now() {
        let mut fx = Fixture::new(24, 100);
        assert_eq!(fx.dashboard.step(fx.at(30.0)).unwrap(), Phase::Tick);
        // Without the resync every step up to 30s would tick again.
        assert_eq!(fx.dashboard.step(fx.at(30.1)).unwrap(), Phase::Idle);
        assert_eq!(fx.dashboard.step(fx.at(32.0)).unwrap(), Phase::Tick);
    }

    #[test]
    fn quit_and_interrupt_terminate() {
        let mut fx = Fixture::new(24, 100);
        fx.dashboard.display_mut().press('q');
        assert_eq!(fx.dashboard.step(fx.at(0.1)).unwrap(), Phase::Terminating);
        fx.dashboard.display_mut().keys.push_back(Input::Interrupt);
        assert_eq!(fx.dashboard.step(fx.at(0.2)).unwrap(), Phase::Terminating);
    }

    #[test]
    fn renders_ranked_rows_for_mode() {
        let mut fx = Fixture::new(7, 60);
        fx.append("A", 100, "x");
        fx.append("A", 50, "y");
        fx.append("B", 10, "x");
        fx.append("C", 5, "z");
        fx.dashboard.display_mut().press('i');
        fx.dashboard.step(fx.at(0.1)).unwrap();
        fx.dashboard.render(fx.at(1.0)).unwrap();

        assert_eq!(fx.line(2), "Bytes(Last,Avg,Tot): 165.00/s, 165.00/s, 165; Top: 3");
        assert_eq!(fx.line(4), "150  A");
        assert_eq!(fx.line(5), " 10  B");
        assert_eq!(fx.line(6), "  5  C");
        assert_eq!(fx.dashboard.display().lines.len(), 7);
        assert_eq!(fx.dashboard.engine().requests_total(), 4);

        fx.dashboard.display_mut().press('i');
        fx.dashboard.display_mut().press('s');
        assert_eq!(fx.dashboard.step(fx.at(1.1)).unwrap(), Phase::Idle);
        assert_eq!(fx.dashboard.step(fx.at(1.2)).unwrap(), Phase::ModeSwitch);
        assert_eq!(fx.line(4), "       110  x");
        assert_eq!(fx.line(5), "        50  y");
    }

    #[test]
    fn scaled_values_use_mode_base() {
        let mut fx = Fixture::new(24, 100);
        fx.append("A", 2048, "x");
        fx.append("A", 1000, "x");
        fx.dashboard.step(fx.at(0.1)).unwrap();
        fx.dashboard.render(fx.at(1.0)).unwrap();
        assert_eq!(fx.line(4), "     2.98K  A");
        assert_eq!(fx.line(2), "Bytes(Last,Avg,Tot): 2.98K/s, 2.98K/s, 2.98K; Top: 1");

        let rows = ranked_rows(&[("x".into(), 1500)], Mode::RequestsBySite, true, 5);
        assert_eq!(rows, ["     1.50K  x"]);
    }

    #[tokio::test]
    async fn run_returns_when_shutdown_is_set() {
        let mut fx = Fixture::new(24, 100);
        let shutdown = Arc::new(AtomicBool::new(true));
        fx.dashboard.run(shutdown).await.unwrap();

        fx.dashboard.display_mut().press('x');
        fx.dashboard.run(Arc::new(AtomicBool::new(false))).await.unwrap();
    }
}
