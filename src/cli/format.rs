//! Number and time formatting for the dashboard.

const SUFFIXES: [char; 8] = ['K', 'M', 'G', 'T', 'P', 'E', 'Z', 'Y'];

/// Binary magnitude base, used for byte counts.
pub const BINARY: f64 = 1024.0;
/// Decimal magnitude base, used for request counts.
pub const DECIMAL: f64 = 1000.0;

/// Scales `n` to the largest magnitude of `base` it reaches, e.g. `1.46K`.
/// Values below `base` are printed as they are.
pub fn scale(n: f64, base: f64) -> String {
    if n <= base - 1.0 {
        return plain(n);
    }
    let mut divisor = base;
    let mut suffix = 0;
    while divisor < n && suffix + 1 < SUFFIXES.len() {
        if n / divisor < base {
            break;
        }
        divisor *= base;
        suffix += 1;
    }
    format!("{:.2}{}", n / divisor, SUFFIXES[suffix])
}

/// Whole numbers print without decimals, anything else with two.
pub fn plain(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < u64::MAX as f64 {
        format!("{}", n as u64)
    } else {
        format!("{n:.2}")
    }
}

/// Formats whole seconds as `HH:MM:SS`; hours keep growing past 99.
pub fn elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = secs % 3600 / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
