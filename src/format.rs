//! Axis and status labels.

use chrono::{DateTime, Utc};

const DAY_MS: f64 = 86_400_000.0;

/// UTC label for a sample time, shortened by window length and age.
///
/// `window_s` is the visible window in seconds. Samples older than a day
/// carry the date; long windows drop seconds (or the clock entirely).
#[must_use]
pub fn time_label(ms: f64, window_s: f64, now_ms: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let Some(t) = DateTime::<Utc>::from_timestamp_millis(ms as i64) else {
        return format!("{ms}");
    };
    let long_ago = now_ms - ms > DAY_MS;
    let fmt = match (long_ago, window_s) {
        (true, w) if w > 864_000.0 => "%m/%d/%y",
        (true, w) if w >= 600.0 => "%m/%d/%y %H:%M",
        (true, _) => "%m/%d/%y %H:%M:%S",
        (false, w) if w >= 600.0 => "%H:%M",
        (false, _) => "%H:%M:%S",
    };
    t.format(fmt).to_string()
}

/// Short value label with a K/M/G suffix.
///
/// Precision follows magnitude; `tight` adds a digit for narrow ranges.
#[must_use]
pub fn range_label(value: f64, tight: bool) -> String {
    let a = value.abs();
    let mut prec: i32 = if a == 0.0 || a.is_nan() {
        0
    } else if a > 20.0 {
        0
    } else if a > 1.0 {
        1
    } else {
        #[allow(clippy::cast_possible_truncation)]
        {
            (-a.log10()).ceil() as i32
        }
    };
    if tight {
        prec += 1;
    }
    let prec = usize::try_from(prec.clamp(0, 5)).unwrap_or(5);

    let (scaled, suffix) = if a >= 1e9 {
        (value / 1e9, "G")
    } else if a >= 1e6 {
        (value / 1e6, "M")
    } else if a >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    format!("{scaled:.prec$}{suffix}")
}
