//! Mapping between display time and the scrub slider position.
//!
//! The slider spans the range of possible right-edge times of a window of
//! length `window`: 0 % puts the window's left edge at `oldest`, 100 % puts
//! its right edge at `newest`. Image-only layouts use `window = 0`.

use crate::bounds::Bounds;

/// Slider position (0..=100) for a window whose right edge is `time`.
///
/// Returns 0 when the bounds are unknown or the span is not wider than the
/// window.
#[must_use]
pub fn to_percent(time: f64, bounds: &Bounds, window: f64) -> f64 {
    let Some((oldest, newest)) = bounds.span() else {
        return 0.0;
    };
    let w = effective_window(oldest, newest, window);
    let denom = newest - oldest - w;
    if denom <= 0.0 {
        return 0.0;
    }
    (100.0 * (time - oldest - w) / denom).clamp(0.0, 100.0)
}

/// Right-edge time for a slider position, clamped to `[oldest + window, newest]`.
///
/// Returns `None` when the bounds are unknown.
#[must_use]
pub fn from_percent(percent: f64, bounds: &Bounds, window: f64) -> Option<f64> {
    let (oldest, newest) = bounds.span()?;
    let w = effective_window(oldest, newest, window);
    let right = oldest + w + percent * (newest - oldest - w) / 100.0;
    Some(right.clamp(oldest + w, newest))
}

/// Left-edge time for a slider position, within `[oldest, newest - window]`.
#[must_use]
pub fn left_edge_from_percent(percent: f64, bounds: &Bounds, window: f64) -> Option<f64> {
    let (oldest, newest) = bounds.span()?;
    let w = effective_window(oldest, newest, window);
    from_percent(percent, bounds, window).map(|right| right - w)
}

fn effective_window(oldest: f64, newest: f64, window: f64) -> f64 {
    window.max(0.0).min(newest - oldest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::known(0.0, 100_000.0)
    }

    #[test]
    fn round_trip_percentages() {
        let b = bounds();
        for p in [0.0, 25.0, 50.0, 75.0, 100.0] {
            let t = from_percent(p, &b, 10_000.0).unwrap();
            let back = to_percent(t, &b, 10_000.0);
            assert!((back - p).abs() < 1e-6, "{p} -> {t} -> {back}");
        }
    }

    #[test]
    fn left_edge_stays_inside() {
        let b = bounds();
        let w = 10_000.0;
        for p in [-50.0, 0.0, 33.0, 100.0, 250.0] {
            let left = left_edge_from_percent(p, &b, w).unwrap();
            assert!(left >= 0.0 && left <= 100_000.0 - w, "{p} -> {left}");
        }
    }

    #[test]
    fn quarter_positions() {
        let b = bounds();
        assert_eq!(from_percent(25.0, &b, 10_000.0), Some(32_500.0));
        assert_eq!(to_percent(55_000.0, &b, 10_000.0), 50.0);
    }

    #[test]
    fn unknown_bounds_are_neutral() {
        let b = Bounds::new();
        assert_eq!(to_percent(5000.0, &b, 1000.0), 0.0);
        assert_eq!(from_percent(50.0, &b, 1000.0), None);
    }

    #[test]
    fn window_wider_than_span() {
        let b = Bounds::known(1000.0, 2000.0);
        assert_eq!(to_percent(2000.0, &b, 5000.0), 0.0);
        assert_eq!(from_percent(60.0, &b, 5000.0), Some(2000.0));
    }

    #[test]
    fn image_only_zero_window() {
        let b = Bounds::known(1000.0, 2000.0);
        assert_eq!(to_percent(1500.0, &b, 0.0), 50.0);
        assert_eq!(from_percent(100.0, &b, 0.0), Some(2000.0));
    }
}
