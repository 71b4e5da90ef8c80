//! Play delay: how far behind wall-clock time the display runs.
//!
//! In real-time mode the delay adapts to the observed lag of the slowest
//! channel; in playback mode it is a fixed offset set when playback starts,
//! so the display advances with the system clock.

use tracing::debug;

/// Tuning of the real-time lag estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagConfig {
    /// Ticks averaged per update once an estimate exists
    pub average_ticks: u32,
    /// Averages larger than this many windows are treated as startup noise
    pub startup_factor: f64,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            average_ticks: 20,
            startup_factor: 100.0,
        }
    }
}

/// Smoothed play delay, in milliseconds.
#[derive(Debug, Clone)]
pub struct LagEstimator {
    config: LagConfig,
    delay: f64,
    sum: f64,
    count: u32,
    fixed: bool,
}

impl LagEstimator {
    /// Zero delay, adapting.
    #[must_use]
    pub fn new(config: LagConfig) -> Self {
        Self {
            config,
            delay: 0.0,
            sum: 0.0,
            count: 0,
            fixed: false,
        }
    }

    /// Restart adaptation from zero (entering real time).
    pub fn reset(&mut self) {
        self.delay = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.fixed = false;
    }

    /// Freeze the delay at `offset` (entering playback).
    pub fn fix(&mut self, offset: f64) {
        self.reset();
        self.delay = offset;
        self.fixed = true;
    }

    /// Current delay.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        self.delay
    }

    /// Whether the delay is a fixed playback offset.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Display time for wall-clock `now`.
    #[must_use]
    pub fn play_time(&self, now: f64) -> f64 {
        now - self.delay
    }

    /// Feed one tick.
    ///
    /// `latest` is the oldest of the per-channel newest delivered times;
    /// ticks before any delivery are ignored. Returns the play time.
    pub fn observe(&mut self, now: f64, latest: Option<f64>, window: f64) -> f64 {
        if self.fixed {
            return self.play_time(now);
        }
        let Some(latest) = latest else {
            return self.play_time(now);
        };

        // first estimate after a reset comes from a single tick
        let needed = if self.delay == 0.0 {
            1
        } else {
            self.config.average_ticks.max(1)
        };

        self.sum += now - latest;
        self.count += 1;
        if self.count >= needed {
            let mut avg = self.sum / f64::from(self.count);
            if avg.abs() > self.config.startup_factor * window {
                avg = 0.0;
            }
            if self.delay > avg {
                // ease down, with a slight pull toward zero
                self.delay = 0.9 * (0.7 * self.delay + 0.3 * avg);
            } else {
                self.delay = 0.3 * self.delay + 0.7 * avg;
            }
            debug!(avg, delay = self.delay, "play delay updated");
            self.sum = 0.0;
            self.count = 0;
        }

        self.play_time(now)
    }
}

impl Default for LagEstimator {
    fn default() -> Self {
        Self::new(LagConfig::default())
    }
}
