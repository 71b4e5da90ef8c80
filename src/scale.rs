//! Y-axis range computation for a panel.
//!
//! Four policies, selected per panel:
//!
//! - **Standard**: min/max rounded outward to 1/2/5 × 10ⁿ, with a near-zero
//!   baseline snapped to zero.
//! - **Auto**: Standard, but the range only grows until a rescale is requested.
//! - **Tight**: min/max after rejecting points more than 3σ from each series' mean.
//! - **Manual**: fixed centre and span moved by pan/zoom.
//!
//! When there is nothing to measure the previous range is kept.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Points further than this many standard deviations from the mean are
/// ignored by [`ScalingMode::Tight`].
pub const WILD_POINT_SIGMAS: f64 = 3.0;

/// A baseline at or below this fraction of the maximum snaps to zero.
const ZERO_SNAP_RATIO: f64 = 0.25;

/// Y-axis policy of a panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    /// Humane rounding of the current extent
    #[default]
    Standard,
    /// Humane rounding, growing only
    Auto,
    /// Extent after wild-point rejection
    Tight,
    /// Operator-controlled centre and span
    Manual,
}

impl ScalingMode {
    /// One-letter code used in session key/value sets.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Standard => 's',
            Self::Auto => 'a',
            Self::Tight => 't',
            Self::Manual => 'm',
        }
    }

    /// Parse a one-letter code; unknown letters are Standard.
    #[must_use]
    pub fn from_letter(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'a' => Self::Auto,
            't' => Self::Tight,
            'm' => Self::Manual,
            _ => Self::Standard,
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standard => "standard",
            Self::Auto => "auto",
            Self::Tight => "tight",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl FromStr for ScalingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "s" => Ok(Self::Standard),
            "auto" | "a" => Ok(Self::Auto),
            "tight" | "t" => Ok(Self::Tight),
            "manual" | "m" => Ok(Self::Manual),
            _ => Err(format!("Unknown scaling mode: {s}")),
        }
    }
}

/// Vertical extent of a panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YRange {
    /// Bottom of the axis
    pub min: f64,
    /// Top of the axis
    pub max: f64,
}

impl YRange {
    /// Create a range.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `max - min`.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Midpoint.
    #[must_use]
    pub fn center(&self) -> f64 {
        self.min + self.span() / 2.0
    }

    fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

/// Round `value` away from zero (`up` for a maximum, `!up` for a minimum)
/// to 1, 2 or 5 × 10ⁿ.
///
/// ```
/// use rust_scan::scale::round_humane;
/// assert_eq!(round_humane(180.2, true), 200.0);
/// assert_eq!(round_humane(8.9, true), 10.0);
/// assert_eq!(round_humane(3.5, false), 2.0);
/// assert_eq!(round_humane(0.0, true), 0.0);
/// ```
#[must_use]
pub fn round_humane(value: f64, up: bool) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let negative = value < 0.0;
    let magnitude = value.abs();
    let mag_pow = 10f64.powf(magnitude.log10().floor());
    let msd = (magnitude / mag_pow).ceil();

    // outward means larger for a positive max or a negative min. An exact
    // 2 or 5 rounded inward still drops a notch: 2 -> 1, 5 -> 2.
    let go_big = up != negative;
    let msd = if msd > 5.0 {
        if go_big { 10.0 } else { 5.0 }
    } else if msd > 2.0 {
        if go_big { 5.0 } else { 2.0 }
    } else if msd > 1.0 {
        if go_big { 2.0 } else { 1.0 }
    } else {
        msd
    };

    let rounded = msd * mag_pow;
    if negative {
        -rounded
    } else {
        rounded
    }
}

/// Standard scaling of a raw extent.
#[must_use]
pub fn humane_range(raw: YRange) -> YRange {
    let mut vmin = round_humane(raw.min, false);
    let vmax = round_humane(raw.max, true);
    if vmin * vmax > 0.0 && vmin / vmax <= ZERO_SNAP_RATIO {
        vmin = 0.0;
    }
    YRange::new(vmin, vmax)
}

fn extent<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<YRange> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<YRange>, &v| {
            Some(match acc {
                Some(r) => YRange::new(r.min.min(v), r.max.max(v)),
                None => YRange::new(v, v),
            })
        })
}

fn mean_and_sigma(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Tight extent of several series.
///
/// Each series' bound is taken over points within 3σ of its mean, unless
/// that trims less than one σ off the unfiltered panel extent, in which case
/// the unfiltered bound stands.
#[must_use]
pub fn tight_range(series: &[Vec<f64>]) -> Option<YRange> {
    let raw = extent(series.iter().flatten())?;
    let mut out: Option<YRange> = None;

    for values in series {
        let Some((mean, sigma)) = mean_and_sigma(values) else {
            continue;
        };
        let lo = mean - WILD_POINT_SIGMAS * sigma;
        let hi = mean + WILD_POINT_SIGMAS * sigma;
        let Some(mut kept) = extent(values.iter().filter(|v| **v >= lo && **v <= hi)) else {
            continue;
        };
        if (raw.min - kept.min).abs() < sigma {
            kept.min = raw.min;
        }
        if (raw.max - kept.max).abs() < sigma {
            kept.max = raw.max;
        }
        out = Some(match out {
            Some(r) => YRange::new(r.min.min(kept.min), r.max.max(kept.max)),
            None => kept,
        });
    }
    out
}

/// Scaling state of one panel.
#[derive(Debug, Clone)]
pub struct PanelScale {
    mode: ScalingMode,
    current: Option<YRange>,
    rescale: bool,
    manual: Option<(f64, f64)>,
}

impl Default for PanelScale {
    fn default() -> Self {
        Self::new(ScalingMode::Standard)
    }
}

impl PanelScale {
    /// New panel scale; the first Auto computation is a full one.
    #[must_use]
    pub fn new(mode: ScalingMode) -> Self {
        Self {
            mode,
            current: None,
            rescale: true,
            manual: None,
        }
    }

    /// Active policy.
    #[must_use]
    pub fn mode(&self) -> ScalingMode {
        self.mode
    }

    /// Switch policy. Entering Manual seeds centre and span from the last range.
    pub fn set_mode(&mut self, mode: ScalingMode) {
        if mode == ScalingMode::Manual && self.mode != ScalingMode::Manual {
            self.manual = self.current.map(|r| (r.center(), r.span()));
        }
        self.mode = mode;
        self.rescale = true;
    }

    /// Let the next Auto computation start over.
    pub fn request_rescale(&mut self) {
        self.rescale = true;
    }

    /// Last computed range.
    #[must_use]
    pub fn current(&self) -> Option<YRange> {
        self.current
    }

    /// Shift a Manual range by `offset` spans. No effect in other modes.
    pub fn pan(&mut self, offset: f64) {
        if self.mode != ScalingMode::Manual {
            return;
        }
        if let Some((center, span)) = self.manual.as_mut() {
            *center += offset * *span;
        }
    }

    /// Multiply a Manual span by `factor`. No effect in other modes.
    pub fn zoom(&mut self, factor: f64) {
        if self.mode != ScalingMode::Manual || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        if let Some((_, span)) = self.manual.as_mut() {
            *span *= factor;
        }
    }

    /// Compute the range for the buffered values of each series in the panel.
    pub fn compute(&mut self, series: &[Vec<f64>]) -> Option<YRange> {
        let next = match self.mode {
            ScalingMode::Manual => self.manual_range(series),
            ScalingMode::Tight => tight_range(series),
            ScalingMode::Standard => extent(series.iter().flatten()).map(humane_range),
            ScalingMode::Auto => extent(series.iter().flatten()).map(humane_range).map(|r| {
                match self.current {
                    Some(cur) if !self.rescale => YRange::new(cur.min.min(r.min), cur.max.max(r.max)),
                    _ => r,
                }
            }),
        };

        if let Some(range) = next.filter(YRange::is_finite) {
            if self.mode == ScalingMode::Auto {
                self.rescale = false;
            }
            trace!(mode = %self.mode, min = range.min, max = range.max, "y range");
            self.current = Some(range);
        }
        self.current
    }

    fn manual_range(&mut self, series: &[Vec<f64>]) -> Option<YRange> {
        if self.manual.is_none() {
            let seed = self
                .current
                .or_else(|| extent(series.iter().flatten()).map(humane_range))?;
            self.manual = Some((seed.center(), seed.span()));
        }
        self.manual
            .map(|(center, span)| YRange::new(center - span / 2.0, center + span / 2.0))
    }
}
