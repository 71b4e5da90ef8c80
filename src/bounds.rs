//! Session-wide availability limits.
//!
//! Limits only widen: merges take the minimum of `oldest` and the maximum of
//! `newest`, so applying the same delivery twice, or deliveries in any
//! order, gives the same result. [`Bounds::reset`] is the only way to narrow
//! them.
//!
//! Zero is a valid `oldest` but never a known `newest`: a newest of zero
//! means the server has nothing yet.

/// Known `{oldest, newest}` limits in milliseconds since epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    oldest: Option<f64>,
    newest: Option<f64>,
}

impl Bounds {
    /// Unknown limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with both ends known, e.g. for tests.
    #[must_use]
    pub fn known(oldest: f64, newest: f64) -> Self {
        let mut b = Self::new();
        b.include(oldest);
        b.include(newest);
        b
    }

    /// Oldest known time.
    #[must_use]
    pub fn oldest(&self) -> Option<f64> {
        self.oldest
    }

    /// Newest known time.
    #[must_use]
    pub fn newest(&self) -> Option<f64> {
        self.newest
    }

    /// Both limits, if known.
    #[must_use]
    pub fn span(&self) -> Option<(f64, f64)> {
        self.oldest.zip(self.newest)
    }

    /// Whether both limits are known.
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.span().is_some()
    }

    /// Widen to include an observed timestamp. Negative and non-finite
    /// times are ignored.
    pub fn include(&mut self, time: f64) {
        self.merge_oldest(time);
        self.merge_newest(time);
    }

    /// Merge a candidate oldest limit; `newest` is widened if it would fall below.
    pub fn merge_oldest(&mut self, time: f64) {
        if !time.is_finite() || time < 0.0 {
            return;
        }
        self.oldest = Some(self.oldest.map_or(time, |o| o.min(time)));
        if self.newest.is_some_and(|n| n < time) {
            self.newest = Some(time);
        }
    }

    /// Merge a candidate newest limit; `oldest` is widened if it would lie above.
    pub fn merge_newest(&mut self, time: f64) {
        if !time.is_finite() || time <= 0.0 {
            return;
        }
        self.newest = Some(self.newest.map_or(time, |n| n.max(time)));
        if self.oldest.is_some_and(|o| o > time) {
            self.oldest = Some(time);
        }
    }

    /// Merge another set of limits.
    pub fn merge(&mut self, other: &Bounds) {
        if let Some(o) = other.oldest {
            self.merge_oldest(o);
        }
        if let Some(n) = other.newest {
            self.merge_newest(n);
        }
    }

    /// Forget both limits.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clamp `time` into the known limits; unknown ends do not clamp.
    #[must_use]
    pub fn clamp(&self, time: f64) -> f64 {
        let mut t = time;
        if let Some(n) = self.newest {
            t = t.min(n);
        }
        if let Some(o) = self.oldest {
            t = t.max(o);
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let b = Bounds::new();
        assert!(!b.is_known());
        assert_eq!(b.clamp(42.0), 42.0);
    }

    #[test]
    fn merges_are_monotone_and_order_free() {
        let times = [5000.0, 1000.0, 9000.0, 3000.0];
        let mut forward = Bounds::new();
        let mut backward = Bounds::new();
        for t in times {
            forward.include(t);
        }
        for t in times.iter().rev() {
            backward.include(*t);
        }
        assert_eq!(forward, backward);
        assert_eq!(forward.span(), Some((1000.0, 9000.0)));

        let before = forward;
        forward.merge_oldest(2000.0);
        forward.merge_newest(8000.0);
        assert_eq!(forward, before);
    }

    #[test]
    fn idempotent_under_redelivery() {
        let mut b = Bounds::new();
        let header = Bounds::known(100.0, 200.0);
        b.merge(&header);
        let once = b;
        b.merge(&header);
        assert_eq!(b, once);
    }

    #[test]
    fn oldest_only_widens_newest() {
        let mut b = Bounds::new();
        b.merge_newest(100.0);
        b.merge_oldest(500.0);
        assert_eq!(b.span(), Some((100.0, 500.0)));
    }

    #[test]
    fn ignores_negative_and_nan() {
        let mut b = Bounds::new();
        b.include(f64::NAN);
        b.include(-5.0);
        assert_eq!(b, Bounds::new());
    }

    #[test]
    fn zero_is_an_oldest_but_not_a_newest() {
        let mut b = Bounds::new();
        b.include(0.0);
        assert_eq!(b.oldest(), Some(0.0));
        assert!(!b.is_known());

        b.merge_newest(100_000.0);
        assert_eq!(b.span(), Some((0.0, 100_000.0)));
        assert_eq!(Bounds::known(0.0, 100_000.0), b);
    }

    #[test]
    fn reset_and_clamp() {
        let mut b = Bounds::known(1000.0, 2000.0);
        assert_eq!(b.clamp(500.0), 1000.0);
        assert_eq!(b.clamp(2500.0), 2000.0);
        b.reset();
        assert_eq!(b.oldest(), None);
    }
}
