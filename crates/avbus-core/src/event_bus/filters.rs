//! Consumer filter stages.
//!
//! Each stage owns its private state and decides, per payload, whether to
//! forward it. Stages are realized fresh for every `Consumer::handle` call.

/// One step of a consumer filter chain
pub trait FilterStage<P> {
    /// Return the payload to forward, or `None` to suppress it.
    fn process(&mut self, payload: P, now_ms: i64) -> Option<P>;
}

/// Payloads that numeric filters can compare and round
pub trait NumericPayload: Clone + 'static {
    fn to_f64(&self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_numeric_payload {
    ($($t:ty),*) => {
        $(
            impl NumericPayload for $t {
                fn to_f64(&self) -> f64 {
                    *self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_numeric_payload!(f32, f64, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

/// Rate limit to `hz` events per second
#[derive(Debug, Clone)]
pub struct AtFrequency {
    period_ms: f64,
    prev_ms: f64,
    first_run: bool,
}

impl AtFrequency {
    pub fn new(hz: f64, immediate_first: bool, now_ms: i64) -> Self {
        Self {
            period_ms: 1000.0 / hz,
            prev_ms: now_ms as f64,
            first_run: immediate_first,
        }
    }
}

impl<P> FilterStage<P> for AtFrequency {
    fn process(&mut self, payload: P, now_ms: i64) -> Option<P> {
        let now = now_ms as f64;
        if !self.first_run && now - self.prev_ms < self.period_ms {
            return None;
        }
        self.first_run = false;
        // Advance in whole periods so the rate does not drift
        let elapsed = now - self.prev_ms;
        if elapsed >= self.period_ms {
            let periods = (elapsed / self.period_ms).floor();
            let advanced = self.prev_ms + periods * self.period_ms;
            // Periods too small to move the window in f64 snap it to now
            self.prev_ms = if advanced.is_finite() && advanced > self.prev_ms && advanced <= now {
                advanced
            } else {
                now
            };
        }
        Some(payload)
    }
}

/// Round to a number of decimal places and forward changes of the rounded value
#[derive(Debug, Clone)]
pub struct WithPrecision {
    precision: i32,
    last: Option<f64>,
}

impl WithPrecision {
    /// Negative precision rounds to tens, hundreds and so on.
    pub fn new(precision: i32) -> Self {
        Self {
            precision,
            last: None,
        }
    }

    fn round(&self, value: f64) -> f64 {
        if self.precision >= 0 {
            let factor = 10f64.powi(self.precision);
            (value * factor).round() / factor
        } else {
            let factor = 10f64.powi(-self.precision);
            (value / factor).round() * factor
        }
    }
}

impl<P: NumericPayload> FilterStage<P> for WithPrecision {
    fn process(&mut self, payload: P, _now_ms: i64) -> Option<P> {
        let rounded = self.round(payload.to_f64());
        if self.last == Some(rounded) {
            return None;
        }
        self.last = Some(rounded);
        Some(P::from_f64(rounded))
    }
}

/// Forward when the value moved at least `amount` from the last forwarded value
#[derive(Debug, Clone)]
pub struct WhenChangedBy {
    amount: f64,
    last: Option<f64>,
}

impl WhenChangedBy {
    pub fn new(amount: f64) -> Self {
        Self { amount, last: None }
    }
}

impl<P: NumericPayload> FilterStage<P> for WhenChangedBy {
    fn process(&mut self, payload: P, _now_ms: i64) -> Option<P> {
        let value = payload.to_f64();
        if let Some(last) = self.last {
            if (value - last).abs() < self.amount {
                return None;
            }
        }
        self.last = Some(value);
        Some(payload)
    }
}

/// Forward only values that differ from the last forwarded value
#[derive(Debug, Clone)]
pub struct WhenChanged<P> {
    last: Option<P>,
}

impl<P> WhenChanged<P> {
    pub fn new() -> Self {
        Self { last: None }
    }
}

impl<P> Default for WhenChanged<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + PartialEq> FilterStage<P> for WhenChanged<P> {
    fn process(&mut self, payload: P, _now_ms: i64) -> Option<P> {
        if self.last.as_ref() == Some(&payload) {
            return None;
        }
        self.last = Some(payload.clone());
        Some(payload)
    }
}

/// Forward when more than `interval_ms` has passed since the last window
#[derive(Debug, Clone)]
pub struct OnlyAfter {
    interval_ms: i64,
    prev_ms: i64,
}

impl OnlyAfter {
    pub fn new(interval_ms: i64, now_ms: i64) -> Self {
        Self {
            interval_ms,
            prev_ms: now_ms,
        }
    }
}

impl<P> FilterStage<P> for OnlyAfter {
    fn process(&mut self, payload: P, now_ms: i64) -> Option<P> {
        if now_ms - self.prev_ms > self.interval_ms {
            self.prev_ms += self.interval_ms;
            Some(payload)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<P: Clone, S: FilterStage<P>>(stage: &mut S, events: &[(i64, P)]) -> Vec<P> {
        events
            .iter()
            .filter_map(|(t, p)| stage.process(p.clone(), *t))
            .collect()
    }

    #[test]
    fn test_at_frequency_catches_up_in_periods() {
        let mut stage = AtFrequency::new(2.0, true, 0);
        let events: Vec<(i64, i64)> = [0, 100, 400, 600, 1000].iter().map(|t| (*t, *t)).collect();
        assert_eq!(run(&mut stage, &events), vec![0, 600, 1000]);
    }

    #[test]
    fn test_at_frequency_without_immediate_first() {
        let mut stage = AtFrequency::new(2.0, false, 0);
        let events: Vec<(i64, i64)> = [0, 100, 500, 700].iter().map(|t| (*t, *t)).collect();
        assert_eq!(run(&mut stage, &events), vec![500]);
    }

    #[test]
    fn test_at_frequency_fractional_period() {
        // 3 Hz: windows of 333.33 ms
        let mut stage = AtFrequency::new(3.0, true, 0);
        let events: Vec<(i64, i64)> = [0, 300, 334, 600, 667, 1001]
            .iter()
            .map(|t| (*t, *t))
            .collect();
        assert_eq!(run(&mut stage, &events), vec![0, 334, 667, 1001]);
    }

    #[test]
    fn test_at_frequency_with_vanishing_period() {
        let mut stage = AtFrequency::new(1e300, true, 1000);
        let events: Vec<(i64, i64)> = [1000, 1000, 1001, 5_000_000]
            .iter()
            .map(|t| (*t, *t))
            .collect();
        // Same-millisecond repeats are still inside the window
        assert_eq!(run(&mut stage, &events), vec![1000, 1001, 5_000_000]);
        assert!((stage.prev_ms - 5_000_000.0).abs() <= 1.0);
    }

    #[test]
    fn test_with_precision() {
        let mut stage = WithPrecision::new(1);
        let out = run(&mut stage, &[(0, 1.04), (0, 1.01), (0, 1.06), (0, 1.14)]);
        assert_eq!(out, vec![1.0, 1.1]);
    }

    #[test]
    fn test_negative_precision() {
        let mut stage = WithPrecision::new(-2);
        let out = run(&mut stage, &[(0, 1234_i32), (0, 1249), (0, 1251)]);
        assert_eq!(out, vec![1200, 1300]);
    }

    #[test]
    fn test_when_changed_by_threshold() {
        let mut stage = WhenChangedBy::new(5.0);
        let out = run(&mut stage, &[(0, 0), (0, 3), (0, 6), (0, 11)]);
        assert_eq!(out, vec![0, 6, 11]);
    }

    #[test]
    fn test_when_changed() {
        let mut stage = WhenChanged::new();
        let out = run(
            &mut stage,
            &[(0, "a"), (0, "a"), (0, "b"), (0, "b"), (0, "a")],
        );
        assert_eq!(out, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_only_after_advances_by_interval() {
        let mut stage = OnlyAfter::new(100, 0);
        let events: Vec<(i64, i64)> = [50, 101, 150, 205, 260].iter().map(|t| (*t, *t)).collect();
        // Windows end at 100, 200, 300
        assert_eq!(run(&mut stage, &events), vec![101, 205]);
    }
}
