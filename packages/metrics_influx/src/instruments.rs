//! Lock-free counter and gauge implementations.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::{Counter, Gauge, GaugeFloat};

/// A counter backed by an atomic integer.
///
/// Counters are expected to grow. Calling [`clear()`][Self::clear] is reported
/// as a reset by the reporter on the next tick.
#[derive(Debug, Default)]
pub struct StandardCounter {
    count: AtomicI64,
}

impl StandardCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the counter, wrapping on overflow.
    pub fn inc(&self, delta: i64) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Subtracts `delta` from the counter, wrapping on overflow.
    pub fn dec(&self, delta: i64) {
        self.count.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Resets the counter to zero.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

impl Counter for StandardCounter {
    fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// An integer gauge backed by an atomic integer.
#[derive(Debug, Default)]
pub struct StandardGauge {
    value: AtomicI64,
}

impl StandardGauge {
    /// Creates a gauge reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current reading.
    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }
}

impl Gauge for StandardGauge {
    fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A floating point gauge.
///
/// The value is stored as its IEEE 754 bit pattern in an atomic integer.
#[derive(Debug, Default)]
pub struct StandardGaugeFloat {
    bits: AtomicU64,
}

impl StandardGaugeFloat {
    /// Creates a gauge reading `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current reading.
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl GaugeFloat for StandardGaugeFloat {
    fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn counter_counts() {
        let counter = StandardCounter::new();
        assert_eq!(counter.count(), 0);

        counter.inc(10);
        counter.inc(5);
        counter.dec(3);
        assert_eq!(counter.count(), 12);

        counter.clear();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn gauge_reports_last_update() {
        let gauge = StandardGauge::new();
        assert_eq!(gauge.value(), 0);

        gauge.update(42);
        gauge.update(-7);
        assert_eq!(gauge.value(), -7);
    }

    #[test]
    fn float_gauge_reports_last_update() {
        let gauge = StandardGaugeFloat::new();
        assert_eq!(gauge.value().to_bits(), 0.0_f64.to_bits());

        gauge.update(2.5);
        assert_eq!(gauge.value().to_bits(), 2.5_f64.to_bits());

        gauge.update(f64::NAN);
        assert!(gauge.value().is_nan());
    }
}
