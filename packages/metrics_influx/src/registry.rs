//! Read-only view of the instruments that the reporter consumes.
//!
//! The reporter never records values itself. It walks a [`Registry`] once per reporting
//! interval and reads the current state of every instrument it finds there.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::RegistryError;

/// A monotonically increasing (until reset) cumulative count.
pub trait Counter: Send + Sync {
    /// The current cumulative value of the counter.
    fn count(&self) -> i64;
}

/// An instantaneous integer reading.
pub trait Gauge: Send + Sync {
    /// The current value of the gauge.
    fn value(&self) -> i64;
}

/// An instantaneous floating point reading.
pub trait GaugeFloat: Send + Sync {
    /// The current value of the gauge.
    fn value(&self) -> f64;
}

/// Point-in-time statistics of a sampled distribution.
///
/// All values are computed from the same set of samples, so they are consistent with
/// each other even if the instrument keeps being updated while they are read.
pub trait DistributionSnapshot {
    /// Number of values recorded by the instrument.
    fn count(&self) -> i64;

    /// Largest sampled value.
    fn max(&self) -> i64;

    /// Arithmetic mean of the sampled values.
    fn mean(&self) -> f64;

    /// Smallest sampled value.
    fn min(&self) -> i64;

    /// Standard deviation of the sampled values.
    fn std_dev(&self) -> f64;

    /// Variance of the sampled values.
    fn variance(&self) -> f64;

    /// Values at the requested quantiles (each in `0.0..=1.0`), in the same order.
    fn percentiles(&self, quantiles: &[f64]) -> Vec<f64>;
}

/// Point-in-time throughput statistics of a meter.
pub trait RateSnapshot {
    /// Number of events marked on the meter.
    fn count(&self) -> i64;

    /// Exponentially weighted events per second over the last minute.
    fn rate1(&self) -> f64;

    /// Exponentially weighted events per second over the last 5 minutes.
    fn rate5(&self) -> f64;

    /// Exponentially weighted events per second over the last 15 minutes.
    fn rate15(&self) -> f64;

    /// Mean events per second since the meter was created.
    fn rate_mean(&self) -> f64;
}

/// Snapshot of a timer, which is both a distribution of durations and a meter of events.
pub trait TimerSnapshot: DistributionSnapshot + RateSnapshot {}

impl<T> TimerSnapshot for T where T: DistributionSnapshot + RateSnapshot {}

/// A distribution of sampled integer values.
pub trait Histogram: Send + Sync {
    /// Captures the current state of the distribution.
    fn snapshot(&self) -> Box<dyn DistributionSnapshot>;
}

/// An event throughput meter.
pub trait Meter: Send + Sync {
    /// Captures the current state of the meter.
    fn snapshot(&self) -> Box<dyn RateSnapshot>;
}

/// A meter of events combined with a distribution of their durations.
pub trait Timer: Send + Sync {
    /// Captures the current state of the timer.
    fn snapshot(&self) -> Box<dyn TimerSnapshot>;
}

/// A borrowed handle to one instrument, as handed out by [`Registry::each()`].
#[derive(Clone, Copy)]
#[non_exhaustive]
pub enum Instrument<'a> {
    /// A cumulative counter.
    Counter(&'a dyn Counter),

    /// An integer gauge.
    Gauge(&'a dyn Gauge),

    /// A floating point gauge.
    GaugeFloat(&'a dyn GaugeFloat),

    /// A distribution of values.
    Histogram(&'a dyn Histogram),

    /// An event rate meter.
    Meter(&'a dyn Meter),

    /// A timer.
    Timer(&'a dyn Timer),

    /// An instrument of a kind the reporter does not know how to report.
    Unknown,
}

impl Instrument<'_> {
    /// Short human-readable name of the instrument kind, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Counter(_) => "counter",
            Self::Gauge(_) => "gauge",
            Self::GaugeFloat(_) => "gauge_float",
            Self::Histogram(_) => "histogram",
            Self::Meter(_) => "meter",
            Self::Timer(_) => "timer",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Debug for Instrument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(type_name::<Self>()).field(&self.kind()).finish()
    }
}

/// A collection of named instruments that the reporter walks on every tick.
///
/// Implementations must tolerate instruments being registered and removed on other
/// threads while `each()` runs, and must not block indefinitely.
pub trait Registry: Send + Sync {
    /// Calls `f` once for every instrument currently in the registry.
    ///
    /// The iteration order is unspecified.
    fn each(&self, f: &mut dyn FnMut(&str, Instrument<'_>));
}

/// An owned, shareable instrument stored in a [`MetricsRegistry`].
#[derive(Clone)]
#[non_exhaustive]
pub enum Metric {
    /// A cumulative counter.
    Counter(Arc<dyn Counter>),

    /// An integer gauge.
    Gauge(Arc<dyn Gauge>),

    /// A floating point gauge.
    GaugeFloat(Arc<dyn GaugeFloat>),

    /// A distribution of values.
    Histogram(Arc<dyn Histogram>),

    /// An event rate meter.
    Meter(Arc<dyn Meter>),

    /// A timer.
    Timer(Arc<dyn Timer>),

    /// Any other value. It is kept in the registry but never reported.
    Other(Arc<dyn Any + Send + Sync>),
}

impl Metric {
    /// Borrows the metric as an [`Instrument`] handle.
    #[must_use]
    pub fn as_instrument(&self) -> Instrument<'_> {
        match self {
            Self::Counter(counter) => Instrument::Counter(counter.as_ref()),
            Self::Gauge(gauge) => Instrument::Gauge(gauge.as_ref()),
            Self::GaugeFloat(gauge) => Instrument::GaugeFloat(gauge.as_ref()),
            Self::Histogram(histogram) => Instrument::Histogram(histogram.as_ref()),
            Self::Meter(meter) => Instrument::Meter(meter.as_ref()),
            Self::Timer(timer) => Instrument::Timer(timer.as_ref()),
            Self::Other(_) => Instrument::Unknown,
        }
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(type_name::<Self>())
            .field(&self.as_instrument().kind())
            .finish()
    }
}

/// A thread-safe name to [`Metric`] map implementing [`Registry`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use metrics_influx::{Metric, MetricsRegistry, StandardCounter};
///
/// let registry = MetricsRegistry::new();
/// let requests = Arc::new(StandardCounter::new());
///
/// registry
///     .register(
///         "http_requests,method=GET",
///         Metric::Counter(Arc::<StandardCounter>::clone(&requests)),
///     )
///     .unwrap();
///
/// requests.inc(1);
/// ```
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a metric with the same name already exists.
    /// The existing metric is left in place.
    pub fn register(&self, name: impl Into<String>, metric: Metric) -> Result<(), RegistryError> {
        let name = name.into();
        let mut metrics = self.metrics.write();

        if metrics.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }

        metrics.insert(name, metric);
        Ok(())
    }

    /// Removes the metric registered under `name`, returning it if there was one.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.metrics.write().remove(name)
    }

    /// Returns the metric registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    /// Number of registered metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Whether no metrics are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }
}

impl Registry for MetricsRegistry {
    fn each(&self, f: &mut dyn FnMut(&str, Instrument<'_>)) {
        // The callback runs without the lock held, so it may itself touch the registry.
        let metrics = self
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect::<Vec<_>>();

        for (name, metric) in &metrics {
            f(name, metric.as_instrument());
        }
    }
}
