//! Conversion of instrument readings into data points.

use std::time::SystemTime;

use crate::point::parse_name;
use crate::state::CounterState;
use crate::{DistributionSnapshot, FieldValue, Instrument, Point, PointError, RateSnapshot, Tags};

/// Quantiles reported for every distribution, matching [`PERCENTILE_FIELDS`].
const QUANTILES: [f64; 6] = [0.5, 0.75, 0.95, 0.99, 0.999, 0.9999];

/// Field names of the values at [`QUANTILES`], in the same order.
const PERCENTILE_FIELDS: [&str; 6] = ["p50", "p75", "p95", "p99", "p999", "p9999"];

type Fields = Vec<(&'static str, FieldValue)>;

/// Turns the current reading of one named instrument into a data point.
///
/// Returns `Ok(None)` for instruments of unknown kind. Counters update `counters`
/// even if the point is then rejected, so the next delta is computed against the
/// most recent reading.
pub(crate) fn translate(
    name: &str,
    instrument: Instrument<'_>,
    static_tags: &Tags,
    timestamp: SystemTime,
    counters: &mut CounterState,
) -> Result<Option<Point>, PointError> {
    let Some(fields) = derive_fields(name, instrument, counters) else {
        return Ok(None);
    };

    let (measurement, name_tags) = parse_name(name);

    if measurement.is_empty() {
        return Err(PointError::EmptyMeasurement);
    }

    if let Some(value) = name_tags.get("") {
        return Err(PointError::EmptyTagKey {
            value: value.clone(),
        });
    }

    // Tags from the name are applied last and take precedence.
    let mut tags = static_tags.clone();
    tags.extend(name_tags);

    Ok(Some(Point::new(measurement, tags, fields, timestamp)))
}

fn derive_fields(
    name: &str,
    instrument: Instrument<'_>,
    counters: &mut CounterState,
) -> Option<Fields> {
    let fields = match instrument {
        Instrument::Counter(counter) => {
            let count = counter.count();
            let diff = counters.diff(name, count);

            vec![
                ("count", FieldValue::Integer(count)),
                ("diff", FieldValue::Integer(diff)),
            ]
        }
        Instrument::Gauge(gauge) => vec![("value", FieldValue::Integer(gauge.value()))],
        Instrument::GaugeFloat(gauge) => vec![("value", FieldValue::Float(gauge.value()))],
        Instrument::Histogram(histogram) => {
            let snapshot = histogram.snapshot();

            let mut fields = Vec::with_capacity(12);
            push_distribution(&mut fields, &*snapshot);
            fields
        }
        Instrument::Meter(meter) => {
            let snapshot = meter.snapshot();

            vec![
                ("count", FieldValue::Integer(snapshot.count())),
                ("m1", FieldValue::Float(snapshot.rate1())),
                ("m5", FieldValue::Float(snapshot.rate5())),
                ("m15", FieldValue::Float(snapshot.rate15())),
                ("mean", FieldValue::Float(snapshot.rate_mean())),
            ]
        }
        Instrument::Timer(timer) => {
            let snapshot = timer.snapshot();

            let mut fields = Vec::with_capacity(16);
            push_distribution(&mut fields, &*snapshot);
            push_rates(&mut fields, &*snapshot);
            fields
        }
        Instrument::Unknown => return None,
    };

    Some(fields)
}

fn push_distribution(fields: &mut Fields, snapshot: &dyn DistributionSnapshot) {
    fields.extend([
        ("count", FieldValue::Integer(snapshot.count())),
        ("max", FieldValue::Integer(snapshot.max())),
        ("mean", FieldValue::Float(snapshot.mean())),
        ("min", FieldValue::Integer(snapshot.min())),
        ("stddev", FieldValue::Float(snapshot.std_dev())),
        ("variance", FieldValue::Float(snapshot.variance())),
    ]);

    let percentiles = snapshot.percentiles(&QUANTILES);

    // A snapshot that answers fewer quantiles than asked still yields the full field set.
    fields.extend(PERCENTILE_FIELDS.iter().enumerate().map(|(index, name)| {
        let value = percentiles.get(index).copied().unwrap_or(f64::NAN);
        (*name, FieldValue::Float(value))
    }));
}

/// Rates of a timer. The count is already part of the distribution fields and the mean
/// rate is renamed to avoid clashing with the mean duration.
fn push_rates(fields: &mut Fields, snapshot: &dyn RateSnapshot) {
    fields.extend([
        ("m1", FieldValue::Float(snapshot.rate1())),
        ("m5", FieldValue::Float(snapshot.rate5())),
        ("m15", FieldValue::Float(snapshot.rate15())),
        ("meanrate", FieldValue::Float(snapshot.rate_mean())),
    ]);
}
