//! Data points produced by the reporter and the measurement naming convention.

use std::collections::BTreeMap;
use std::time::SystemTime;

/// Tag set attached to a [`Point`], ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Value of a single field of a [`Point`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum FieldValue {
    /// A signed integer, used for counts and for integer readings such as min/max.
    Integer(i64),

    /// A floating point value, used for means, deviations, percentiles and rates.
    Float(f64),
}

impl FieldValue {
    /// The value as a float, regardless of its original type.
    #[expect(
        clippy::cast_precision_loss,
        reason = "convenience accessor - precision loss above 2^53 is acceptable"
    )]
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// One reading of one instrument, ready to be written to the time-series database.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Tags,

    // In the fixed order defined for the instrument kind.
    fields: Vec<(&'static str, FieldValue)>,

    timestamp: SystemTime,
}

impl Point {
    /// Creates a point from its parts.
    #[must_use]
    pub fn new(
        measurement: impl Into<String>,
        tags: Tags,
        fields: Vec<(&'static str, FieldValue)>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            fields,
            timestamp,
        }
    }

    /// The measurement the point belongs to.
    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// The tags of the point, ordered by key.
    #[must_use]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// The fields of the point, in the order they were derived.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldValue)> {
        self.fields.iter().copied()
    }

    /// Looks up a single field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find_map(|(key, value)| (*key == name).then_some(*value))
    }

    /// The time at which the reading was taken.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Splits a metric name of the form `measurement,key=value,key=value` into the
/// measurement and the tags embedded in it.
///
/// Segments after the first that do not contain exactly one `=` are not tags. They stay
/// part of the measurement, including their leading comma. Later duplicate keys
/// overwrite earlier ones.
pub(crate) fn parse_name(name: &str) -> (String, Tags) {
    let mut segments = name.split(',');

    // `split()` always yields at least one segment.
    let mut measurement = segments.next().unwrap_or_default().to_owned();
    let mut tags = Tags::new();

    for segment in segments {
        match segment.split_once('=') {
            Some((key, value)) if !value.contains('=') => {
                tags.insert(key.to_owned(), value.to_owned());
            }
            _ => {
                measurement.push(',');
                measurement.push_str(segment);
            }
        }
    }

    (measurement, tags)
}
