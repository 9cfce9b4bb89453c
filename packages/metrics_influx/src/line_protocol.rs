//! Encoding of points in the InfluxDB line protocol.
//!
//! Every point becomes one line:
//!
//! ```text
//! measurement[,tag=value...] field=value[,field=value...] timestamp
//! ```

use std::fmt::{self, Display, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{FieldValue, Point};

const MEASUREMENT_SPECIALS: &[char] = &[',', ' '];
const KEY_SPECIALS: &[char] = &[',', '=', ' '];

/// Unit of the timestamps written to the database.
///
/// Timestamps are truncated to this unit. Precision finer than a second is only useful
/// when metrics are reported more often than once per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Precision {
    /// Nanoseconds.
    Nanoseconds,

    /// Microseconds.
    Microseconds,

    /// Milliseconds.
    Milliseconds,

    /// Seconds.
    #[default]
    Seconds,
}

impl Precision {
    /// The value of the `precision` query parameter of the write API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Whole units of this precision between the Unix epoch and `timestamp`.
    ///
    /// Timestamps before the epoch are clamped to the epoch.
    #[must_use]
    pub fn units_since_epoch(self, timestamp: SystemTime) -> u128 {
        let elapsed = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();

        match self {
            Self::Nanoseconds => elapsed.as_nanos(),
            Self::Microseconds => elapsed.as_micros(),
            Self::Milliseconds => elapsed.as_millis(),
            Self::Seconds => u128::from(elapsed.as_secs()),
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line protocol rendering of a batch of points, produced via [`Display`].
///
/// Float fields that are not finite cannot be represented and are left out. A point left
/// without any fields is left out entirely, as are tags with an empty value.
///
/// # Example
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use metrics_influx::{FieldValue, LineProtocol, Point, Precision, Tags};
///
/// let point = Point::new(
///     "requests",
///     Tags::from([("host".to_owned(), "a".to_owned())]),
///     vec![("count", FieldValue::Integer(3))],
///     SystemTime::UNIX_EPOCH + Duration::from_secs(10),
/// );
///
/// let body = LineProtocol::new(&[point], Precision::Seconds).to_string();
/// assert_eq!(body, "requests,host=a count=3i 10\n");
/// ```
#[derive(Debug)]
pub struct LineProtocol<'a> {
    points: &'a [Point],
    precision: Precision,
}

impl<'a> LineProtocol<'a> {
    /// Prepares `points` for encoding with timestamps in the given precision.
    #[must_use]
    pub fn new(points: &'a [Point], precision: Precision) -> Self {
        Self { points, precision }
    }
}

impl Display for LineProtocol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for point in self.points {
            write_point(f, point, self.precision)?;
        }

        Ok(())
    }
}

fn write_point(f: &mut fmt::Formatter<'_>, point: &Point, precision: Precision) -> fmt::Result {
    let mut fields = point.fields().filter(|(_, value)| is_encodable(*value));

    let Some((first_name, first_value)) = fields.next() else {
        return Ok(());
    };

    write!(f, "{}", Escaped::new(point.measurement(), MEASUREMENT_SPECIALS))?;

    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }

        write!(
            f,
            ",{}={}",
            Escaped::new(key, KEY_SPECIALS),
            Escaped::new(value, KEY_SPECIALS)
        )?;
    }

    f.write_char(' ')?;
    write_field(f, first_name, first_value)?;

    for (name, value) in fields {
        f.write_char(',')?;
        write_field(f, name, value)?;
    }

    writeln!(f, " {}", precision.units_since_epoch(point.timestamp()))
}

fn write_field(f: &mut fmt::Formatter<'_>, name: &str, value: FieldValue) -> fmt::Result {
    write!(f, "{}=", Escaped::new(name, KEY_SPECIALS))?;

    match value {
        FieldValue::Integer(value) => write!(f, "{value}i"),
        FieldValue::Float(value) => write!(f, "{value}"),
    }
}

fn is_encodable(value: FieldValue) -> bool {
    match value {
        FieldValue::Integer(_) => true,
        FieldValue::Float(value) => value.is_finite(),
    }
}

/// Writes a string with the given special characters backslash-escaped.
///
/// Line breaks would terminate the line early, so they are always written as `\n`.
struct Escaped<'a> {
    value: &'a str,
    specials: &'static [char],
}

impl<'a> Escaped<'a> {
    fn new(value: &'a str, specials: &'static [char]) -> Self {
        Self { value, specials }
    }
}

impl Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.value.chars() {
            if c == '\n' {
                f.write_str("\\n")?;
                continue;
            }

            if self.specials.contains(&c) {
                f.write_char('\\')?;
            }

            f.write_char(c)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Tags;

    fn at(seconds: u64, nanos: u32) -> SystemTime {
        UNIX_EPOCH + Duration::new(seconds, nanos)
    }

    fn encode(points: &[Point]) -> String {
        LineProtocol::new(points, Precision::Seconds).to_string()
    }

    #[test]
    fn precision_query_values() {
        assert_eq!(Precision::Nanoseconds.as_str(), "ns");
        assert_eq!(Precision::Microseconds.as_str(), "us");
        assert_eq!(Precision::Milliseconds.as_str(), "ms");
        assert_eq!(Precision::Seconds.as_str(), "s");
        assert_eq!(Precision::default(), Precision::Seconds);
        assert_eq!(Precision::Milliseconds.to_string(), "ms");
    }

    #[test]
    fn precision_truncates_timestamp() {
        let timestamp = at(1_700_000_000, 123_456_789);

        assert_eq!(
            Precision::Nanoseconds.units_since_epoch(timestamp),
            1_700_000_000_123_456_789
        );
        assert_eq!(
            Precision::Microseconds.units_since_epoch(timestamp),
            1_700_000_000_123_456
        );
        assert_eq!(
            Precision::Milliseconds.units_since_epoch(timestamp),
            1_700_000_000_123
        );
        assert_eq!(Precision::Seconds.units_since_epoch(timestamp), 1_700_000_000);
    }

    #[test]
    fn timestamp_before_epoch_is_zero() {
        let timestamp = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(Precision::Seconds.units_since_epoch(timestamp), 0);
    }

    #[test]
    fn integer_and_float_fields() {
        let point = Point::new(
            "latency",
            Tags::new(),
            vec![
                ("count", FieldValue::Integer(-4)),
                ("mean", FieldValue::Float(2.5)),
                ("max", FieldValue::Float(3.0)),
            ],
            at(10, 0),
        );

        assert_eq!(encode(&[point]), "latency count=-4i,mean=2.5,max=3 10\n");
    }

    #[test]
    fn tags_are_sorted_by_key() {
        let tags = Tags::from([
            ("zone".to_owned(), "b".to_owned()),
            ("app".to_owned(), "x".to_owned()),
        ]);
        let point = Point::new("m", tags, vec![("value", FieldValue::Integer(1))], at(1, 0));

        assert_eq!(encode(&[point]), "m,app=x,zone=b value=1i 1\n");
    }

    #[test]
    fn special_characters_are_escaped() {
        let tags = Tags::from([("a key".to_owned(), "v=1,2".to_owned())]);
        let point = Point::new(
            "hit counter,smth",
            tags,
            vec![("value", FieldValue::Integer(1))],
            at(1, 0),
        );

        assert_eq!(
            encode(&[point]),
            "hit\\ counter\\,smth,a\\ key=v\\=1\\,2 value=1i 1\n"
        );
    }

    #[test]
    fn line_breaks_are_escaped() {
        let tags = Tags::from([("k".to_owned(), "two\nlines".to_owned())]);
        let point = Point::new("m", tags, vec![("value", FieldValue::Integer(1))], at(1, 0));

        assert_eq!(encode(&[point]), "m,k=two\\nlines value=1i 1\n");
    }

    #[test]
    fn empty_tag_values_are_omitted() {
        let tags = Tags::from([
            ("empty".to_owned(), String::new()),
            ("k".to_owned(), "v".to_owned()),
        ]);
        let point = Point::new("m", tags, vec![("value", FieldValue::Integer(1))], at(1, 0));

        assert_eq!(encode(&[point]), "m,k=v value=1i 1\n");
    }

    #[test]
    fn non_finite_fields_are_omitted() {
        let point = Point::new(
            "empty_histogram",
            Tags::new(),
            vec![
                ("count", FieldValue::Integer(0)),
                ("mean", FieldValue::Float(f64::NAN)),
                ("p50", FieldValue::Float(f64::INFINITY)),
                ("stddev", FieldValue::Float(0.0)),
            ],
            at(1, 0),
        );

        assert_eq!(encode(&[point]), "empty_histogram count=0i,stddev=0 1\n");
    }

    #[test]
    fn point_without_encodable_fields_is_omitted() {
        let skipped = Point::new(
            "nan_gauge",
            Tags::new(),
            vec![("value", FieldValue::Float(f64::NAN))],
            at(1, 0),
        );
        let kept = Point::new(
            "gauge",
            Tags::new(),
            vec![("value", FieldValue::Float(0.5))],
            at(1, 0),
        );

        assert_eq!(encode(&[skipped, kept]), "gauge value=0.5 1\n");
    }

    #[test]
    fn multiple_points_one_line_each() {
        let timestamp = at(1_700_000_000, 999_000_000);
        let points = [
            Point::new("a", Tags::new(), vec![("value", FieldValue::Integer(1))], timestamp),
            Point::new("b", Tags::new(), vec![("value", FieldValue::Integer(2))], timestamp),
        ];

        assert_eq!(
            LineProtocol::new(&points, Precision::Milliseconds).to_string(),
            "a value=1i 1700000000999\nb value=2i 1700000000999\n"
        );
    }

    #[test]
    fn empty_batch_is_empty_body() {
        assert_eq!(encode(&[]), "");
    }
}
