//! Errors returned by the reporter, its sinks and the registry.

use thiserror::Error;

/// The reporter configuration was rejected by [`Reporter::new()`][crate::Reporter::new].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The database address could not be parsed as a URL.
    #[error("invalid database URL '{url}': {reason}")]
    InvalidUrl {
        /// The address as it was configured.
        url: String,

        /// Why the address was rejected by the URL parser.
        reason: String,
    },

    /// The database address uses a scheme other than `http` or `https`.
    #[error("unsupported URL scheme '{scheme}', expected 'http' or 'https'")]
    UnsupportedScheme {
        /// The scheme of the configured address.
        scheme: String,
    },

    /// No bucket was configured.
    #[error("the destination bucket must not be empty")]
    MissingBucket,

    /// The reporting interval is zero.
    #[error("the reporting interval must not be zero")]
    ZeroInterval,

    /// One of the static tags has an empty key.
    #[error("static tag keys must not be empty")]
    EmptyTagKey,
}

/// Failure reported by a [`Sink`][crate::Sink], either while it is being constructed
/// or while it writes a batch of points.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// The HTTP client could not be constructed.
    #[error("failed to construct the HTTP client")]
    Client(#[source] reqwest::Error),

    /// The write endpoint could not be derived from the configured address.
    #[error("cannot derive a write endpoint from '{url}'")]
    Endpoint {
        /// The configured database address.
        url: String,
    },

    /// Background writes were requested outside of a Tokio runtime.
    #[error("background writes require a Tokio runtime")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),

    /// The request did not reach the database or no response was received.
    #[error("request to the database failed")]
    Transport(#[source] reqwest::Error),

    /// The database responded with a non-success status code.
    #[error("database rejected the write with status {status}: {body}")]
    Rejected {
        /// HTTP status code of the response.
        status: u16,

        /// Response body, typically a JSON error description.
        body: String,
    },

    /// The background write queue is full, the batch was not accepted.
    #[error("background write queue is full")]
    Backlog,

    /// The sink no longer accepts writes.
    #[error("the sink is closed")]
    Closed,
}

impl SinkError {
    /// Whether a failed request is worth repeating.
    ///
    /// Transport failures, throttling (429) and server-side errors (5xx) are transient.
    /// Everything else indicates a request the database will never accept.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

/// A single instrument reading could not be turned into a data point.
///
/// The offending point is dropped, the rest of the batch is still reported.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PointError {
    /// Nothing is left of the measurement name once the tags are parsed out of it.
    #[error("measurement name is empty")]
    EmptyMeasurement,

    /// A tag parsed from the metric name has an empty key.
    #[error("tag segment '={value}' has an empty key")]
    EmptyTagKey {
        /// The value of the tag with the empty key.
        value: String,
    },
}

/// A metric could not be added to a [`MetricsRegistry`][crate::MetricsRegistry].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// Another metric is already registered under the same name.
    #[error("a metric named '{name}' is already registered")]
    Duplicate {
        /// The contested name.
        name: String,
    },
}

/// The reporter stopped before it started reporting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// The sink could not be constructed, no metrics were reported.
    #[error("failed to construct the metrics sink")]
    SinkConstruction(#[source] SinkError),
}
