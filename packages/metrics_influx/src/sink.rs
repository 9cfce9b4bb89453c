//! The destination of reported batches.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::mpsc;

use crate::{Point, Precision, SinkError};

/// Number of retries after a failed write unless configured otherwise.
pub const DEFAULT_RETRIES: u32 = 3;

/// Writes batches of points to a time-series database.
///
/// The reporter calls [`write()`][Self::write] at most once per tick and never
/// concurrently. Retrying failed writes is up to the sink; the reporter drops a batch
/// whose write failed and moves on to the next tick.
pub trait Sink: Send {
    /// Writes one batch of points.
    ///
    /// For a sink that writes in the background, success only means the batch was
    /// accepted. Failures of accepted batches are published via
    /// [`take_errors()`][Self::take_errors].
    fn write(&mut self, batch: Vec<Point>) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Hands out the receiving end of the channel on which failures of background
    /// writes are published.
    ///
    /// The channel must close once [`close()`][Self::close] completes. Returns `None` if
    /// the sink has no background writes or the receiver was already taken.
    fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<SinkError>> {
        None
    }

    /// Finishes any writes still in progress and releases the resources of the sink.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// How [`InfluxSink`][crate::InfluxSink] performs writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteMode {
    /// Every write is completed (including retries) before `write()` returns.
    #[default]
    Blocking,

    /// Batches are queued to a background task and `write()` returns immediately.
    /// Failures are published on the error channel of the sink.
    Background,
}

/// Everything needed to connect to the database.
#[derive(Clone)]
#[non_exhaustive]
pub struct SinkOptions {
    /// Base address of the database, e.g. `http://localhost:8086`.
    pub url: Url,

    /// API token sent with every request.
    pub token: String,

    /// Organization owning the bucket. Optional for tokens scoped to a single organization.
    pub org: Option<String>,

    /// Bucket the points are written to.
    pub bucket: String,

    /// Precision of the written timestamps.
    pub precision: Precision,

    /// Number of times a failed request is repeated before the batch is given up on.
    pub retries: u32,

    /// Upper bound on the duration of a single request.
    pub timeout: Duration,

    /// Whether writes block the caller.
    pub write_mode: WriteMode,
}

impl SinkOptions {
    /// Creates options for writing to `bucket` at `url`, with default settings otherwise.
    #[must_use]
    pub fn new(url: Url, token: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            url,
            token: token.into(),
            org: None,
            bucket: bucket.into(),
            precision: Precision::default(),
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_secs(10),
            write_mode: WriteMode::default(),
        }
    }
}

impl fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOptions")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("precision", &self.precision)
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}
