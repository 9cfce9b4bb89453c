//! Periodic reporting of a registry to a sink.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, trace};

use crate::state::CounterState;
use crate::translate::translate;
use crate::{
    Clock, ConfigError, DEFAULT_RETRIES, InfluxSink, Point, Precision, Registry, ReportError,
    Sink, SinkError, SinkOptions, SystemClock, Tags, WriteMode,
};

/// Time between two reports unless configured otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Settings of a [`Reporter`].
///
/// Create with [`ReporterConfig::new()`] and adjust the public fields as needed. The
/// configuration is validated by [`Reporter::new()`].
#[derive(Clone)]
#[non_exhaustive]
pub struct ReporterConfig {
    /// Base address of the database, e.g. `http://localhost:8086`.
    pub url: String,

    /// API token used to authenticate the writes.
    pub token: String,

    /// Organization owning the bucket.
    pub org: Option<String>,

    /// Bucket the metrics are written to.
    pub bucket: String,

    /// Time between two reports. Also the timeout of a single write request.
    pub interval: Duration,

    /// Tags attached to every reported point.
    ///
    /// A tag with the same key embedded in a metric name takes precedence.
    pub tags: Tags,

    /// Precision of the reported timestamps.
    pub precision: Precision,

    /// Number of times a failed write request is repeated.
    pub retries: u32,

    /// Whether writes block the reporting loop.
    pub write_mode: WriteMode,

    /// Receives the log events of the reporter. Discards everything by default.
    pub logger: Dispatch,
}

impl ReporterConfig {
    /// Creates a configuration for reporting to `bucket` of the database at `url`, with
    /// default settings otherwise.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            org: None,
            bucket: bucket.into(),
            interval: DEFAULT_INTERVAL,
            tags: Tags::new(),
            precision: Precision::default(),
            retries: DEFAULT_RETRIES,
            write_mode: WriteMode::default(),
            logger: Dispatch::none(),
        }
    }
}

impl fmt::Debug for ReporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("interval", &self.interval)
            .field("tags", &self.tags)
            .field("precision", &self.precision)
            .field("retries", &self.retries)
            .field("write_mode", &self.write_mode)
            .field("logger", &self.logger)
            .finish()
    }
}

/// Periodically reports every metric of a registry to InfluxDB.
///
/// On every tick the reporter reads all instruments of the registry, turns them into
/// data points sharing one timestamp and writes them to the database as one batch.
/// Counters are reported both as their cumulative count and as the change since the
/// previous tick.
///
/// Failures never stop the reporter. A metric that cannot be reported is left out of its
/// batch and a batch that cannot be written is dropped, both with an error logged.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use metrics_influx::{Metric, MetricsRegistry, Reporter, ReporterConfig, StandardCounter};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(MetricsRegistry::new());
///
/// let requests = Arc::new(StandardCounter::new());
/// let shared: Arc<StandardCounter> = Arc::clone(&requests);
/// registry.register("requests,endpoint=home", Metric::Counter(shared))?;
///
/// let config = ReporterConfig::new("http://localhost:8086", "token", "metrics");
/// let reporter = Reporter::new(registry, config)?;
///
/// let cancellation = CancellationToken::new();
/// let handle = tokio::spawn(reporter.run(cancellation.clone()));
///
/// requests.inc(1);
///
/// cancellation.cancel();
/// handle.await??;
/// # Ok(())
/// # }
/// ```
pub struct Reporter<C = SystemClock>
where
    C: Clock,
{
    registry: Arc<dyn Registry>,
    interval: Duration,
    tags: Tags,
    sink_options: SinkOptions,
    logger: Dispatch,
    counters: CounterState,
    clock: C,
}

impl Reporter<SystemClock> {
    /// Creates a reporter for the metrics of `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(registry: Arc<dyn Registry>, config: ReporterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(registry, config, SystemClock)
    }
}

impl<C> Reporter<C>
where
    C: Clock,
{
    /// Creates a reporter that takes the timestamps of its points from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_clock(
        registry: Arc<dyn Registry>,
        config: ReporterConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        let ReporterConfig {
            url,
            token,
            org,
            bucket,
            interval,
            tags,
            precision,
            retries,
            write_mode,
            logger,
        } = config;

        let parsed = Url::parse(&url).map_err(|error| ConfigError::InvalidUrl {
            reason: error.to_string(),
            url,
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                scheme: parsed.scheme().to_owned(),
            });
        }

        if bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        if tags.contains_key("") {
            return Err(ConfigError::EmptyTagKey);
        }

        let mut sink_options = SinkOptions::new(parsed, token, bucket);
        sink_options.org = org;
        sink_options.precision = precision;
        sink_options.retries = retries;
        sink_options.timeout = interval;
        sink_options.write_mode = write_mode;

        Ok(Self {
            registry,
            interval,
            tags,
            sink_options,
            logger,
            counters: CounterState::new(),
            clock,
        })
    }

    /// Reports to InfluxDB once per interval until `cancellation` is triggered.
    ///
    /// The first report happens one interval after the call. A report in progress is
    /// completed before the cancellation takes effect, after which the sink is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to the database cannot be set up. Failures
    /// after that are logged and never end the reporting.
    pub async fn run(self, cancellation: CancellationToken) -> Result<(), ReportError> {
        self.run_with(InfluxSink::connect, cancellation).await
    }

    /// Same as [`run()`][Self::run] but writes to the sink returned by `connect`.
    ///
    /// # Errors
    ///
    /// Returns an error if `connect` fails.
    pub async fn run_with<S, F>(
        self,
        connect: F,
        cancellation: CancellationToken,
    ) -> Result<(), ReportError>
    where
        S: Sink,
        F: FnOnce(&SinkOptions) -> Result<S, SinkError>,
    {
        let logger = self.logger.clone();

        self.run_core(connect, cancellation)
            .with_subscriber(logger)
            .await
    }

    /// Reports the current state of the registry to `sink` right away.
    ///
    /// Counter deltas are computed against the previous report, whether that was made by
    /// this method or by the reporting loop.
    pub async fn report_once<S>(&mut self, sink: &mut S)
    where
        S: Sink,
    {
        let logger = self.logger.clone();

        self.report(sink).with_subscriber(logger).await;
    }

    async fn run_core<S, F>(
        mut self,
        connect: F,
        cancellation: CancellationToken,
    ) -> Result<(), ReportError>
    where
        S: Sink,
        F: FnOnce(&SinkOptions) -> Result<S, SinkError>,
    {
        let mut sink = match connect(&self.sink_options) {
            Ok(sink) => sink,
            Err(error) => {
                error!(
                    url = %self.sink_options.url,
                    error = %error,
                    "failed to set up metrics sink, not reporting"
                );
                return Err(ReportError::SinkConstruction(error));
            }
        };

        debug!(
            url = %self.sink_options.url,
            interval_ms = self.interval.as_millis(),
            "metrics reporter started"
        );

        let errors = sink.take_errors();

        // Both complete once the sink is closed: the loop closes it and closing it ends
        // the error channel.
        tokio::join!(self.tick_loop(sink, &cancellation), drain_errors(errors));

        debug!("metrics reporter stopped");

        Ok(())
    }

    async fn tick_loop<S>(&mut self, mut sink: S, cancellation: &CancellationToken)
    where
        S: Sink,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick of a fresh interval completes immediately.
        ticker.reset();

        loop {
            tokio::select! {
                biased;

                () = cancellation.cancelled() => break,
                _ = ticker.tick() => self.report(&mut sink).await,
            }
        }

        debug!("metrics reporter cancelled, closing sink");

        sink.close().await;
    }

    async fn report<S>(&mut self, sink: &mut S)
    where
        S: Sink,
    {
        let batch = self.collect();

        if batch.is_empty() {
            trace!("no metrics to report");
            return;
        }

        let points = batch.len();
        trace!(points, "writing metrics batch");

        if let Err(error) = sink.write(batch).await {
            error!(points, error = %error, "failed to write metrics batch, dropping it");
        }
    }

    /// Translates every instrument of the registry, all with the same timestamp.
    fn collect(&mut self) -> Vec<Point> {
        let timestamp = self.clock.now();
        let mut batch = Vec::new();

        let Self {
            registry,
            tags,
            counters,
            ..
        } = self;

        registry.each(&mut |name, instrument| {
            match translate(name, instrument, tags, timestamp, counters) {
                Ok(Some(point)) => batch.push(point),
                Ok(None) => trace!(metric = name, kind = instrument.kind(), "skipping metric"),
                Err(error) => {
                    error!(
                        metric = name,
                        error = %error,
                        "dropping metric that cannot be reported"
                    );
                }
            }
        });

        batch
    }
}

impl<C> fmt::Debug for Reporter<C>
where
    C: Clock,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("interval", &self.interval)
            .field("tags", &self.tags)
            .field("sink_options", &self.sink_options)
            .field("counters", &self.counters)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Logs the failures of background writes until the sink closes the channel.
async fn drain_errors(errors: Option<mpsc::UnboundedReceiver<SinkError>>) {
    let Some(mut errors) = errors else {
        return;
    };

    while let Some(error) = errors.recv().await {
        error!(error = %error, "background metrics write failed");
    }
}
