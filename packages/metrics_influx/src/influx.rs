//! Client for the InfluxDB v2 write API.

use std::fmt;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, warn};

use crate::{LineProtocol, Point, Precision, Sink, SinkError, SinkOptions, WriteMode};

/// Delay before the first retry. Each further retry doubles it.
const BASE_BACKOFF: Duration = Duration::from_millis(100);

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Batches waiting for the background writer. Writes beyond this are rejected.
const BACKGROUND_QUEUE_CAPACITY: usize = 16;

/// A [`Sink`] writing line protocol to the `/api/v2/write` endpoint of InfluxDB.
///
/// # Example
///
/// ```no_run
/// use metrics_influx::{InfluxSink, Sink, SinkOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = SinkOptions::new("http://localhost:8086".parse()?, "token", "bucket");
///
/// let mut sink = InfluxSink::connect(&options)?;
/// sink.write(Vec::new()).await?;
/// sink.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InfluxSink {
    precision: Precision,
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Blocking(Writer),
    Background {
        queue: mpsc::Sender<String>,
        worker: JoinHandle<()>,

        // None once handed out via `take_errors()`.
        errors: Option<mpsc::UnboundedReceiver<SinkError>>,
    },
}

impl InfluxSink {
    /// Prepares a client for the database described by `options`.
    ///
    /// No request is made until the first write.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed, if the write endpoint cannot be
    /// derived from the configured URL, or if [`WriteMode::Background`] is requested
    /// outside of a Tokio runtime.
    pub fn connect(options: &SinkOptions) -> Result<Self, SinkError> {
        let writer = Writer::new(options)?;

        let mode = match options.write_mode {
            WriteMode::Blocking => Mode::Blocking(writer),
            WriteMode::Background => {
                let runtime = Handle::try_current().map_err(SinkError::NoRuntime)?;

                let (queue, batches) = mpsc::channel(BACKGROUND_QUEUE_CAPACITY);
                let (errors_tx, errors) = mpsc::unbounded_channel();
                // The worker logs to the subscriber that is current for the caller.
                let worker = runtime.spawn(
                    write_in_background(writer, batches, errors_tx).with_current_subscriber(),
                );

                Mode::Background {
                    queue,
                    worker,
                    errors: Some(errors),
                }
            }
        };

        Ok(Self {
            precision: options.precision,
            mode,
        })
    }
}

impl Sink for InfluxSink {
    async fn write(&mut self, batch: Vec<Point>) -> Result<(), SinkError> {
        let body = LineProtocol::new(&batch, self.precision).to_string();

        // Every point consisted of values the line protocol cannot represent.
        if body.is_empty() {
            return Ok(());
        }

        match &mut self.mode {
            Mode::Blocking(writer) => writer.send(body).await,
            Mode::Background { queue, .. } => queue.try_send(body).map_err(|error| match error {
                TrySendError::Full(_) => SinkError::Backlog,
                TrySendError::Closed(_) => SinkError::Closed,
            }),
        }
    }

    fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<SinkError>> {
        match &mut self.mode {
            Mode::Blocking(_) => None,
            Mode::Background { errors, .. } => errors.take(),
        }
    }

    async fn close(self) {
        if let Mode::Background { queue, worker, .. } = self.mode {
            // The worker drains whatever is still queued and exits once the queue is closed.
            drop(queue);

            if let Err(error) = worker.await {
                error!(error = %error, "background metrics writer terminated abnormally");
            }
        }

        debug!("metrics sink closed");
    }
}

async fn write_in_background(
    writer: Writer,
    mut batches: mpsc::Receiver<String>,
    errors: mpsc::UnboundedSender<SinkError>,
) {
    while let Some(body) = batches.recv().await {
        if let Err(error) = writer.send(body).await
            && let Err(unreported) = errors.send(error)
        {
            // Nobody is draining the error channel anymore.
            error!(error = %unreported.0, "writing metrics batch in background");
        }
    }
}

/// Performs HTTP requests against the write endpoint.
struct Writer {
    client: Client,
    endpoint: Url,
    authorization: String,
    retries: u32,
}

impl Writer {
    fn new(options: &SinkOptions) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(SinkError::Client)?;

        Ok(Self {
            client,
            endpoint: write_endpoint(options)?,
            authorization: format!("Token {}", options.token),
            retries: options.retries,
        })
    }

    /// Sends one body, repeating the request with exponential backoff while it fails
    /// with a retryable error and retries remain.
    async fn send(&self, body: String) -> Result<(), SinkError> {
        let mut attempt = 0_u32;

        loop {
            match self.send_once(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < self.retries => {
                    let delay = backoff(attempt);

                    warn!(
                        url = %self.endpoint,
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "retrying metrics write after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_once(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(SinkError::Transport)?;

        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        // The body only adds detail to the error, failing to read it is not a new error.
        let body = response.text().await.unwrap_or_default();

        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl fmt::Debug for Writer {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("endpoint", &self.endpoint.as_str())
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF
        .saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Derives `{url}/api/v2/write?org=..&bucket=..&precision=..` from the options.
fn write_endpoint(options: &SinkOptions) -> Result<Url, SinkError> {
    let mut endpoint = options.url.clone();
    endpoint.set_query(None);

    endpoint
        .path_segments_mut()
        .map_err(|()| SinkError::Endpoint {
            url: options.url.to_string(),
        })?
        .pop_if_empty()
        .extend(["api", "v2", "write"]);

    {
        let mut query = endpoint.query_pairs_mut();

        if let Some(org) = &options.org {
            query.append_pair("org", org);
        }

        query.append_pair("bucket", &options.bucket);
        query.append_pair("precision", options.precision.as_str());
    }

    Ok(endpoint)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn options(url: &str) -> SinkOptions {
        SinkOptions::new(Url::parse(url).unwrap(), "secret", "metrics")
    }

    #[test]
    fn endpoint_without_org() {
        let endpoint = write_endpoint(&options("http://localhost:8086")).unwrap();

        assert_eq!(
            endpoint.as_str(),
            "http://localhost:8086/api/v2/write?bucket=metrics&precision=s"
        );
    }

    #[test]
    fn endpoint_with_org_and_precision() {
        let mut options = options("https://influx.example.com");
        options.org = Some("my org".to_owned());
        options.precision = Precision::Milliseconds;

        let endpoint = write_endpoint(&options).unwrap();

        assert_eq!(
            endpoint.as_str(),
            "https://influx.example.com/api/v2/write?org=my+org&bucket=metrics&precision=ms"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        for url in ["http://proxy/influx", "http://proxy/influx/"] {
            let endpoint = write_endpoint(&options(url)).unwrap();

            assert_eq!(
                endpoint.as_str(),
                "http://proxy/influx/api/v2/write?bucket=metrics&precision=s",
                "{url}"
            );
        }
    }

    #[test]
    fn endpoint_drops_query_of_base_url() {
        let endpoint = write_endpoint(&options("http://localhost:8086/?stale=1")).unwrap();

        assert_eq!(
            endpoint.as_str(),
            "http://localhost:8086/api/v2/write?bucket=metrics&precision=s"
        );
    }

    #[test]
    fn backoff_doubles_up_to_limit() {
        assert_eq!(backoff(0), Duration::from_millis(100));
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(3), Duration::from_millis(800));
        assert_eq!(backoff(20), MAX_BACKOFF);
        assert_eq!(backoff(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn background_mode_requires_runtime() {
        let mut options = options("http://localhost:8086");
        options.write_mode = WriteMode::Background;

        let result = InfluxSink::connect(&options);
        assert!(matches!(result, Err(SinkError::NoRuntime(_))));
    }

    #[test]
    fn blocking_mode_has_no_error_channel() {
        let mut sink = InfluxSink::connect(&options("http://localhost:8086")).unwrap();
        assert!(sink.take_errors().is_none());
    }

    #[tokio::test]
    async fn background_mode_hands_out_error_channel_once() {
        let mut options = options("http://localhost:8086");
        options.write_mode = WriteMode::Background;

        let mut sink = InfluxSink::connect(&options).unwrap();
        assert!(sink.take_errors().is_some());
        assert!(sink.take_errors().is_none());

        sink.close().await;
    }

    #[tokio::test]
    async fn batch_without_encodable_points_is_not_sent() {
        // Nothing listens on this port; any request would fail.
        let mut options = options("http://127.0.0.1:9");
        options.retries = 0;

        let mut sink = InfluxSink::connect(&options).unwrap();
        let result = sink.write(Vec::new()).await;

        assert!(result.is_ok());
        sink.close().await;
    }
}
