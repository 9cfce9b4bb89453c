#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # `metrics_influx` - periodic metrics reporting to InfluxDB
//!
//! This crate reports the in-process instruments of a metrics registry to an InfluxDB v2
//! database at a fixed interval, until told to stop.
//!
//! # Features
//!
//! - Counters, integer and float gauges, histograms, meters and timers
//! - Counters are reported with both their cumulative count and their change since the
//!   previous report
//! - Tags embedded in metric names (`requests,method=GET`) plus static tags for all points
//! - Blocking or background writes with retries of transient failures
//! - Errors are logged to a caller-provided `tracing` dispatcher and never stop reporting
//! - Testable design with clock and sink abstractions
//!
//! # Basic usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use metrics_influx::{Metric, MetricsRegistry, Reporter, ReporterConfig, StandardGauge};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(MetricsRegistry::new());
//!
//! let connections = Arc::new(StandardGauge::new());
//! let shared: Arc<StandardGauge> = Arc::clone(&connections);
//! registry.register("connections,server=eu1", Metric::Gauge(shared))?;
//!
//! let mut config = ReporterConfig::new("http://localhost:8086", "my-token", "telemetry");
//! config.org = Some("my-org".to_owned());
//! config.interval = Duration::from_secs(30);
//! config.tags.insert("app".to_owned(), "checkout".to_owned());
//!
//! let cancellation = CancellationToken::new();
//! let reporter = Reporter::new(registry, config)?;
//! let reporting = tokio::spawn(reporter.run(cancellation.clone()));
//!
//! connections.update(12);
//!
//! // On shutdown:
//! cancellation.cancel();
//! reporting.await??;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The reporter logs through the [`tracing::Dispatch`] in [`ReporterConfig::logger`], which
//! discards everything unless replaced:
//!
//! ```
//! use metrics_influx::ReporterConfig;
//!
//! let mut config = ReporterConfig::new("http://localhost:8086", "my-token", "telemetry");
//! config.logger = tracing::Dispatch::new(tracing_subscriber::fmt().finish());
//! ```
//!
//! # Custom sinks
//!
//! [`Reporter::run_with()`] writes to any [`Sink`], for example one that forwards the points
//! to a different database.

mod clock;
mod error;
mod influx;
mod instruments;
mod line_protocol;
mod point;
mod registry;
mod reporter;
mod sink;
mod state;
mod translate;

pub use clock::*;
pub use error::*;
pub use influx::*;
pub use instruments::*;
pub use line_protocol::*;
pub use point::*;
pub use registry::*;
pub use reporter::*;
pub use sink::*;
