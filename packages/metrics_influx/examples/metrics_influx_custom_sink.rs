//! Reports metrics to standard output instead of a database, using a custom sink.

use std::sync::Arc;
use std::time::Duration;

use metrics_influx::{
    LineProtocol, Metric, MetricsRegistry, Point, Precision, Reporter, ReporterConfig, Sink,
    SinkError, SinkOptions, StandardCounter,
};
use tokio_util::sync::CancellationToken;

/// Prints every batch in line protocol.
#[derive(Debug)]
struct StdoutSink {
    precision: Precision,
}

impl Sink for StdoutSink {
    async fn write(&mut self, batch: Vec<Point>) -> Result<(), SinkError> {
        print!("{}", LineProtocol::new(&batch, self.precision));
        Ok(())
    }

    async fn close(self) {
        println!("# done");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MetricsRegistry::new());

    let requests = Arc::new(StandardCounter::new());
    registry.register(
        "requests,endpoint=home",
        Metric::Counter(Arc::<StandardCounter>::clone(&requests)),
    )?;

    let mut config = ReporterConfig::new("http://localhost:8086", "unused", "unused");
    config.interval = Duration::from_secs(1);

    let cancellation = CancellationToken::new();
    let reporter = Reporter::new(registry, config)?;
    let reporting = tokio::spawn(reporter.run_with(
        |options: &SinkOptions| {
            Ok(StdoutSink {
                precision: options.precision,
            })
        },
        cancellation.clone(),
    ));

    for _ in 0..5 {
        requests.inc(3);
        tokio::time::sleep(Duration::from_millis(1100)).await;
    }

    cancellation.cancel();
    reporting.await??;

    Ok(())
}
