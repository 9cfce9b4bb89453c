//! Reports a few instruments to an InfluxDB instance on `localhost` for half a minute.
//!
//! Start a database first, e.g. `docker run -p 8086:8086 influxdb:2`, complete its setup and
//! put the resulting token, organization and bucket into the constants below.

use std::sync::Arc;
use std::time::Duration;

use metrics_influx::{
    Metric, MetricsRegistry, Reporter, ReporterConfig, StandardCounter, StandardGaugeFloat,
    WriteMode,
};
use tokio_util::sync::CancellationToken;

const URL: &str = "http://localhost:8086";
const TOKEN: &str = "my-token";
const ORG: &str = "my-org";
const BUCKET: &str = "my-bucket";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MetricsRegistry::new());

    let bagels_cooked = Arc::new(StandardCounter::new());
    let oven_temperature = Arc::new(StandardGaugeFloat::new());

    // Tags can be embedded in the metric name.
    registry.register(
        "bagels_cooked,oven=1",
        Metric::Counter(Arc::<StandardCounter>::clone(&bagels_cooked)),
    )?;
    registry.register(
        "oven_temperature,oven=1",
        Metric::GaugeFloat(Arc::<StandardGaugeFloat>::clone(&oven_temperature)),
    )?;

    let mut config = ReporterConfig::new(URL, TOKEN, BUCKET);
    config.org = Some(ORG.to_owned());
    config.interval = Duration::from_secs(5);
    config.write_mode = WriteMode::Background;
    config.tags.insert("bakery".to_owned(), "downtown".to_owned());
    config.logger = tracing::Dispatch::new(tracing_subscriber::fmt().finish());

    let cancellation = CancellationToken::new();
    let reporting = tokio::spawn(Reporter::new(registry, config)?.run(cancellation.clone()));

    for batch in 1..=30 {
        bagels_cooked.inc(12);
        oven_temperature.update(220.0 + f64::from(batch % 5));

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    cancellation.cancel();
    reporting.await??;

    Ok(())
}
