use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_cls_sink::config::ClsConfig;
use tracing_cls_sink::format::ClsEventFormat;
use tracing_cls_sink::noop::NoopProducer;
use tracing_cls_sink::writer::{report_field, ClsLogger, FieldMapper};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClsConfig {
        topic_id: "load-test".to_string(),
        host: "ap-guangzhou.cls.tencentcs.com".to_string(),
        field_map: [("Msg".to_string(), "message".to_string())].into(),
        ..ClsConfig::default()
    };

    // Drop the caller key to shrink every record.
    let mapper: FieldMapper = Arc::new(|field: &str, cfg: &ClsConfig| {
        if field == "Caller" {
            None
        } else {
            report_field(field, cfg)
        }
    });

    let producer = Arc::new(NoopProducer::new());
    let logger = ClsLogger::builder(config, producer.clone())
        .field_mapper(mapper)
        .time_format("%Y-%m-%dT%H:%M:%S%.6f")
        .build();

    let layer = tracing_subscriber::fmt::layer()
        .event_format(ClsEventFormat::new("%Y-%m-%dT%H:%M:%S%.6f"))
        .with_writer(logger.clone());
    tracing::subscriber::set_global_default(Registry::default().with(layer))?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s), accepted {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        producer.accepted(),
    );

    logger.close(Duration::from_secs(2)).await?;
    Ok(())
}
