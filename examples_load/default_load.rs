use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_cls_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_cls_sink::noop::NoopProducer;

const OUTPUT: &str = r#"
writer: cls
level: error
remote_config:
  topic_id: load-test
  host: ap-guangzhou.cls.tencentcs.com
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let layer_config = LayerConfig {
        enable_stdout: false,
        close_timeout: Duration::from_secs(2),
    };
    let guard = init_tracing_with_config(OUTPUT, NoopProducer::factory, layer_config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s), metrics {:?}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        guard.logger().metrics().snapshot(),
    );

    guard.shutdown().await?;
    Ok(())
}
