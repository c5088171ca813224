mod common;

use common::{factory_for, RecordingProducer, OUTPUT};
use tokio::time::Duration;
use tracing::error;
use tracing_cls_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_cls_sink::ClsError;

// Only one global subscriber can be installed per process, so this file
// holds a single test.
#[tokio::test]
async fn installs_global_subscriber_once() {
    let producer = RecordingProducer::delivering();
    let config = LayerConfig {
        enable_stdout: true,
        close_timeout: Duration::from_secs(1),
    };
    let guard = init_tracing_with_config(OUTPUT, factory_for(producer.clone()), config.clone()).unwrap();

    error!(order_id = "o-1", "payment declined");

    let logs = producer.contents();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].contents["message"], "payment declined");
    assert_eq!(logs[0].contents["level"], "ERROR");
    assert_eq!(logs[0].contents["order_id"], "o-1");

    let second = init_tracing_with_config(OUTPUT, factory_for(RecordingProducer::delivering()), config);
    assert!(matches!(second, Err(ClsError::Subscriber(_))));

    guard.shutdown().await.unwrap();
}
