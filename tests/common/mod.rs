#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_cls_sink::client::{
    ProducerClient, ProducerConfig, ProducerError, ProducerFactory, SendCallback,
};
use tracing_cls_sink::record::{ClsLog, SendResult};

/// Producer that keeps every log and reports a fixed delivery outcome.
#[derive(Default)]
pub struct RecordingProducer {
    pub logs: Mutex<Vec<(String, ClsLog)>>,
    pub config: Mutex<Option<ProducerConfig>>,
    pub started: AtomicBool,
    pub closed: AtomicBool,
    pub fail_delivery: bool,
}

impl RecordingProducer {
    pub fn delivering() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_delivery: true,
            ..Self::default()
        })
    }

    pub fn contents(&self) -> Vec<ClsLog> {
        self.logs.lock().iter().map(|(_, log)| log.clone()).collect()
    }
}

#[async_trait]
impl ProducerClient for RecordingProducer {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn send_log(
        &self,
        topic_id: &str,
        log: ClsLog,
        callback: Arc<dyn SendCallback>,
    ) -> Result<(), ProducerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProducerError::Closed);
        }
        self.logs.lock().push((topic_id.to_string(), log));
        if self.fail_delivery {
            callback.fail(&SendResult::failure("Unauthorized", "signature mismatch"));
        } else {
            callback.success(&SendResult::success());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn factory_for(producer: Arc<RecordingProducer>) -> impl ProducerFactory {
    move |cfg: ProducerConfig| -> Result<Arc<dyn ProducerClient>, ProducerError> {
        *producer.config.lock() = Some(cfg);
        Ok(Arc::clone(&producer) as Arc<dyn ProducerClient>)
    }
}

pub const OUTPUT: &str = r#"
writer: cls
level: info
formatter_config:
  time_fmt: "%Y-%m-%d %H:%M:%S%.3f"
remote_config:
  topic_id: topic-1
  host: ap-guangzhou.cls.tencentcs.com
  secret_id: "11"
  secret_key: "11"
  source: 10.1.1.1
  max_block_sec: 0
  field_map:
    Msg: message
    Level: level
"#;
