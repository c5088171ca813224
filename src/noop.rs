use crate::client::{ProducerClient, ProducerConfig, ProducerError, SendCallback};
use crate::record::{ClsLog, SendResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A producer that accepts every log and reports it delivered right away.
///
/// Useful for measuring the overhead of encoding and remapping without any
/// network I/O, and for wiring tests that don't care about delivery.
#[derive(Debug, Default)]
pub struct NoopProducer {
    accepted: AtomicU64,
    closed: AtomicBool,
}

impl NoopProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory function usable wherever a
    /// [`ProducerFactory`](crate::client::ProducerFactory) is expected.
    pub fn factory(_config: ProducerConfig) -> Result<Arc<dyn ProducerClient>, ProducerError> {
        Ok(Arc::new(NoopProducer::new()))
    }

    /// Number of logs accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ProducerClient for NoopProducer {
    fn send_log(
        &self,
        _topic_id: &str,
        _log: ClsLog,
        callback: Arc<dyn SendCallback>,
    ) -> Result<(), ProducerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProducerError::Closed);
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        callback.success(&SendResult::success());
        Ok(())
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
