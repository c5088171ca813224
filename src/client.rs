use crate::config::ClsConfig;
use crate::record::{ClsLog, SendResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Receives the asynchronous outcome of a log delivery.
///
/// The producer invokes exactly one of the two methods per enqueued log,
/// from its own worker threads, once batching and retries are done.
pub trait SendCallback: Send + Sync {
    fn success(&self, result: &SendResult);
    fn fail(&self, result: &SendResult);
}

/// Asynchronous CLS producer client.
///
/// Implementations own batching, buffering, retry with backoff and
/// transport. The writer only calls [`send_log`](ProducerClient::send_log)
/// from the logging thread, so it must not block beyond the configured
/// `max_block_sec`.
#[async_trait]
pub trait ProducerClient: Send + Sync {
    /// Start background workers. Called once right after construction.
    fn start(&self) {}

    /// Enqueue a single log for `topic_id`.
    ///
    /// **Returns**
    /// - `Ok(())` once the log is buffered; delivery is reported later
    ///   through `callback`.
    /// - `Err(..)` if the log could not be buffered (buffer full past the
    ///   blocking window, client closed, ...). The callback is not invoked.
    fn send_log(
        &self,
        topic_id: &str,
        log: ClsLog,
        callback: Arc<dyn SendCallback>,
    ) -> Result<(), ProducerError>;

    /// Flush buffered logs and stop workers.
    ///
    /// Default implementation is a no-op.
    async fn close(&self) -> Result<(), ProducerError> {
        Ok(())
    }
}

/// Builds a [`ProducerClient`] from the pass-through [`ProducerConfig`].
pub trait ProducerFactory: Send + Sync {
    fn create(&self, config: ProducerConfig) -> Result<Arc<dyn ProducerClient>, ProducerError>;
}

impl<F> ProducerFactory for F
where
    F: Fn(ProducerConfig) -> Result<Arc<dyn ProducerClient>, ProducerError> + Send + Sync,
{
    fn create(&self, config: ProducerConfig) -> Result<Arc<dyn ProducerClient>, ProducerError> {
        self(config)
    }
}

/// Error type reported by producer clients.
#[derive(thiserror::Error, Debug)]
pub enum ProducerError {
    #[error("over producer set maximum blocking time ({max_block:?})")]
    BufferFull { max_block: Duration },

    #[error("producer is closed")]
    Closed,

    #[error("invalid producer config: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

pub const DEFAULT_TOTAL_SIZE_LN_BYTES: i64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_SEND_WORKER_COUNT: i64 = 50;
pub const DEFAULT_MAX_BATCH_SIZE: i64 = 512 * 1024;
pub const MAX_BATCH_SIZE_LIMIT: i64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_BATCH_COUNT: i64 = 4096;
pub const MAX_BATCH_COUNT_LIMIT: i64 = 40960;
pub const DEFAULT_LINGER_MS: i64 = 2000;
pub const MIN_LINGER_MS: i64 = 100;
pub const DEFAULT_RETRIES: i64 = 10;
pub const DEFAULT_MAX_RESERVED_ATTEMPTS: i64 = 11;
pub const DEFAULT_BASE_RETRY_BACKOFF_MS: i64 = 100;
pub const DEFAULT_MAX_RETRY_BACKOFF_MS: i64 = 50_000;
pub const DEFAULT_TIMEOUT_MS: i64 = 10_000;
pub const DEFAULT_IDLE_CONN: i64 = 50;

/// Construction parameters handed verbatim to the producer.
///
/// Only defaults and documented bounds are applied here; how the values
/// drive batching and retries is up to the client.
#[derive(Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub total_size_ln_bytes: i64,
    pub max_send_worker_count: i64,
    /// Seconds `send_log` may block when the buffer is full. Zero means
    /// fail immediately.
    pub max_block_sec: i64,
    pub max_batch_size: i64,
    pub max_batch_count: i64,
    pub linger_ms: i64,
    pub retries: i64,
    pub max_reserved_attempts: i64,
    pub base_retry_backoff_ms: i64,
    pub max_retry_backoff_ms: i64,
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub source: String,
    pub timeout_ms: i64,
    pub idle_conn: i64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            total_size_ln_bytes: DEFAULT_TOTAL_SIZE_LN_BYTES,
            max_send_worker_count: DEFAULT_MAX_SEND_WORKER_COUNT,
            max_block_sec: 0,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            linger_ms: DEFAULT_LINGER_MS,
            retries: DEFAULT_RETRIES,
            max_reserved_attempts: DEFAULT_MAX_RESERVED_ATTEMPTS,
            base_retry_backoff_ms: DEFAULT_BASE_RETRY_BACKOFF_MS,
            max_retry_backoff_ms: DEFAULT_MAX_RETRY_BACKOFF_MS,
            endpoint: String::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            source: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            idle_conn: DEFAULT_IDLE_CONN,
        }
    }
}

impl ProducerConfig {
    /// Map a decoded [`ClsConfig`] onto producer parameters.
    ///
    /// Unset knobs take the producer defaults; out-of-range values are
    /// clamped to the documented bounds.
    pub fn from_cls(cfg: &ClsConfig) -> Self {
        let d = ProducerConfig::default();
        ProducerConfig {
            total_size_ln_bytes: positive_or(cfg.total_size_ln_bytes, d.total_size_ln_bytes),
            max_send_worker_count: positive_or(cfg.max_send_worker_count, d.max_send_worker_count),
            max_block_sec: cfg.max_block_sec.unwrap_or(d.max_block_sec).max(0),
            max_batch_size: positive_or(cfg.max_batch_size, d.max_batch_size)
                .min(MAX_BATCH_SIZE_LIMIT),
            max_batch_count: positive_or(cfg.max_batch_count, d.max_batch_count)
                .min(MAX_BATCH_COUNT_LIMIT),
            linger_ms: positive_or(cfg.linger_ms, d.linger_ms).max(MIN_LINGER_MS),
            retries: cfg.retries.unwrap_or(d.retries).max(0),
            max_reserved_attempts: positive_or(cfg.max_reserved_attempts, d.max_reserved_attempts),
            base_retry_backoff_ms: positive_or(cfg.base_retry_backoff_ms, d.base_retry_backoff_ms),
            max_retry_backoff_ms: positive_or(cfg.max_retry_backoff_ms, d.max_retry_backoff_ms),
            endpoint: cfg.host.clone(),
            access_key_id: cfg.secret_id.clone(),
            access_key_secret: cfg.secret_key.clone(),
            source: cfg.source.clone(),
            ..d
        }
    }

    pub fn max_block(&self) -> Duration {
        Duration::from_secs(self.max_block_sec.max(0) as u64)
    }
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

impl fmt::Debug for ProducerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerConfig")
            .field("total_size_ln_bytes", &self.total_size_ln_bytes)
            .field("max_send_worker_count", &self.max_send_worker_count)
            .field("max_block_sec", &self.max_block_sec)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_batch_count", &self.max_batch_count)
            .field("linger_ms", &self.linger_ms)
            .field("retries", &self.retries)
            .field("max_reserved_attempts", &self.max_reserved_attempts)
            .field("base_retry_backoff_ms", &self.base_retry_backoff_ms)
            .field("max_retry_backoff_ms", &self.max_retry_backoff_ms)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("source", &self.source)
            .field("timeout_ms", &self.timeout_ms)
            .field("idle_conn", &self.idle_conn)
            .finish()
    }
}
