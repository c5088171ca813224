use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records rejected by the producer because its buffer was full.
pub const METRICS_BUFFER_FULL: &str = "cls.BufferFull";
/// Batches the producer gave up on.
pub const METRICS_SEND_FAIL: &str = "cls.SendFail";
/// Batches the producer delivered.
pub const METRICS_SEND_SUCCESS: &str = "cls.SendSuccess";

/// Counters shared by a writer and its delivery callback.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    buffer_full: AtomicU64,
    send_fail: AtomicU64,
    send_success: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            buffer_full: AtomicU64::new(0),
            send_fail: AtomicU64::new(0),
            send_success: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_buffer_full(&self) -> u64 {
        self.buffer_full.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_send_fail(&self) -> u64 {
        self.send_fail.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_send_success(&self) -> u64 {
        self.send_success.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn buffer_full(&self) -> u64 {
        self.buffer_full.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn send_fail(&self) -> u64 {
        self.send_fail.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn send_success(&self) -> u64 {
        self.send_success.load(Ordering::Relaxed)
    }

    /// Current values keyed by metric name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            (METRICS_BUFFER_FULL, self.buffer_full()),
            (METRICS_SEND_FAIL, self.send_fail()),
            (METRICS_SEND_SUCCESS, self.send_success()),
        ])
    }
}
