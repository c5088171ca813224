use crate::client::{ProducerClient, ProducerError, SendCallback};
use crate::config::{ClsConfig, DEFAULT_TIME_FORMAT};
use crate::error::ClsError;
use crate::format::TIME_KEY;
use crate::metrics::SinkMetrics;
use crate::record::{ClsLog, SendResult};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Layout of the `Time` key accepted regardless of the configured format.
/// A fractional second after the seconds field is optional.
pub const LOG_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Decides under which key a log field is reported, or drops it with `None`.
pub type FieldMapper = Arc<dyn Fn(&str, &ClsConfig) -> Option<String> + Send + Sync>;

/// Default field mapping: rename through `field_map`, otherwise keep the
/// source name. Never drops a field.
pub fn report_field(source_field: &str, cfg: &ClsConfig) -> Option<String> {
    match cfg.field_map.get(source_field) {
        Some(mapped) => Some(mapped.clone()),
        None => Some(source_field.to_string()),
    }
}

/// Write adapter between the line encoder and the CLS producer.
///
/// Each write is one JSON object line. Keys are remapped, the `Time` key
/// becomes the record timestamp, and the record is enqueued on the
/// producer. Cloning is cheap; all clones share the producer and metrics.
#[derive(Clone)]
pub struct ClsLogger {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClsConfig,
    client: Arc<dyn ProducerClient>,
    callback: Arc<DeliveryCallback>,
    metrics: Arc<SinkMetrics>,
    field_mapper: FieldMapper,
    time_format: String,
}

impl ClsLogger {
    pub fn new(config: ClsConfig, client: Arc<dyn ProducerClient>) -> Self {
        Self::builder(config, client).build()
    }

    pub fn builder(config: ClsConfig, client: Arc<dyn ProducerClient>) -> ClsLoggerBuilder {
        ClsLoggerBuilder {
            config,
            client,
            metrics: None,
            field_mapper: None,
            time_format: None,
        }
    }

    pub fn config(&self) -> &ClsConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.inner.metrics
    }

    /// Forward one encoded log line.
    ///
    /// **Returns**
    /// - `Ok(0)` for empty input; nothing is sent.
    /// - `Ok(line.len())` when the record was enqueued, or when the line is
    ///   an empty object.
    /// - `Err(ClsError::Json)` when the line is not a JSON object.
    /// - `Err(ClsError::Enqueue)` when the producer refused the record; the
    ///   `cls.BufferFull` counter is incremented.
    pub fn write_line(&self, line: &[u8]) -> Result<usize, ClsError> {
        if line.is_empty() {
            return Ok(0);
        }
        let body: Map<String, Value> = serde_json::from_slice(line)?;
        if body.is_empty() {
            return Ok(line.len());
        }

        let inner = &*self.inner;
        let mut contents = BTreeMap::new();
        let mut log_time = None;
        for (key, value) in body {
            let value = value_to_string(value);
            if key == TIME_KEY {
                log_time = parse_log_time(&value, &inner.time_format);
            }
            if let Some(report_key) = (inner.field_mapper)(&key, &inner.config) {
                contents.insert(report_key, value);
            }
        }

        let time = log_time.unwrap_or_else(Utc::now);
        let log = ClsLog::new(time.timestamp_nanos_opt().unwrap_or_default(), contents);
        let callback: Arc<dyn SendCallback> = inner.callback.clone();
        if let Err(e) = inner.client.send_log(&inner.config.topic_id, log, callback) {
            inner.metrics.record_buffer_full();
            return Err(ClsError::Enqueue(e));
        }

        Ok(line.len())
    }

    /// Ask the producer to flush and stop, waiting at most `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<(), ClsError> {
        match tokio::time::timeout(timeout, self.inner.client.close()).await {
            Ok(res) => res.map_err(ClsError::Producer),
            Err(_) => Err(ClsError::Producer(ProducerError::Other(format!(
                "close timed out after {:?}",
                timeout
            )))),
        }
    }
}

impl fmt::Debug for ClsLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClsLogger")
            .field("config", &self.inner.config)
            .field("metrics", &self.inner.metrics)
            .field("time_format", &self.inner.time_format)
            .finish_non_exhaustive()
    }
}

impl io::Write for &ClsLogger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_line(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for ClsLogger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_line(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for ClsLogger {
    type Writer = &'a ClsLogger;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Builder for [`ClsLogger`].
pub struct ClsLoggerBuilder {
    config: ClsConfig,
    client: Arc<dyn ProducerClient>,
    metrics: Option<Arc<SinkMetrics>>,
    field_mapper: Option<FieldMapper>,
    time_format: Option<String>,
}

impl ClsLoggerBuilder {
    /// Share counters with another owner, e.g. a metrics exporter.
    pub fn metrics(mut self, metrics: Arc<SinkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace [`report_field`] with a custom mapping.
    pub fn field_mapper(mut self, mapper: FieldMapper) -> Self {
        self.field_mapper = Some(mapper);
        self
    }

    /// Layout the encoder writes `Time` with; tried before [`LOG_TIME_LAYOUT`].
    pub fn time_format(mut self, layout: impl Into<String>) -> Self {
        self.time_format = Some(layout.into());
        self
    }

    pub fn build(self) -> ClsLogger {
        let metrics = self.metrics.unwrap_or_default();
        let callback = Arc::new(DeliveryCallback::new(Arc::clone(&metrics)));
        ClsLogger {
            inner: Arc::new(Inner {
                config: self.config,
                client: self.client,
                callback,
                metrics,
                field_mapper: self.field_mapper.unwrap_or_else(|| Arc::new(report_field) as FieldMapper),
                time_format: self
                    .time_format
                    .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string()),
            }),
        }
    }
}

/// Delivery callback that only counts outcomes.
#[derive(Debug, Clone)]
pub struct DeliveryCallback {
    metrics: Arc<SinkMetrics>,
}

impl DeliveryCallback {
    pub fn new(metrics: Arc<SinkMetrics>) -> Self {
        Self { metrics }
    }
}

impl SendCallback for DeliveryCallback {
    fn success(&self, _result: &SendResult) {
        self.metrics.record_send_success();
    }

    fn fail(&self, _result: &SendResult) {
        self.metrics.record_send_fail();
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a `Time` value: `layout` first, then [`LOG_TIME_LAYOUT`], then
/// RFC 3339. Naive times are taken as local time.
pub fn parse_log_time(value: &str, layout: &str) -> Option<DateTime<Utc>> {
    [layout, LOG_TIME_LAYOUT]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}
