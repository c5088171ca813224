//! Configuration decoded from the host logging config.
//!
//! A writer output looks like:
//!
//! ```yaml
//! writer: cls
//! level: info
//! formatter_config:
//!   time_fmt: "%Y-%m-%d %H:%M:%S%.3f"
//! remote_config:
//!   topic_id: 0f8e...
//!   host: ap-guangzhou.cls.tencentcs.com
//!   secret_id: AKID...
//!   secret_key: ...
//!   field_map:
//!     Msg: message
//! ```
//!
//! Values under `remote_config` can be overridden from the environment with
//! the [`CLS_ENV_PREFIX`](crate::env::CLS_ENV_PREFIX) prefix, e.g.
//! `LOG_SINK_CLS_SECRET_KEY`.

use crate::env::{env_or, CLS_ENV_PREFIX, LOG_SINK_LOCAL_IP_ENV};
use crate::error::ClsError;
use figment::providers::{Env, Serialized};
use figment::value::Value;
use figment::Figment;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use tracing::level_filters::LevelFilter;

/// Source reported when neither the config nor the host exposes one.
pub const SOURCE_DEFAULT: &str = "default_source";

/// Timestamp layout used by the line encoder when `time_fmt` is unset.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Settings of the CLS writer, taken from `remote_config`.
///
/// Tuning knobs left unset fall back to the producer defaults, see
/// [`ProducerConfig::from_cls`](crate::client::ProducerConfig::from_cls).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClsConfig {
    /// Log topic the records are reported to.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub topic_id: String,
    /// CLS endpoint, e.g. `ap-guangzhou.cls.tencentcs.com`.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub host: String,
    /// Cloud API secret id.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub secret_id: String,
    /// Cloud API secret key.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub secret_key: String,
    /// Upper bound of bytes the producer may buffer. Default 100MB.
    pub total_size_ln_bytes: Option<i64>,
    /// Maximum concurrent send workers. Default 50.
    pub max_send_worker_count: Option<i64>,
    /// Seconds `send` may block on a full buffer. Default 0 (non-blocking).
    pub max_block_sec: Option<i64>,
    /// Batch byte size that triggers a send. Default 512KB, at most 5MB.
    pub max_batch_size: Option<i64>,
    /// Batch log count that triggers a send. Default 4096, at most 40960.
    pub max_batch_count: Option<i64>,
    /// How long a batch lingers before it is sent. Default 2000, at least 100.
    pub linger_ms: Option<i64>,
    /// Retries after the first failed send of a batch. Default 10.
    pub retries: Option<i64>,
    /// Attempts kept per batch for the callback. Default 11.
    pub max_reserved_attempts: Option<i64>,
    /// Backoff before the first retry; doubles on each retry. Default 100.
    pub base_retry_backoff_ms: Option<i64>,
    /// Backoff ceiling. Default 50000.
    pub max_retry_backoff_ms: Option<i64>,
    /// Rename table applied to log keys before reporting.
    pub field_map: HashMap<String, String>,
    /// Log source, typically the machine IP.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub source: String,
}

/// Accept unquoted scalars (`secret_id: 11`, or a numeric env override)
/// for string keys.
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, found {other}"
        ))),
    }
}

impl ClsConfig {
    /// Decode a `remote_config` value, layering environment overrides on top.
    pub fn from_remote(remote: &Value) -> Result<Self, ClsError> {
        let cfg = Figment::from(Serialized::defaults(remote))
            .merge(Env::prefixed(CLS_ENV_PREFIX))
            .extract::<ClsConfig>()?;
        Ok(cfg)
    }

    /// Fill `source` from the host when it is not configured.
    ///
    /// Order: configured value, host local IP, first service IP,
    /// [`SOURCE_DEFAULT`].
    pub fn with_source_default(&mut self, global: &GlobalConfig) {
        if self.source.is_empty() {
            if let Some(ip) = global.local_ip.as_deref() {
                self.source = ip.to_string();
            }
        }
        if self.source.is_empty() {
            if let Some(ip) = global.service_ips.iter().find(|ip| !ip.is_empty()) {
                self.source = ip.clone();
            }
        }
        if self.source.is_empty() {
            self.source = SOURCE_DEFAULT.to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ClsError> {
        if self.topic_id.is_empty() {
            return Err(ClsError::Config("topic_id is required".to_string()));
        }
        if self.host.is_empty() {
            return Err(ClsError::Config("host is required".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ClsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClsConfig")
            .field("topic_id", &self.topic_id)
            .field("host", &self.host)
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("field_map", &self.field_map)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Formatter settings of a writer output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// chrono `strftime` layout of the `Time` key.
    pub time_fmt: String,
}

impl FormatConfig {
    pub fn time_format(&self) -> &str {
        if self.time_fmt.is_empty() {
            DEFAULT_TIME_FORMAT
        } else {
            &self.time_fmt
        }
    }
}

/// One writer output of the host logging config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub writer: String,
    pub level: String,
    pub formatter_config: FormatConfig,
    /// Writer-specific section, decoded by the plugin itself.
    pub remote_config: Option<Value>,
}

impl OutputConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ClsError> {
        parse_level(&self.level)
    }
}

/// Parse a host level name. Empty means `debug`; `fatal` maps to `ERROR`.
pub fn parse_level(level: &str) -> Result<LevelFilter, ClsError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "" | "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "fatal" => Ok(LevelFilter::ERROR),
        other => Err(ClsError::Config(format!("unknown log level: {other}"))),
    }
}

/// Host-wide settings the writer consults for defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    pub local_ip: Option<String>,
    pub service_ips: Vec<String>,
}

impl GlobalConfig {
    pub fn from_env() -> Self {
        let local_ip = env_or(LOG_SINK_LOCAL_IP_ENV, "");
        GlobalConfig {
            local_ip: (!local_ip.is_empty()).then_some(local_ip),
            service_ips: Vec::new(),
        }
    }
}

static GLOBAL_CONFIG: Lazy<RwLock<GlobalConfig>> =
    Lazy::new(|| RwLock::new(GlobalConfig::from_env()));

/// Replace the process-wide host settings.
pub fn set_global_config(cfg: GlobalConfig) {
    *GLOBAL_CONFIG.write() = cfg;
}

/// Snapshot of the process-wide host settings.
pub fn global_config() -> GlobalConfig {
    GLOBAL_CONFIG.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::{Format, Yaml};

    fn remote(yaml: &str) -> Value {
        Figment::from(Yaml::string(yaml))
            .extract::<Value>()
            .expect("yaml value")
    }

    #[test]
    fn decodes_remote_config() {
        let cfg = ClsConfig::from_remote(&remote(
            r#"
topic_id: topic-1
host: ap-guangzhou.cls.tencentcs.com
secret_id: id
secret_key: key
max_batch_count: 100
field_map:
  Level: level
"#,
        ))
        .unwrap();
        assert_eq!(cfg.topic_id, "topic-1");
        assert_eq!(cfg.max_batch_count, Some(100));
        assert_eq!(cfg.linger_ms, None);
        assert_eq!(cfg.field_map.get("Level").map(String::as_str), Some("level"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_remote_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LOG_SINK_CLS_SECRET_KEY", "from-env");
            let cfg = ClsConfig::from_remote(&remote("topic_id: t\nhost: h\nsecret_key: from-yaml\n"))
                .expect("decode");
            assert_eq!(cfg.secret_key, "from-env");
            Ok(())
        });
    }

    #[test]
    fn unquoted_numbers_decode_as_strings() {
        let cfg = ClsConfig::from_remote(&remote(
            "topic_id: 1001\nhost: h\nsecret_id: 11\nsecret_key: 11\nsource: 10\n",
        ))
        .expect("decode");
        assert_eq!(cfg.topic_id, "1001");
        assert_eq!(cfg.secret_id, "11");
        assert_eq!(cfg.secret_key, "11");
        assert_eq!(cfg.source, "10");

        let err = ClsConfig::from_remote(&remote("topic_id: [1, 2]\nhost: h\n")).unwrap_err();
        assert!(matches!(err, ClsError::Decode(_)));
    }

    #[test]
    fn numeric_env_override_decodes_as_string() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LOG_SINK_CLS_SECRET_ID", "12345");
            let cfg = ClsConfig::from_remote(&remote("topic_id: t\nhost: h\nsecret_id: yaml\n"))
                .expect("decode");
            assert_eq!(cfg.secret_id, "12345");
            Ok(())
        });
    }

    #[test]
    fn scalar_remote_config_is_rejected() {
        let err = ClsConfig::from_remote(&Value::from("nope".to_string())).unwrap_err();
        assert!(matches!(err, ClsError::Decode(_)));
    }

    #[test]
    fn missing_topic_or_host_fails_validation() {
        let cfg = ClsConfig {
            host: "h".to_string(),
            ..ClsConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ClsError::Config(_))));

        let cfg = ClsConfig {
            topic_id: "t".to_string(),
            ..ClsConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ClsError::Config(_))));
    }

    #[test]
    fn source_default_order() {
        let mut cfg = ClsConfig {
            source: "configured".to_string(),
            ..ClsConfig::default()
        };
        cfg.with_source_default(&GlobalConfig {
            local_ip: Some("10.0.0.1".to_string()),
            service_ips: vec![],
        });
        assert_eq!(cfg.source, "configured");

        let mut cfg = ClsConfig::default();
        cfg.with_source_default(&GlobalConfig {
            local_ip: Some("10.0.0.1".to_string()),
            service_ips: vec!["10.0.0.2".to_string()],
        });
        assert_eq!(cfg.source, "10.0.0.1");

        let mut cfg = ClsConfig::default();
        cfg.with_source_default(&GlobalConfig {
            local_ip: None,
            service_ips: vec!["".to_string(), "10.0.0.2".to_string()],
        });
        assert_eq!(cfg.source, "10.0.0.2");

        let mut cfg = ClsConfig::default();
        cfg.with_source_default(&GlobalConfig::default());
        assert_eq!(cfg.source, SOURCE_DEFAULT);
    }

    #[test]
    fn level_names() {
        assert_eq!(parse_level("").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("fatal").unwrap(), LevelFilter::ERROR);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn debug_hides_secret_key() {
        let cfg = ClsConfig {
            secret_key: "hunter2".to_string(),
            ..ClsConfig::default()
        };
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
