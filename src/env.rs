//! Environment variable names used by this crate.
//!
//! These are purely helpers; the writer itself never reads the
//! environment outside of config decoding.

/// Prefix of variables that override `remote_config` keys, e.g.
/// `LOG_SINK_CLS_SECRET_KEY` overrides `secret_key`.
pub const CLS_ENV_PREFIX: &str = "LOG_SINK_CLS_";

/// Host IP used as the default log source.
pub const LOG_SINK_LOCAL_IP_ENV: &str = "LOG_SINK_LOCAL_IP";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
