pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod format;
pub mod init;
pub mod metrics;
pub mod noop;
pub mod plugin;
pub mod record;
pub mod writer;

pub use error::ClsError;
pub use plugin::{register, LoggerPlugin, PLUGIN_NAME, PLUGIN_TYPE};
pub use writer::ClsLogger;
