use crate::client::ProducerFactory;
use crate::error::ClsError;
use crate::plugin::{get_writer, LogDecoder, LoggerPlugin, WriterPlugin, PLUGIN_NAME};
use crate::writer::ClsLogger;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Subscriber-level settings that are not part of the writer config.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a plain `tracing_subscriber::fmt` layer is
///   stacked next to the CLS layer so events are also printed locally.
/// - `close_timeout`: how long [`ClsGuard::shutdown`] waits for the
///   producer to flush.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
    pub close_timeout: Duration,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Keeps the CLS writer reachable after the subscriber is installed.
#[derive(Debug)]
pub struct ClsGuard {
    logger: ClsLogger,
    close_timeout: Duration,
}

impl ClsGuard {
    pub fn logger(&self) -> &ClsLogger {
        &self.logger
    }

    /// Flush and stop the producer.
    pub async fn shutdown(self) -> Result<(), ClsError> {
        let res = self.logger.close(self.close_timeout).await;
        if let Err(e) = &res {
            tracing::warn!(error = %e, "cls producer did not shut down cleanly");
        }
        res
    }
}

/// Build a subscriber whose CLS layer is configured from one YAML writer
/// output, without installing it.
///
/// **Parameters**
/// - `yaml`: the writer output (`writer`, `level`, `formatter_config`,
///   `remote_config`).
/// - `factory`: builds the producer client from the decoded config.
/// - `config`: [`LayerConfig`] controlling the extra stdout layer and
///   shutdown timeout.
///
/// The writer named by the output (no writer means [`PLUGIN_NAME`]) is
/// looked up in the plugin registry first, so a plugin installed with
/// [`register`](crate::plugin::register) keeps its own factory and field
/// mapper. When nothing is registered under [`PLUGIN_NAME`], a
/// [`LoggerPlugin`] is built from `factory`.
pub fn build_subscriber(
    yaml: &str,
    factory: impl ProducerFactory + 'static,
    config: LayerConfig,
) -> Result<(impl Subscriber + Send + Sync + 'static, ClsGuard), ClsError> {
    let mut decoder = LogDecoder::from_yaml(yaml);
    let output = decoder.decode()?;
    let writer = if output.writer.is_empty() {
        PLUGIN_NAME
    } else {
        output.writer.as_str()
    };
    let plugin: Arc<dyn WriterPlugin> = match get_writer(writer) {
        Some(plugin) => plugin,
        None if writer == PLUGIN_NAME => Arc::new(LoggerPlugin::new(factory)),
        None => {
            return Err(ClsError::Config(format!(
                "log writer not registered: {writer}"
            )))
        }
    };
    plugin.setup(writer, Some(&mut decoder))?;

    let (layer, logger) = match (decoder.layer.take(), decoder.logger.take()) {
        (Some(layer), Some(logger)) => (layer, logger),
        _ => {
            return Err(ClsError::Config(format!(
                "writer {writer} did not produce a cls layer"
            )))
        }
    };

    let fmt_layer = config.enable_stdout.then(tracing_subscriber::fmt::layer);
    let subscriber = Registry::default().with(layer).with(fmt_layer);
    let guard = ClsGuard {
        logger,
        close_timeout: config.close_timeout,
    };
    Ok((subscriber, guard))
}

/// Install the CLS writer as the global `tracing` subscriber.
///
/// **Effects**
///
/// All `tracing` events in the process at or above the configured level are
/// encoded, remapped and handed to the producer. Keep the returned guard and
/// call [`ClsGuard::shutdown`] before exit.
pub fn init_tracing_with_config(
    yaml: &str,
    factory: impl ProducerFactory + 'static,
    config: LayerConfig,
) -> Result<ClsGuard, ClsError> {
    let (subscriber, guard) = build_subscriber(yaml, factory, config)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ClsError::Subscriber(e.to_string()))?;
    Ok(guard)
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(
    yaml: &str,
    factory: impl ProducerFactory + 'static,
) -> Result<ClsGuard, ClsError> {
    init_tracing_with_config(yaml, factory, LayerConfig::default())
}
