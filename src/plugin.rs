use crate::client::{ProducerConfig, ProducerFactory};
use crate::config::{global_config, ClsConfig, OutputConfig};
use crate::error::ClsError;
use crate::format::{validate_time_format, ClsEventFormat};
use crate::writer::{ClsLogger, FieldMapper};
use figment::providers::{Format, Yaml};
use figment::Figment;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, Registry};

/// Name the CLS writer is registered under.
pub const PLUGIN_NAME: &str = "cls";
/// Plugin category of log writers.
pub const PLUGIN_TYPE: &str = "log";

/// Layer produced by a writer plugin, ready to stack on a [`Registry`].
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Handed to a writer plugin during setup.
///
/// Carries the writer's output config in and the constructed layer,
/// level and logger handle out.
pub struct LogDecoder {
    figment: Figment,
    pub layer: Option<BoxedLayer>,
    pub level: Option<LevelFilter>,
    pub logger: Option<ClsLogger>,
}

impl LogDecoder {
    pub fn new(figment: Figment) -> Self {
        LogDecoder {
            figment,
            layer: None,
            level: None,
            logger: None,
        }
    }

    /// Decoder over one YAML writer output.
    pub fn from_yaml(yaml: &str) -> Self {
        Self::new(Figment::from(Yaml::string(yaml)))
    }

    pub fn decode(&self) -> Result<OutputConfig, ClsError> {
        Ok(self.figment.extract::<OutputConfig>()?)
    }
}

/// A log writer that can be selected by name from the host config.
pub trait WriterPlugin: Send + Sync {
    fn plugin_type(&self) -> &'static str;

    /// Decode the writer config and install the writer's layer into
    /// `decoder`.
    fn setup(&self, name: &str, decoder: Option<&mut LogDecoder>) -> Result<(), ClsError>;
}

static WRITERS: Lazy<RwLock<HashMap<String, Arc<dyn WriterPlugin>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a writer plugin under `name`, replacing any previous one.
pub fn register_writer(name: &str, plugin: Arc<dyn WriterPlugin>) {
    WRITERS.write().insert(name.to_string(), plugin);
}

/// Look up a registered writer plugin.
pub fn get_writer(name: &str) -> Option<Arc<dyn WriterPlugin>> {
    WRITERS.read().get(name).cloned()
}

/// Register the CLS writer under [`PLUGIN_NAME`], building producers with
/// `factory`.
pub fn register(factory: impl ProducerFactory + 'static) {
    register_writer(PLUGIN_NAME, Arc::new(LoggerPlugin::new(factory)));
}

/// CLS log writer plugin.
pub struct LoggerPlugin {
    factory: Arc<dyn ProducerFactory>,
    field_mapper: Option<FieldMapper>,
}

impl LoggerPlugin {
    pub fn new(factory: impl ProducerFactory + 'static) -> Self {
        LoggerPlugin {
            factory: Arc::new(factory),
            field_mapper: None,
        }
    }

    /// Override how log keys are reported, see
    /// [`report_field`](crate::writer::report_field).
    pub fn with_field_mapper(mut self, mapper: FieldMapper) -> Self {
        self.field_mapper = Some(mapper);
        self
    }

    /// Decode `remote_config`, build and start the producer, and wrap it in
    /// a [`ClsLogger`].
    pub fn setup_cls(&self, conf: &OutputConfig) -> Result<ClsLogger, ClsError> {
        let remote = conf
            .remote_config
            .as_ref()
            .ok_or_else(|| ClsError::Config("remote_config is missing".to_string()))?;
        let mut cls_config = ClsConfig::from_remote(remote)?;
        cls_config.with_source_default(&global_config());
        cls_config.validate()?;

        let client = self
            .factory
            .create(ProducerConfig::from_cls(&cls_config))
            .map_err(ClsError::Producer)?;
        client.start();

        let mut builder = ClsLogger::builder(cls_config, client)
            .time_format(conf.formatter_config.time_format());
        if let Some(mapper) = &self.field_mapper {
            builder = builder.field_mapper(Arc::clone(mapper));
        }
        Ok(builder.build())
    }
}

impl WriterPlugin for LoggerPlugin {
    fn plugin_type(&self) -> &'static str {
        PLUGIN_TYPE
    }

    fn setup(&self, name: &str, decoder: Option<&mut LogDecoder>) -> Result<(), ClsError> {
        let decoder = decoder.ok_or(ClsError::DecoderMissing)?;
        let conf = decoder.decode()?;
        let level = conf.level_filter()?;
        let time_format = conf.formatter_config.time_format().to_string();
        validate_time_format(&time_format)?;

        let logger = self.setup_cls(&conf)?;
        tracing::debug!(
            writer = name,
            topic_id = %logger.config().topic_id,
            host = %logger.config().host,
            source = %logger.config().source,
            level = %level,
            "cls log writer set up"
        );

        let layer: BoxedLayer = tracing_subscriber::fmt::layer()
            .event_format(ClsEventFormat::new(time_format))
            .with_writer(logger.clone())
            .with_filter(level)
            .boxed();

        decoder.layer = Some(layer);
        decoder.level = Some(level);
        decoder.logger = Some(logger);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ProducerClient, ProducerError};
    use crate::config::{set_global_config, GlobalConfig, SOURCE_DEFAULT};
    use crate::noop::NoopProducer;
    use parking_lot::Mutex;

    const OUTPUT: &str = r#"
writer: cls
level: info
remote_config:
  topic_id: topic-1
  host: ap-guangzhou.cls.tencentcs.com
  secret_id: "11"
  secret_key: "11"
  source: 10.1.1.1
  linger_ms: 500
"#;

    #[test]
    fn setup_without_decoder_fails() {
        let plugin = LoggerPlugin::new(NoopProducer::factory);
        assert!(matches!(plugin.setup("", None), Err(ClsError::DecoderMissing)));
        assert_eq!(plugin.plugin_type(), PLUGIN_TYPE);
    }

    #[test]
    fn setup_installs_layer() {
        let plugin = LoggerPlugin::new(NoopProducer::factory);
        let mut decoder = LogDecoder::from_yaml(OUTPUT);
        plugin.setup(PLUGIN_NAME, Some(&mut decoder)).unwrap();

        assert!(decoder.layer.is_some());
        assert_eq!(decoder.level, Some(LevelFilter::INFO));
        let logger = decoder.logger.expect("logger");
        assert_eq!(logger.config().topic_id, "topic-1");
        assert_eq!(logger.config().source, "10.1.1.1");
    }

    #[test]
    fn producer_receives_pass_through_config() {
        let seen: Arc<Mutex<Option<ProducerConfig>>> = Arc::default();
        let captured = Arc::clone(&seen);
        let factory = move |cfg: ProducerConfig| -> Result<Arc<dyn ProducerClient>, ProducerError> {
            *captured.lock() = Some(cfg);
            Ok(Arc::new(NoopProducer::new()))
        };
        let plugin = LoggerPlugin::new(factory);
        let conf = LogDecoder::from_yaml(OUTPUT).decode().unwrap();
        plugin.setup_cls(&conf).unwrap();

        let cfg = seen.lock().clone().expect("factory called");
        assert_eq!(cfg.endpoint, "ap-guangzhou.cls.tencentcs.com");
        assert_eq!(cfg.linger_ms, 500);
        assert_eq!(cfg.source, "10.1.1.1");
        assert_eq!(cfg.timeout_ms, 10_000);
        assert_eq!(cfg.idle_conn, 50);
    }

    #[test]
    fn factory_error_propagates() {
        let factory = |_cfg: ProducerConfig| -> Result<Arc<dyn ProducerClient>, ProducerError> {
            Err(ProducerError::InvalidConfig("endpoint unreachable".to_string()))
        };
        let plugin = LoggerPlugin::new(factory);
        let mut decoder = LogDecoder::from_yaml(OUTPUT);
        let err = plugin.setup(PLUGIN_NAME, Some(&mut decoder)).unwrap_err();
        assert!(matches!(err, ClsError::Producer(ProducerError::InvalidConfig(_))));
        assert!(decoder.layer.is_none());
    }

    #[test]
    fn missing_remote_config_fails() {
        let plugin = LoggerPlugin::new(NoopProducer::factory);
        let mut decoder = LogDecoder::from_yaml("writer: cls\nlevel: info\n");
        let err = plugin.setup(PLUGIN_NAME, Some(&mut decoder)).unwrap_err();
        assert!(matches!(err, ClsError::Config(_)));
    }

    #[test]
    fn malformed_config_fails() {
        let plugin = LoggerPlugin::new(NoopProducer::factory);

        let mut decoder = LogDecoder::from_yaml("writer: cls\nremote_config: just-a-string\n");
        assert!(matches!(
            plugin.setup(PLUGIN_NAME, Some(&mut decoder)),
            Err(ClsError::Decode(_))
        ));

        let mut decoder = LogDecoder::from_yaml("writer: cls\nlevel: [1, 2]\n");
        assert!(matches!(
            plugin.setup(PLUGIN_NAME, Some(&mut decoder)),
            Err(ClsError::Decode(_))
        ));

        let mut decoder = LogDecoder::from_yaml(&OUTPUT.replace("level: info", "level: loud"));
        assert!(matches!(
            plugin.setup(PLUGIN_NAME, Some(&mut decoder)),
            Err(ClsError::Config(_))
        ));
    }

    // The only test in this binary that touches the process-wide host
    // settings.
    #[test]
    fn source_follows_global_config() {
        let plugin = LoggerPlugin::new(NoopProducer::factory);
        let yaml = OUTPUT.replace("  source: 10.1.1.1\n", "");
        let conf = LogDecoder::from_yaml(&yaml).decode().unwrap();
        let saved = global_config();

        set_global_config(GlobalConfig {
            local_ip: Some("192.168.0.7".to_string()),
            service_ips: vec!["10.0.0.2".to_string()],
        });
        assert_eq!(plugin.setup_cls(&conf).unwrap().config().source, "192.168.0.7");

        set_global_config(GlobalConfig {
            local_ip: None,
            service_ips: vec!["10.0.0.2".to_string()],
        });
        assert_eq!(plugin.setup_cls(&conf).unwrap().config().source, "10.0.0.2");

        set_global_config(GlobalConfig::default());
        assert_eq!(plugin.setup_cls(&conf).unwrap().config().source, SOURCE_DEFAULT);

        let explicit = LogDecoder::from_yaml(OUTPUT).decode().unwrap();
        assert_eq!(plugin.setup_cls(&explicit).unwrap().config().source, "10.1.1.1");

        set_global_config(saved);
    }

    #[test]
    fn registry_lookup() {
        register_writer("cls-registry-test", Arc::new(LoggerPlugin::new(NoopProducer::factory)));
        let plugin = get_writer("cls-registry-test").expect("registered");
        assert_eq!(plugin.plugin_type(), "log");
        assert!(get_writer("no-such-writer").is_none());
    }
}
