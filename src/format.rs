use crate::error::ClsError;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde_json::{Map, Value};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const TIME_KEY: &str = "Time";
pub const LEVEL_KEY: &str = "Level";
pub const NAME_KEY: &str = "Name";
pub const CALLER_KEY: &str = "Caller";
pub const MESSAGE_KEY: &str = "Msg";
pub const STACKTRACE_KEY: &str = "StackTrace";

/// Field that is reported under [`STACKTRACE_KEY`] on `ERROR` events.
pub const BACKTRACE_FIELD: &str = "backtrace";

/// Event formatter that renders each `tracing` event as one flat JSON
/// object line, the input format of [`ClsLogger`](crate::writer::ClsLogger).
///
/// Reserved keys are `Time`, `Level`, `Name` (event target), `Caller`
/// (`dir/file.rs:line`), `Msg` and, for `ERROR` events carrying a
/// `backtrace` field, `StackTrace`. Every other recorded field is written
/// under its own name. Reserved keys win when a field collides with them.
#[derive(Debug, Clone)]
pub struct ClsEventFormat {
    time_format: String,
}

impl ClsEventFormat {
    /// `time_format` is a chrono `strftime` layout, checked with
    /// [`validate_time_format`] at setup.
    pub fn new(time_format: impl Into<String>) -> Self {
        Self {
            time_format: time_format.into(),
        }
    }

    fn timestamp(&self) -> String {
        let now = Local::now();
        let mut out = String::new();
        if write!(out, "{}", now.format(&self.time_format)).is_err() {
            return now.to_rfc3339();
        }
        out
    }
}

/// Reject layouts chrono cannot render, and layouts without any
/// specifier (e.g. a Go layout such as `2006-01-02 15:04:05`), which would
/// stamp every record with the same literal time.
pub fn validate_time_format(layout: &str) -> Result<(), ClsError> {
    let mut has_specifier = false;
    for item in StrftimeItems::new(layout) {
        match item {
            Item::Error => {
                return Err(ClsError::Config(format!("invalid time_fmt: {layout}")));
            }
            Item::Numeric(..) | Item::Fixed(..) => has_specifier = true,
            _ => {}
        }
    }
    if !has_specifier {
        return Err(ClsError::Config(format!(
            "time_fmt has no strftime specifier: {layout}"
        )));
    }
    Ok(())
}

impl<S, N> FormatEvent<S, N> for ClsEventFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = Map::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let meta = event.metadata();
        if *meta.level() == Level::ERROR {
            if let Some(trace) = fields.remove(BACKTRACE_FIELD) {
                fields.insert(STACKTRACE_KEY.to_string(), trace);
            }
        }
        fields.insert(TIME_KEY.to_string(), Value::String(self.timestamp()));
        fields.insert(
            LEVEL_KEY.to_string(),
            Value::String(meta.level().as_str().to_string()),
        );
        fields.insert(NAME_KEY.to_string(), Value::String(meta.target().to_string()));
        if let Some(file) = meta.file() {
            fields.insert(
                CALLER_KEY.to_string(),
                Value::String(short_caller(file, meta.line())),
            );
        }
        fields.insert(
            MESSAGE_KEY.to_string(),
            Value::String(message.unwrap_or_default()),
        );

        let line = serde_json::to_string(&fields).map_err(|_| fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Trim a source path to its last directory and file name.
pub fn short_caller(file: &str, line: Option<u32>) -> String {
    let parts: Vec<&str> = file.rsplitn(3, ['/', '\\']).collect();
    let short = match parts.as_slice() {
        [name, dir, _] | [name, dir] => format!("{}/{}", dir, name),
        _ => file.to_string(),
    };
    match line {
        Some(line) => format!("{}:{}", short, line),
        None => short,
    }
}

/// Collects event fields into a JSON map, pulling `message` aside.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        // Formatted messages (`info!("x = {}", x)`) arrive here.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
