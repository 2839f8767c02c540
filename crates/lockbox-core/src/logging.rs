//! Process-wide logging hook.
//!
//! Library code logs through `tracing`. A host may install one [`LogSink`]
//! per process; events at or above the chosen threshold are forwarded to it
//! by [`SinkLayer`]. Later installation attempts are ignored.

use std::{
    fmt::{self, Write as _},
    str::FromStr,
    sync::{Arc, OnceLock},
};

use serde::{Deserialize, Serialize};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    util::SubscriberInitExt,
    Layer,
};

/// Verbosity, ordered from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Threshold only: forward nothing.
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Whether a record at `level` passes this threshold.
    pub fn allows(self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            Level::DEBUG => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Receiver for forwarded log records.
pub trait LogSink: Send + Sync {
    fn record(&self, level: LogLevel, message: &str);
}

struct InstalledSink {
    sink: Arc<dyn LogSink>,
    threshold: LogLevel,
}

static CUSTOM_LOGGER: OnceLock<InstalledSink> = OnceLock::new();

/// Install the process-wide sink. Returns `false` (and changes nothing) if a
/// sink was already installed.
pub fn set_custom_logger(sink: Arc<dyn LogSink>, threshold: LogLevel) -> bool {
    let mut installed = false;
    CUSTOM_LOGGER.get_or_init(|| {
        installed = true;
        InstalledSink { sink, threshold }
    });

    if installed {
        // A host that already owns the global subscriber must add `sink_layer()` itself.
        if let Err(err) = tracing_subscriber::registry().with(sink_layer()).try_init() {
            tracing::debug!("custom logger installed without global subscriber: {err}");
        }
    }
    installed
}

/// Threshold of the installed sink, if any.
pub fn custom_logger_level() -> Option<LogLevel> {
    CUSTOM_LOGGER.get().map(|installed| installed.threshold)
}

pub fn sink_layer() -> SinkLayer {
    SinkLayer
}

/// `tracing` layer forwarding events to the installed [`LogSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkLayer;

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(installed) = CUSTOM_LOGGER.get() else {
            return;
        };
        let level = LogLevel::from(*event.metadata().level());
        if !installed.threshold.allows(level) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        installed.sink.record(level, &visitor.finish());
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}

impl MessageVisitor {
    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}
