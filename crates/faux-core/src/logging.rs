use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing_appender::rolling;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "faux.log";
const MAX_BUFFERED_LINES: usize = 500;
const LOG_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// A captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

/// Recent log lines, shared between the buffer layer and whoever reads them.
pub type LogBuffer = Arc<Mutex<VecDeque<LogEntry>>>;

pub fn new_log_buffer(capacity: usize) -> LogBuffer {
    Arc::new(Mutex::new(VecDeque::with_capacity(capacity)))
}

/// Directory for rolling log files.
///
/// `FAUX_LOG_DIR` wins; otherwise `<platform data dir>/faux/logs`.
pub fn log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FAUX_LOG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::data_dir() {
        Some(data) => data.join("faux").join("logs"),
        None => PathBuf::from("logs"),
    }
}

/// Delete `faux.log*` files in `dir` last modified more than `max_age_days` ago.
fn prune_logs(dir: &Path, max_age_days: u64) {
    let Some(cutoff) =
        SystemTime::now().checked_sub(Duration::from_secs(max_age_days * 24 * 60 * 60))
    else {
        return;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .is_ok_and(|modified| modified <= cutoff);
        if stale {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

/// Drops an event whose rendered message equals the previous one before any
/// sink sees it, so a handler failing on every tick is logged once.
#[derive(Default)]
pub struct SuppressRepeats {
    last: Mutex<Option<String>>,
}

impl<S: tracing::Subscriber> Layer<S> for SuppressRepeats {
    fn event_enabled(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) -> bool {
        let message = render(event);
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        if last.as_deref() == Some(message.as_str()) {
            return false;
        }
        *last = Some(message);
        true
    }
}

/// A tracing layer that keeps the most recent events in a [`LogBuffer`].
pub struct BufferLayer {
    buffer: LogBuffer,
    max_lines: usize,
}

impl BufferLayer {
    pub fn new(buffer: LogBuffer, max_lines: usize) -> Self {
        Self {
            buffer,
            max_lines: max_lines.max(1),
        }
    }

    fn push(&self, entry: LogEntry) {
        let Ok(mut buf) = self.buffer.lock() else {
            return;
        };
        while buf.len() >= self.max_lines {
            buf.pop_front();
        }
        buf.push_back(entry);
    }
}

impl<S: tracing::Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
        self.push(LogEntry {
            level: (*event.metadata().level()).into(),
            target: event.metadata().target().to_string(),
            message: render(event),
        });
    }
}

fn render(event: &tracing::Event<'_>) -> String {
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    visitor.finish()
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        let mut parts: Vec<String> = self.message.into_iter().collect();
        parts.extend(self.fields);
        parts.join(" ")
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }
}

/// Handle to the installed subscriber.
pub struct Logging {
    buffer: LogBuffer,
    filter: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl Logging {
    /// Recent log lines.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Switch the filter to `level`, typically once the config is loaded.
    ///
    /// A filter chosen through `FAUX_LOG` or `RUST_LOG` is left alone.
    pub fn set_default_level(&self, level: &str) -> Result<()> {
        if self.env_override {
            return Ok(());
        }
        let filter =
            EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level:?}"))?;
        self.filter.reload(filter).context("failed to reload log filter")
    }
}

/// Install the global subscriber.
///
/// The filter comes from `FAUX_LOG`, then `RUST_LOG`, then `default_level`;
/// the last can be changed later with [`Logging::set_default_level`]. Lines
/// go to a daily rolling file in [`log_dir`] (kept for a week) and to an
/// in-memory buffer, with consecutive repeats dropped from both.
pub fn init(default_level: &str) -> Result<Logging> {
    let buffer = new_log_buffer(MAX_BUFFERED_LINES);

    let (filter, env_override) = match EnvFilter::try_from_env("FAUX_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
    {
        Ok(filter) => (filter, true),
        Err(_) => (
            EnvFilter::try_new(default_level)
                .with_context(|| format!("invalid log filter {default_level:?}"))?,
            false,
        ),
    };
    let (filter, handle) = reload::Layer::new(filter);

    let dir = log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    prune_logs(&dir, LOG_RETENTION_DAYS);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(rolling::daily(&dir, LOG_FILE_PREFIX))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(SuppressRepeats::default())
        .with(file_layer)
        .with(BufferLayer::new(buffer.clone(), MAX_BUFFERED_LINES))
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(Logging {
        buffer,
        filter: handle,
        env_override,
    })
}
