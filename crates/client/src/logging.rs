//! Structured file logging.
//!
//! The terminal belongs to the console views, so every event goes to
//! `<data_dir>/logs/guidewatch.log` through a non-blocking writer.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";
const LOG_FILE: &str = "guidewatch.log";

const FILTER_ENV: &str = "GUIDEWATCH_LOG_FILTER";
const FORMAT_ENV: &str = "GUIDEWATCH_LOG_FORMAT";
const TRUNCATE_ENV: &str = "GUIDEWATCH_TRUNCATE_LOG_ON_START";
const RUN_ID_ENV: &str = "GUIDEWATCH_RUN_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging knobs, read from the environment once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Directive string; `None` falls back to `RUST_LOG`, then the default.
    pub filter: Option<String>,
    pub format: LogFormat,
    pub truncate: bool,
    pub run_id: String,
}

impl LogOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            filter: lookup(FILTER_ENV).filter(|f| !f.trim().is_empty()),
            format: LogFormat::parse(lookup(FORMAT_ENV).as_deref()),
            truncate: lookup(TRUNCATE_ENV).as_deref() == Some("1"),
            run_id: lookup(RUN_ID_ENV).unwrap_or_else(generated_run_id),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn generated_run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("pid-{}-{}", std::process::id(), millis)
}

/// Keeps the background writer alive; drop it last.
pub struct LoggingHandle {
    pub run_id: String,
    pub log_path: PathBuf,
    _guard: WorkerGuard,
}

pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    init_with(log_dir, LogOptions::from_env())
}

fn init_with(log_dir: &Path, options: LogOptions) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);
    if options.truncate {
        std::fs::File::create(&log_path)?;
    }

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match options.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(options.env_filter())
        .try_init()?;

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %options.run_id,
        log_path = %log_path.display(),
        format = ?options.format,
        filter = options.filter.as_deref().unwrap_or(DEFAULT_FILTER),
        "Logging initialized"
    );

    Ok(LoggingHandle {
        run_id: options.run_id,
        log_path,
        _guard: guard,
    })
}
