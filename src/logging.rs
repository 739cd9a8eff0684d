//! Logging setup shared by the master and its workers.
//!
//! All output goes to stderr: a worker's stdout carries the IPC protocol and
//! must never see a log line. Workers inherit stderr, so master and worker
//! logs interleave on the same terminal.
//!
//! # Environment Variables
//!
//! - `CLUSTERD_LOG` - Log filter (overrides RUST_LOG)
//! - `CLUSTERD_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `CLUSTERD_LOG_FORMAT` - Output format: pretty, compact, json
//! - `CLUSTERD_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)

use std::path::PathBuf;

use clap::ValueEnum;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    #[value(alias = "full")]
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used only when no filter directive is given.
    pub level: Level,
    pub format: LogFormat,
    /// Daily-rotated copy of the stderr output.
    pub file_path: Option<PathBuf>,
    /// Emit an event with timings when a span closes.
    pub span_events: bool,
    /// `EnvFilter` directives, e.g. `info,clusterd=debug`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            file_path: None,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Fold in the `CLUSTERD_LOG*` variables listed in the module docs.
    ///
    /// A filter already set from the command line wins over the environment,
    /// and `CLUSTERD_LOG_LEVEL` only applies when no filter is set at all.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = var("CLUSTERD_LOG").or_else(|| var("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level) = var("CLUSTERD_LOG_LEVEL")
        {
            self.level = level.parse().unwrap_or(self.level);
        }

        if let Some(format) = var("CLUSTERD_LOG_FORMAT")
            && let Ok(format) = LogFormat::from_str(&format, true)
        {
            self.format = format;
        }

        if let Some(path) = var("CLUSTERD_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("clusterd: ignoring bad log filter {:?}", filter);
                fallback()
            }),
            None => fallback(),
        }
    }

    /// One formatting layer writing to `writer`.
    fn layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if self.span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_span_events(span_events)
            .with_ansi(ansi)
            .with_writer(writer);

        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.boxed(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Logs to stderr, and additionally to a rolling file when `file_path` is set.
/// Calling it again is a no-op.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();
    let stderr = config.layer(std::io::stderr, true);

    let file = config.file_path.as_ref().map(|path| {
        let parent = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clusterd.log");
        let appender = RollingFileAppender::new(Rotation::DAILY, parent, file_name);
        config.layer(appender, false)
    });

    let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        std::iter::once(stderr).chain(file).collect();

    // Already initialized is fine.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}
