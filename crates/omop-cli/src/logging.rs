//! Logging built on `tracing` and `tracing-subscriber`.
//!
//! The subscriber is not installed globally. [`build_dispatch`] returns a
//! [`Dispatch`] that the binary scopes around one command with
//! [`tracing::dispatcher::with_default`], so tests and embedders can run the
//! pipeline under their own subscriber.
//!
//! # Log Levels
//!
//! - `error`: a stage failed (with its error chain)
//! - `warn`: diagnostics raised by a stage, skipped stages
//! - `info`: stage completion with row counts and duration
//! - `debug`: files read and written
//! - `trace`: unused

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Crates whose events pass the configured level; others stay at `warn`.
const OWN_CRATES: [&str; 7] = [
    "omop_cli",
    "omop_common",
    "omop_ingest",
    "omop_model",
    "omop_output",
    "omop_transform",
    "omop_vocab",
];

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level_filter: LevelFilter,
    /// Let `RUST_LOG` override `level_filter`.
    pub use_env_filter: bool,
    pub with_timestamps: bool,
    pub with_target: bool,
    pub with_ansi: bool,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::INFO,
            use_env_filter: true,
            with_timestamps: false,
            with_target: false,
            with_ansi: true,
            format: LogFormat::default(),
            log_file: None,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn with_level(mut self, level_filter: LevelFilter) -> Self {
        self.level_filter = level_filter;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }
}

/// Builds the subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn build_dispatch(config: &LogConfig) -> io::Result<Dispatch> {
    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    Ok(dispatch_with_writer(config, writer))
}

/// Builds the subscriber with a custom writer (used by tests).
pub fn dispatch_with_writer<W>(config: &LogConfig, writer: W) -> Dispatch
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(config.with_target)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target);
            if config.with_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target);
            if config.with_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(build_env_filter(config));
    Dispatch::new(subscriber)
}

fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let level = config.level_filter.to_string().to_lowercase();
    if config.use_env_filter
        && let Ok(filter) = EnvFilter::try_from_default_env()
    {
        return filter;
    }
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_CRATES.iter().map(|krate| format!("{krate}={level}")));
    EnvFilter::new(directives.join(","))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::other("poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn captured(config: &LogConfig, emit: impl FnOnce()) -> String {
        let sink = Captured::default();
        let dispatch = dispatch_with_writer(config, sink.clone());
        tracing::dispatcher::with_default(&dispatch, emit);
        let bytes = sink.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn level_filter_applies_to_own_crates() {
        let config = LogConfig {
            use_env_filter: false,
            with_ansi: false,
            ..LogConfig::default()
        }
        .with_level(LevelFilter::WARN);
        let text = captured(&config, || {
            tracing::info!("stage done");
            tracing::warn!("unmapped codes");
        });
        assert!(!text.contains("stage done"));
        assert!(text.contains("unmapped codes"));
    }

    #[test]
    fn json_lines_carry_fields() {
        let config = LogConfig {
            use_env_filter: false,
            ..LogConfig::default()
        }
        .with_format(LogFormat::Json);
        let text = captured(&config, || tracing::info!(rows = 3, "wrote table"));
        let line = text.lines().next().unwrap();
        assert!(line.starts_with('{'));
        assert!(line.contains("\"rows\":3"));
    }

    #[test]
    fn subscriber_is_scoped() {
        let config = LogConfig {
            use_env_filter: false,
            with_ansi: false,
            ..LogConfig::default()
        };
        let text = captured(&config, || tracing::info!("inside"));
        tracing::info!("outside");
        assert!(text.contains("inside"));
        assert!(!text.contains("outside"));
    }
}
