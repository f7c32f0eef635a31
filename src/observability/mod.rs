//! Observability and telemetry.
//!
//! Structured logging through `tracing` with an env-filter, pretty or
//! JSON output, and optional file logging. Metrics are emitted through
//! the `metrics` facade; an embedding process installs whatever
//! recorder it wants (none is installed here).

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output encoding.
    pub format: LogFormat,
    /// Log file path; stderr when absent.
    pub file: Option<PathBuf>,
    /// `tracing` env-filter directive, e.g. `sluice=debug,warn`.
    pub filter: String,
}

impl LoggingConfig {
    /// Builds a configuration from the environment.
    ///
    /// `RUST_LOG` wins for the filter; otherwise `verbose` selects
    /// debug-level output for this crate. `SLUICE_LOG_FORMAT` and
    /// `SLUICE_LOG_FILE` select encoding and file output.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
            if verbose {
                "sluice=debug,info".to_string()
            } else {
                "sluice=info,warn".to_string()
            }
        });
        let format = std::env::var("SLUICE_LOG_FORMAT")
            .map(|value| LogFormat::parse(&value))
            .unwrap_or(LogFormat::Pretty);
        let file = std::env::var("SLUICE_LOG_FILE").ok().map(PathBuf::from);
        Self {
            format,
            file,
            filter,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            file: None,
            filter: "sluice=info,warn".to_string(),
        }
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging for the process.
///
/// # Errors
///
/// Returns an error if observability has already been initialized, the
/// filter directive does not parse, or the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    let filter = tracing_subscriber::EnvFilter::try_new(&config.filter).map_err(|e| {
        Error::InvalidInput(format!("bad log filter '{}': {e}", config.filter))
    })?;

    match (&config.file, config.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        }
        (Some(log_file), LogFormat::Pretty) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        }
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        }
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        }
    }

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "failed to mark observability initialized".to_string(),
        })?;

    describe_metrics();
    Ok(())
}

/// Registers descriptions for every metric this crate emits, so an
/// installed recorder can surface them.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "import_jobs_total",
        "Completed import jobs by terminal status"
    );
    metrics::describe_histogram!(
        "import_job_duration_ms",
        "Wall-clock duration of one import job"
    );
    metrics::describe_counter!("import_chunks_staged_total", "Chunks written to staging");
    metrics::describe_counter!("import_records_total", "Records written to the store");
    metrics::describe_counter!("export_jobs_total", "Completed export jobs");
    metrics::describe_counter!(
        "export_documents_total",
        "Documents serialized by export jobs"
    );
    metrics::describe_gauge!(
        "store_bulkhead_available_permits",
        "Free bulkhead permits at the last acquire attempt"
    );
    metrics::describe_counter!(
        "store_bulkhead_permits_acquired_total",
        "Bulkhead permits handed to store operations"
    );
    metrics::describe_counter!(
        "store_bulkhead_rejections_total",
        "Store operations rejected by the bulkhead, by reason"
    );
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {}", path.display(), e),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    }
}
