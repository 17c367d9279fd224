use histpurge_config::{Environment, UnknownEnvironment};
use std::path::Path;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError, RollingFileAppender},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// Suffix of the audit log file, which is named `{app_name}.log`.
const LOG_FILE_SUFFIX: &str = "log";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build audit log file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("failed to detect the running environment: {0}")]
    Environment(#[from] UnknownEnvironment),
}

/// Log flusher handle for ensuring the audit log is written before the process exits.
///
/// The [`WorkerGuard`] must be kept alive until the very end of `main`, dropping it flushes
/// the entries still buffered for the log file.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Options controlling where and how verbosely the audit log is written.
#[derive(Debug, Clone)]
pub struct TracingOptions<'a> {
    /// Directory of the persistent audit log file.
    pub log_dir: &'a Path,
    /// Lowers the default level to `debug`.
    pub verbose: bool,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into());
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_test_writer()
                .finish();
            let _ = set_global_default(subscriber);
        }
    });
}

/// Builds the appender of the audit log file.
///
/// The file never rotates and is opened in append mode, so consecutive runs accumulate in
/// `{log_dir}/{app_name}.log`. The directory is created when missing.
pub fn build_audit_log_appender(
    log_dir: &Path,
    app_name: &str,
) -> Result<RollingFileAppender, TracingError> {
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::NEVER)
        .filename_prefix(app_name)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(log_dir)?;

    Ok(appender)
}

/// Initializes tracing for the controller.
///
/// Installs a subscriber writing human-readable, timestamped lines to standard output and
/// to the audit log file. `RUST_LOG` takes precedence over the verbosity option.
pub fn init_tracing(
    app_name: &str,
    options: TracingOptions<'_>,
) -> Result<LogFlusher, TracingError> {
    // Captures logs from libraries that use the `log` crate, sqlx among them.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let default_level = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let file_appender = build_audit_log_appender(options.log_dir, app_name)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_format = fmt::format()
        .with_level(true)
        // ANSI colors are only for terminal output
        .with_ansi(false)
        .with_target(false);

    // Cron mails or redirects stdout in production, so colors are only used in development.
    let stdout_format = fmt::format()
        .with_level(true)
        .with_ansi(!is_prod)
        .with_target(false);

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .event_format(stdout_format)
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .event_format(file_format)
                .with_writer(file_writer),
        );

    set_global_default(subscriber)?;

    set_tracing_panic_hook();

    Ok(LogFlusher { _guard: guard })
}

/// Sets up custom panic hook for structured panic logging.
///
/// A panic while the node is isolated must still show up in the audit log, so the hook
/// routes it through tracing before delegating to the previous hook.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        panic.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
