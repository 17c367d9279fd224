use crate::config::{load_controller_config, startup_log_dir};
use crate::core::run_purge_session;
use clap::{Args, Parser};
use histpurge_config::shared::PurgeControllerConfig;
use histpurge_config::{DEFAULT_CONFIGURATION_DIR, Environment};
use histpurge_telemetry::tracing::{TracingOptions, init_tracing};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod core;

/// Purges expired rows from a replicated history table in bounded batches.
#[derive(Debug, Parser)]
#[command(name = "histpurge", version, about)]
struct AppArgs {
    /// Rows processed more than this many days ago are eligible for deletion
    #[arg(long)]
    retention_days: Option<u32>,
    /// Cluster node to purge and isolate (default: the local host name)
    #[arg(long)]
    node: Option<String>,
    #[clap(flatten)]
    db_args: DbArgs,
    /// Maximum number of rows removed by a single delete statement (default: 500000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,
    /// Switch the node to manual policy and offline for the purge, then restore it
    #[arg(long)]
    isolate: bool,
    /// Log at debug level
    #[arg(long)]
    verbose: bool,
    /// Only count the rows that would be purged, without isolating or deleting
    #[arg(long)]
    estimate: bool,
    /// Directory holding base.yaml and the environment specific configuration file
    #[arg(long, default_value = DEFAULT_CONFIGURATION_DIR)]
    config_dir: PathBuf,
    /// Directory of the audit log file, also used for configuration errors (default: logs)
    #[arg(long)]
    log_dir: Option<String>,
}

// MySQL connection of the node holding the history table
#[derive(Debug, Args)]
struct DbArgs {
    /// Host on which MySQL is running
    #[arg(long)]
    db_host: Option<String>,
    /// Port on which MySQL is running
    #[arg(long)]
    db_port: Option<u16>,
    /// Default database of the connection
    #[arg(long)]
    db_name: Option<String>,
    /// MySQL user name, must be allowed to set sql_log_bin
    #[arg(long)]
    db_username: Option<String>,
    /// MySQL user password
    #[arg(long)]
    db_password: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = AppArgs::parse();

    let controller_config = match load_controller_config(&args) {
        Ok(controller_config) => controller_config,
        Err(err) => {
            log_startup_error(&args, &err);
            return Err(err);
        }
    };

    let _log_flusher = init_tracing(
        env!("CARGO_BIN_NAME"),
        TracingOptions {
            log_dir: Path::new(&controller_config.logging.log_dir),
            verbose: controller_config.logging.verbose,
        },
    )?;

    // Initialize Sentry before the async runtime starts
    let _sentry_guard = init_sentry(&controller_config)?;

    // A purge session is strictly sequential, a single thread drives it.
    let exit_status = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(controller_config))?;

    Ok(ExitCode::from(exit_status))
}

/// Records a configuration error in the audit log before the process exits.
///
/// Best effort: when tracing cannot be set up either, the error only reaches stderr.
fn log_startup_error(args: &AppArgs, err: &anyhow::Error) {
    let log_dir = startup_log_dir(args);
    let Ok(_log_flusher) = init_tracing(
        env!("CARGO_BIN_NAME"),
        TracingOptions {
            log_dir: Path::new(&log_dir),
            verbose: args.verbose,
        },
    ) else {
        return;
    };

    error!("failed to load the purge controller configuration: {err:#}");
}

async fn async_main(controller_config: PurgeControllerConfig) -> anyhow::Result<u8> {
    match run_purge_session(controller_config).await {
        Ok(exit_status) => Ok(exit_status),
        Err(err) => {
            sentry::capture_error(AsRef::<dyn std::error::Error + 'static>::as_ref(&err));
            error!("an error occurred in the purge controller: {err:#}");

            Err(err)
        }
    }
}

/// Initializes Sentry when a DSN is configured.
///
/// Tags all events with the "histpurge" service identifier and captures panics.
fn init_sentry(
    controller_config: &PurgeControllerConfig,
) -> anyhow::Result<Option<sentry::ClientInitGuard>> {
    if let Some(sentry_config) = &controller_config.sentry {
        info!("initializing sentry with supplied dsn");

        let environment = Environment::load()?;
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(sentry_config.dsn.parse()?),
            environment: Some(environment.to_string().into()),
            integrations: vec![Arc::new(
                sentry::integrations::panic::PanicIntegration::new(),
            )],
            ..Default::default()
        });

        sentry::configure_scope(|scope| {
            scope.set_tag("service", "histpurge");
        });

        return Ok(Some(guard));
    }

    info!("sentry not configured for histpurge, skipping initialization");

    Ok(None)
}
