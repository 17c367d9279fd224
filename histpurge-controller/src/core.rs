use histpurge::cluster::cctrl::CctrlClient;
use histpurge::concurrency::shutdown::{
    InterruptSignal, ShutdownRx, ShutdownTx, create_shutdown_channel, wait_for_shutdown,
};
use histpurge::database::mysql::MySqlHistoryDatabase;
use histpurge::session::{PurgeSession, PurgeSessionConfig, SessionReport};
use histpurge_config::shared::{
    ClusterControlConfig, HistoryTableConfig, MySqlConnectionConfig, PurgeConfig,
    PurgeControllerConfig,
};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, info, warn};

/// File holding the kernel host name, used as the node name when none is configured.
const HOSTNAME_FILE: &str = "/proc/sys/kernel/hostname";

/// Runs one purge session with the provided configuration and returns the exit status.
///
/// Errors returned from here happen before the session starts, so no node state needs to
/// be restored for them.
pub async fn run_purge_session(controller_config: PurgeControllerConfig) -> anyhow::Result<u8> {
    info!("starting purge controller");

    log_config(&controller_config);

    let node = match &controller_config.purge.node {
        Some(node) => node.clone(),
        None => local_hostname()?,
    };

    let session_config = PurgeSessionConfig {
        node,
        retention_days: controller_config.purge.retention_days,
        batch_size: controller_config.purge.batch_size,
        isolate: controller_config.purge.isolate,
        estimate: controller_config.purge.estimate,
    };

    // Handlers are registered before connecting, so a signal received from here on is
    // turned into a shutdown request instead of killing the process.
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let signals = ProcessSignals::register()?;
    let signal_handle = tokio::spawn(signals.forward(shutdown_tx));

    let database = match connect_unless_shutdown(&controller_config, &shutdown_rx).await? {
        Ok(database) => database,
        Err(signal) => {
            warn!(%signal, "received {signal} before the session started, exiting");
            signal_handle.abort();
            let _ = signal_handle.await;

            return Ok(signal.exit_status());
        }
    };
    let cluster_client = CctrlClient::new(&controller_config.cluster);

    let session = PurgeSession::new(session_config, database, cluster_client);
    let (report, database) = session.run(shutdown_rx).await;

    signal_handle.abort();
    let _ = signal_handle.await;

    if let Err(err) = database.close().await {
        warn!(error = %err, "failed to close mysql connection");
    }

    report_to_sentry(&report);

    Ok(report.exit_status())
}

/// Opens the database connection unless a shutdown is requested first.
///
/// Nothing has been changed on the node yet, so a signal simply abandons the connect and
/// is returned in place of the connection.
async fn connect_unless_shutdown(
    controller_config: &PurgeControllerConfig,
    shutdown_rx: &ShutdownRx,
) -> anyhow::Result<Result<MySqlHistoryDatabase, InterruptSignal>> {
    let mut shutdown_rx = shutdown_rx.clone();

    tokio::select! {
        biased;

        signal = wait_for_shutdown(&mut shutdown_rx) => Ok(Err(signal)),
        database = MySqlHistoryDatabase::connect(
            &controller_config.database,
            &controller_config.history,
        ) => Ok(Ok(database?)),
    }
}

/// Sends fatal session errors and failed restorations to Sentry. A no-op when Sentry is
/// not initialized.
fn report_to_sentry(report: &SessionReport) {
    if let Some(err) = &report.error
        && report.interrupted.is_none()
    {
        sentry::capture_error(err);
    }

    if let Some(restoration) = &report.restoration {
        for failure in &restoration.failures {
            sentry::capture_error(failure);
        }
    }
}

fn local_hostname() -> anyhow::Result<String> {
    if let Ok(hostname) = std::fs::read_to_string(HOSTNAME_FILE) {
        let hostname = hostname.trim();
        if !hostname.is_empty() {
            return Ok(hostname.to_owned());
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME")
        && !hostname.trim().is_empty()
    {
        return Ok(hostname.trim().to_owned());
    }

    anyhow::bail!("could not determine the local host name, pass --node explicitly")
}

/// Signal streams that abort a running purge session.
struct ProcessSignals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    pipe: Signal,
}

impl ProcessSignals {
    fn register() -> anyhow::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            pipe: signal(SignalKind::pipe())?,
        })
    }

    /// Forwards the first received signal into the shutdown channel. Later signals are
    /// still consumed, so they cannot terminate the process while the node is restored.
    async fn forward(mut self, shutdown_tx: ShutdownTx) {
        let mut forwarded = false;

        loop {
            let received = tokio::select! {
                _ = self.hangup.recv() => InterruptSignal::Hangup,
                _ = self.interrupt.recv() => InterruptSignal::Interrupt,
                _ = self.terminate.recv() => InterruptSignal::Terminate,
                _ = self.pipe.recv() => InterruptSignal::BrokenPipe,
            };

            if forwarded {
                warn!(signal = %received, "already shutting down, ignoring signal");
                continue;
            }

            info!(signal = %received, "signal received, requesting session shutdown");
            if let Err(err) = shutdown_tx.shutdown(received) {
                warn!("failed to send shutdown signal: {:?}", err);
                return;
            }
            forwarded = true;
        }
    }
}

fn log_config(config: &PurgeControllerConfig) {
    log_purge_config(&config.purge);
    log_mysql_connection_config(&config.database);
    log_history_table_config(&config.history);
    if config.purge.isolate {
        log_cluster_control_config(&config.cluster);
    }
}

fn log_purge_config(config: &PurgeConfig) {
    debug!(
        retention_days = config.retention_days,
        batch_size = config.batch_size,
        isolate = config.isolate,
        estimate = config.estimate,
        node = config.node,
        "purge config"
    );
}

fn log_mysql_connection_config(config: &MySqlConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        connect_timeout_secs = config.connect_timeout_secs,
        statement_timeout_secs = config.statement_timeout_secs,
        tls_enabled = config.tls.enabled,
        "mysql connection config"
    );
}

fn log_history_table_config(config: &HistoryTableConfig) {
    debug!(
        schema = config.schema,
        table = config.table,
        progress_table = config.progress_table,
        "history table config"
    );
}

fn log_cluster_control_config(config: &ClusterControlConfig) {
    debug!(
        cctrl_path = config.cctrl_path,
        args = ?config.args,
        command_timeout_secs = config.command_timeout_secs,
        "cluster control config"
    );
}
