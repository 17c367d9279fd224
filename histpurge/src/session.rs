use std::fmt;
use tracing::{error, info, warn};

use crate::cluster::ClusterControlClient;
use crate::concurrency::shutdown::{InterruptSignal, ShutdownRx, wait_for_shutdown};
use crate::database::HistoryDatabase;
use crate::engine::PurgeEngine;
use crate::error::{ErrorKind, PurgeError, PurgeResult};
use crate::isolation::{IsolationController, ReleaseReport, SavedNodeState};
use crate::purge_error;
use crate::types::{PurgeEstimate, PurgeOutcome, PurgeSessionResult};

/// Exit status of a session that failed without being interrupted.
const FAILURE_EXIT_STATUS: u8 = 1;

/// Parameters of one purge session, resolved from configuration and command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeSessionConfig {
    /// Cluster node whose history table is purged.
    pub node: String,
    pub retention_days: u32,
    pub batch_size: u64,
    /// Takes the node out of automatic control while purging.
    pub isolate: bool,
    /// Only counts the qualifying rows.
    pub estimate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    Isolating,
    Purging,
    Restoring,
    Done,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SessionState::Start => "START",
            SessionState::Isolating => "ISOLATING",
            SessionState::Purging => "PURGING",
            SessionState::Restoring => "RESTORING",
            SessionState::Done => "DONE",
            SessionState::Aborted => "ABORTED",
        };

        f.write_str(value)
    }
}

/// Everything the controller needs to know about a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub result: PurgeSessionResult,
    pub final_state: SessionState,
    /// Signal that aborted the session, if any.
    pub interrupted: Option<InterruptSignal>,
    /// Fatal error that aborted the session, if any.
    pub error: Option<PurgeError>,
    /// Present when isolation was configured and restoration ran.
    pub restoration: Option<ReleaseReport>,
    /// Present for estimate-only sessions that ran to completion.
    pub estimate: Option<PurgeEstimate>,
}

impl SessionReport {
    /// Maps the report to the process exit status.
    ///
    /// A signal-driven abort reports `128 + signo`, any other failure reports 1.
    pub fn exit_status(&self) -> u8 {
        if let Some(signal) = self.interrupted {
            return signal.exit_status();
        }

        if self.result.outcome.is_success() {
            0
        } else {
            FAILURE_EXIT_STATUS
        }
    }
}

enum PhaseOutcome {
    Purged(PurgeSessionResult),
    Estimated(PurgeEstimate),
}

/// Orchestrates isolation, the purge and the restoration of one node.
#[derive(Debug)]
pub struct PurgeSession<D, C> {
    config: PurgeSessionConfig,
    engine: PurgeEngine<D>,
    isolation: IsolationController<C>,
    state: SessionState,
}

impl<D, C> PurgeSession<D, C>
where
    D: HistoryDatabase,
    C: ClusterControlClient,
{
    pub fn new(config: PurgeSessionConfig, database: D, cluster_client: C) -> Self {
        let isolation = IsolationController::new(cluster_client, config.node.clone());

        Self {
            config,
            engine: PurgeEngine::new(database),
            isolation,
            state: SessionState::Start,
        }
    }

    /// Runs the session to completion and returns its report together with the database
    /// gateway.
    ///
    /// The isolate-and-purge phase is raced against `shutdown_rx`. Whichever finishes first,
    /// the phase is dropped and the saved node state is restored once. Shutdown requests
    /// received while restoring are not acted upon.
    pub async fn run(mut self, mut shutdown_rx: ShutdownRx) -> (SessionReport, D) {
        info!(
            node = self.config.node,
            retention_days = self.config.retention_days,
            batch_size = self.config.batch_size,
            isolate = self.config.isolate,
            estimate = self.config.estimate,
            "purge session started"
        );

        let mut saved = SavedNodeState::default();

        let (phase_result, interrupted) = tokio::select! {
            biased;

            signal = wait_for_shutdown(&mut shutdown_rx) => {
                warn!(%signal, state = %self.state, "received {signal}, cleaning up");
                let err = purge_error!(
                    ErrorKind::SignalInterrupt,
                    "Purge session interrupted",
                    format!("{signal} received in state {}", self.state)
                );

                (Err(err), Some(signal))
            }
            phase_result = self.run_phase(&mut saved) => (phase_result, None),
        };

        if let (Err(err), None) = (&phase_result, interrupted) {
            error!(state = %self.state, error = %err, "purge session failed, cleaning up");
        }

        let restoration = if self.isolates() {
            self.transition(SessionState::Restoring);
            Some(self.isolation.release(saved).await)
        } else {
            None
        };

        let (result, error, estimate) = match phase_result {
            Ok(PhaseOutcome::Purged(result)) => (result, None, None),
            Ok(PhaseOutcome::Estimated(estimate)) => (
                PurgeSessionResult {
                    total_rows_deleted: 0,
                    outcome: PurgeOutcome::EstimateOnly,
                },
                None,
                Some(estimate),
            ),
            Err(err) => (
                PurgeSessionResult {
                    total_rows_deleted: self.engine.progress().total_rows_deleted,
                    outcome: PurgeOutcome::Failed,
                },
                Some(err),
                None,
            ),
        };

        let final_state = if result.outcome.is_success() {
            SessionState::Done
        } else {
            SessionState::Aborted
        };
        self.transition(final_state);

        let report = SessionReport {
            result,
            final_state,
            interrupted,
            error,
            restoration,
            estimate,
        };

        info!(
            node = self.config.node,
            outcome = %report.result.outcome,
            total_rows_deleted = report.result.total_rows_deleted,
            exit_status = report.exit_status(),
            "purge session finished"
        );

        (report, self.engine.into_database())
    }

    fn isolates(&self) -> bool {
        self.config.isolate && !self.config.estimate
    }

    async fn run_phase(&mut self, saved: &mut SavedNodeState) -> PurgeResult<PhaseOutcome> {
        if self.config.estimate {
            self.transition(SessionState::Purging);
            let watermark = self
                .engine
                .compute_watermark(self.config.retention_days)
                .await?;
            let estimate = self.engine.estimate(&watermark).await?;

            return Ok(PhaseOutcome::Estimated(estimate));
        }

        if self.config.isolate {
            self.transition(SessionState::Isolating);
            self.isolation.acquire(saved).await?;
        }

        self.transition(SessionState::Purging);
        let watermark = self
            .engine
            .compute_watermark(self.config.retention_days)
            .await?;
        let result = self
            .engine
            .purge_batches(&watermark, self.config.batch_size)
            .await?;

        Ok(PhaseOutcome::Purged(result))
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = %self.state, to = %next, "session state changed");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::test_utils::cluster::FakeClusterControl;
    use crate::test_utils::database::FakeHistoryDatabase;
    use crate::types::PolicyMode;

    fn config(isolate: bool, estimate: bool) -> PurgeSessionConfig {
        PurgeSessionConfig {
            node: "db1".to_owned(),
            retention_days: 3,
            batch_size: 10,
            isolate,
            estimate,
        }
    }

    #[test]
    fn exit_status_mapping() {
        let mut report = SessionReport {
            result: PurgeSessionResult {
                total_rows_deleted: 0,
                outcome: PurgeOutcome::NoRows,
            },
            final_state: SessionState::Done,
            interrupted: None,
            error: None,
            restoration: None,
            estimate: None,
        };
        assert_eq!(report.exit_status(), 0);

        report.result.outcome = PurgeOutcome::Failed;
        assert_eq!(report.exit_status(), 1);

        report.interrupted = Some(InterruptSignal::Terminate);
        assert_eq!(report.exit_status(), 143);
    }

    #[tokio::test]
    async fn estimate_skips_isolation_and_deletion() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(12, 0);
        let cluster = FakeClusterControl::new(PolicyMode::Automatic);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let session = PurgeSession::new(config(true, true), database.clone(), cluster.clone());
        let (report, _) = session.run(shutdown_rx).await;

        assert_eq!(report.result.outcome, PurgeOutcome::EstimateOnly);
        assert_eq!(report.estimate.map(|e| e.qualifying_rows), Some(12));
        assert!(report.restoration.is_none());
        assert_eq!(report.exit_status(), 0);
        assert!(cluster.commands().await.is_empty());
        assert!(database.deleted_per_batch().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_requested_before_start_aborts_without_deleting() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(12, 0);
        let cluster = FakeClusterControl::new(PolicyMode::Automatic);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        shutdown_tx.shutdown(InterruptSignal::Hangup).unwrap();

        let session = PurgeSession::new(config(false, false), database.clone(), cluster);
        let (report, _) = session.run(shutdown_rx).await;

        assert_eq!(report.final_state, SessionState::Aborted);
        assert_eq!(report.exit_status(), 129);
        assert_eq!(
            report.error.map(|err| err.kind()),
            Some(ErrorKind::SignalInterrupt)
        );
        assert!(database.calls().await.is_empty());
    }
}
