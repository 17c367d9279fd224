use tracing::{debug, error, info, warn};

use crate::cluster::ClusterControlClient;
use crate::bail;
use crate::error::{ErrorKind, PurgeError, PurgeResult};
use crate::types::{NodeState, PolicyMode, ReplicatorState};

/// Node state captured before isolation, which release restores.
///
/// Each field is recorded as soon as it is read, so a failed acquisition still leaves
/// behind everything needed to undo the transitions that did happen.
/// [`IsolationController::release`] takes the value by ownership, which makes a second
/// restoration of the same state impossible.
#[derive(Debug, Default)]
pub struct SavedNodeState {
    policy_mode: Option<PolicyMode>,
    replicator_state: Option<ReplicatorState>,
}

impl SavedNodeState {
    pub fn policy_mode(&self) -> Option<&PolicyMode> {
        self.policy_mode.as_ref()
    }

    pub fn replicator_state(&self) -> Option<&ReplicatorState> {
        self.replicator_state.as_ref()
    }

    /// Returns `true` if nothing was captured yet.
    pub fn is_empty(&self) -> bool {
        self.policy_mode.is_none() && self.replicator_state.is_none()
    }
}

impl Drop for SavedNodeState {
    fn drop(&mut self) {
        if !self.is_empty() {
            error!(
                policy_mode = ?self.policy_mode,
                replicator_state = ?self.replicator_state,
                "saved node state dropped without being restored, manual correction required"
            );
        }
    }
}

/// Outcome of a release, which never fails as a whole.
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Number of state-changing commands sent to the coordinator.
    pub commands_issued: usize,
    /// Failures met while restoring, each already logged.
    pub failures: Vec<PurgeError>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Takes a node out of automatic policy control and offline for the duration of a purge,
/// and puts it back afterwards.
#[derive(Debug)]
pub struct IsolationController<C> {
    client: C,
    node: String,
}

impl<C> IsolationController<C>
where
    C: ClusterControlClient,
{
    pub fn new(client: C, node: String) -> Self {
        Self { client, node }
    }

    /// Records the current node state in `saved`, then switches the policy to MANUAL and
    /// the node's replicator to OFFLINE.
    ///
    /// Transitions to a value already in place are skipped. On error the caller must not
    /// purge, but must still release `saved`.
    pub async fn acquire(&self, saved: &mut SavedNodeState) -> PurgeResult<NodeState> {
        let policy_mode = self.client.policy_mode().await?;
        saved.policy_mode = Some(policy_mode.clone());

        let replicator_state = self.client.replicator_state(&self.node).await?;
        saved.replicator_state = Some(replicator_state.clone());

        info!(
            node = self.node,
            %policy_mode,
            %replicator_state,
            "saved node state before isolation"
        );

        if policy_mode == PolicyMode::Manual {
            debug!("policy mode already manual");
        } else {
            info!(from = %policy_mode, "setting policy mode to MANUAL");
            self.client.set_policy_mode(&PolicyMode::Manual).await?;
        }

        if replicator_state == ReplicatorState::Offline {
            debug!(node = self.node, "replicator already offline");
        } else {
            info!(
                node = self.node,
                from = %replicator_state,
                "setting replicator OFFLINE"
            );
            self.client
                .set_replicator_state(&self.node, &ReplicatorState::Offline)
                .await?;
        }

        Ok(NodeState {
            policy_mode,
            replicator_state,
        })
    }

    /// Re-applies the saved replicator state and then the saved policy mode.
    ///
    /// The replicator goes first so that an AUTOMATIC coordinator never observes the node
    /// still offline. Errors are logged and collected, never returned, so the process can
    /// always exit.
    pub async fn release(&self, mut saved: SavedNodeState) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if saved.is_empty() {
            debug!("no saved node state, nothing to restore");
            return report;
        }

        if let Some(target) = saved.replicator_state.take() {
            match self.restore_replicator_state(&target).await {
                Ok(issued) => report.commands_issued += usize::from(issued),
                Err(err) => {
                    error!(
                        node = self.node,
                        target = %target,
                        error = %err,
                        "failed to restore replicator state"
                    );
                    report.failures.push(err);
                }
            }
        }

        if let Some(target) = saved.policy_mode.take() {
            match self.restore_policy_mode(&target).await {
                Ok(issued) => report.commands_issued += usize::from(issued),
                Err(err) => {
                    error!(target = %target, error = %err, "failed to restore policy mode");
                    report.failures.push(err);
                }
            }
        }

        if report.is_clean() {
            info!(
                node = self.node,
                commands_issued = report.commands_issued,
                "node state restored"
            );
        } else {
            warn!(
                node = self.node,
                failures = report.failures.len(),
                "node state only partially restored, manual correction required"
            );
        }

        report
    }

    /// Returns whether a command had to be sent.
    ///
    /// A saved state the coordinator cannot be told to enter fails without sending anything,
    /// unless the replicator already reports it.
    async fn restore_replicator_state(&self, target: &ReplicatorState) -> PurgeResult<bool> {
        match self.client.replicator_state(&self.node).await {
            Ok(current) if current == *target => {
                debug!(node = self.node, state = %current, "replicator already in saved state");
                return Ok(false);
            }
            Ok(current) => {
                info!(
                    node = self.node,
                    from = %current,
                    to = %target,
                    "restoring replicator state"
                );
            }
            Err(err) => {
                warn!(
                    node = self.node,
                    error = %err,
                    "could not read replicator state, restoring unconditionally"
                );
            }
        }

        if !target.is_settable() {
            bail!(
                ErrorKind::ControlError,
                "Saved replicator state cannot be restored",
                format!(
                    "{} was {target} before isolation, manual correction required",
                    self.node
                )
            );
        }

        self.client.set_replicator_state(&self.node, target).await?;

        Ok(true)
    }

    /// Returns whether a command had to be sent.
    async fn restore_policy_mode(&self, target: &PolicyMode) -> PurgeResult<bool> {
        match self.client.policy_mode().await {
            Ok(current) if current == *target => {
                debug!(mode = %current, "policy mode already in saved state");
                return Ok(false);
            }
            Ok(current) => {
                info!(from = %current, to = %target, "restoring policy mode");
            }
            Err(err) => {
                warn!(error = %err, "could not read policy mode, restoring unconditionally");
            }
        }

        if !target.is_settable() {
            bail!(
                ErrorKind::ControlError,
                "Saved policy mode cannot be restored",
                format!("policy was {target} before isolation, manual correction required")
            );
        }

        self.client.set_policy_mode(target).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cluster::{ControlCommand, FakeClusterControl};

    const NODE: &str = "db2";

    fn controller(client: &FakeClusterControl) -> IsolationController<FakeClusterControl> {
        IsolationController::new(client.clone(), NODE.to_owned())
    }

    #[tokio::test]
    async fn acquire_isolates_and_release_restores() {
        let client = FakeClusterControl::new(PolicyMode::Automatic)
            .with_node(NODE, ReplicatorState::Online);
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        let before = controller.acquire(&mut saved).await.unwrap();

        assert_eq!(before.policy_mode, PolicyMode::Automatic);
        assert_eq!(client.policy().await, PolicyMode::Manual);
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Offline));

        let report = controller.release(saved).await;

        assert!(report.is_clean());
        assert_eq!(report.commands_issued, 2);
        assert_eq!(client.policy().await, PolicyMode::Automatic);
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Online));
    }

    #[tokio::test]
    async fn acquire_skips_transitions_already_in_place() {
        let client =
            FakeClusterControl::new(PolicyMode::Manual).with_node(NODE, ReplicatorState::Offline);
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        controller.acquire(&mut saved).await.unwrap();

        assert_eq!(client.set_commands().await, vec![]);

        let report = controller.release(saved).await;
        assert_eq!(report.commands_issued, 0);
        assert_eq!(client.set_commands().await, vec![]);
    }

    #[tokio::test]
    async fn failed_acquire_keeps_partial_state_for_release() {
        let client = FakeClusterControl::new(PolicyMode::Automatic)
            .with_node(NODE, ReplicatorState::Online);
        client.fail_set_replicator_state().await;
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        let err = controller.acquire(&mut saved).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlError);
        assert_eq!(saved.policy_mode(), Some(&PolicyMode::Automatic));
        assert_eq!(saved.replicator_state(), Some(&ReplicatorState::Online));
        assert_eq!(client.policy().await, PolicyMode::Manual);

        let report = controller.release(saved).await;

        // The replicator never left ONLINE, only the policy has to be put back.
        assert!(report.is_clean());
        assert_eq!(client.policy().await, PolicyMode::Automatic);
        assert_eq!(
            client.set_commands().await,
            vec![
                ControlCommand::SetPolicy(PolicyMode::Manual),
                ControlCommand::SetReplicator(NODE.to_owned(), ReplicatorState::Offline),
                ControlCommand::SetPolicy(PolicyMode::Automatic),
            ]
        );
    }

    #[tokio::test]
    async fn release_continues_after_a_failure() {
        let client = FakeClusterControl::new(PolicyMode::Automatic)
            .with_node(NODE, ReplicatorState::Online);
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        controller.acquire(&mut saved).await.unwrap();
        client.fail_set_replicator_state().await;

        let report = controller.release(saved).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind(), ErrorKind::ControlError);
        assert_eq!(client.policy().await, PolicyMode::Automatic);
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Offline));
    }

    #[tokio::test]
    async fn releasing_empty_state_issues_no_commands() {
        let client = FakeClusterControl::new(PolicyMode::Automatic);
        let controller = controller(&client);

        let report = controller.release(SavedNodeState::default()).await;

        assert!(report.is_clean());
        assert!(client.commands().await.is_empty());
    }

    #[tokio::test]
    async fn transitional_replicator_state_is_not_sent_back() {
        let synchronizing = ReplicatorState::Other("GOING-ONLINE:SYNCHRONIZING".to_owned());
        let client =
            FakeClusterControl::new(PolicyMode::Automatic).with_node(NODE, synchronizing.clone());
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        controller.acquire(&mut saved).await.unwrap();
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Offline));

        let report = controller.release(saved).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind(), ErrorKind::ControlError);
        assert!(
            report.failures[0]
                .detail()
                .is_some_and(|detail| detail.contains("manual correction required"))
        );
        assert_eq!(report.commands_issued, 1);
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Offline));
        assert_eq!(client.policy().await, PolicyMode::Automatic);
        assert!(
            !client
                .set_commands()
                .await
                .contains(&ControlCommand::SetReplicator(NODE.to_owned(), synchronizing))
        );
    }

    #[tokio::test]
    async fn unknown_policy_mode_is_not_sent_back() {
        let assisted = PolicyMode::Other("ASSISTED".to_owned());
        let client =
            FakeClusterControl::new(assisted.clone()).with_node(NODE, ReplicatorState::Online);
        let controller = controller(&client);

        let mut saved = SavedNodeState::default();
        controller.acquire(&mut saved).await.unwrap();

        let report = controller.release(saved).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(client.node_state(NODE).await, Some(ReplicatorState::Online));
        assert_eq!(client.policy().await, PolicyMode::Manual);
        assert!(
            !client
                .set_commands()
                .await
                .contains(&ControlCommand::SetPolicy(assisted))
        );
    }
}
