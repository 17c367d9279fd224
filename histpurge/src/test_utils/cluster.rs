use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cluster::ClusterControlClient;
use crate::concurrency::shutdown::{InterruptSignal, ShutdownTx};
use crate::error::{ErrorKind, PurgeResult};
use crate::types::{PolicyMode, ReplicatorState};
use crate::{bail, purge_error};

/// A command received by [`FakeClusterControl`], in order, including failed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    GetPolicy,
    GetReplicator(String),
    SetPolicy(PolicyMode),
    SetReplicator(String, ReplicatorState),
}

impl ControlCommand {
    pub fn is_set(&self) -> bool {
        matches!(
            self,
            ControlCommand::SetPolicy(_) | ControlCommand::SetReplicator(_, _)
        )
    }
}

#[derive(Debug)]
struct Inner {
    policy: PolicyMode,
    nodes: HashMap<String, ReplicatorState>,
    commands: Vec<ControlCommand>,
    failing_policy_targets: Vec<PolicyMode>,
    fail_set_replicator_state: bool,
    interrupt_on_set_replicator: Option<(ShutdownTx, InterruptSignal)>,
}

/// In-memory cluster coordinator.
#[derive(Debug, Clone)]
pub struct FakeClusterControl {
    inner: Arc<Mutex<Inner>>,
}

impl FakeClusterControl {
    pub fn new(policy: PolicyMode) -> Self {
        let inner = Inner {
            policy,
            nodes: HashMap::new(),
            commands: Vec::new(),
            failing_policy_targets: Vec::new(),
            fail_set_replicator_state: false,
            interrupt_on_set_replicator: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn with_node(self, node: &str, state: ReplicatorState) -> Self {
        self.inner
            .try_lock()
            .expect("fake cluster is not shared yet")
            .nodes
            .insert(node.to_owned(), state);

        self
    }

    /// Makes every attempt to switch the policy to `target` fail.
    pub async fn fail_set_policy_mode_to(&self, target: PolicyMode) {
        self.inner.lock().await.failing_policy_targets.push(target);
    }

    pub async fn fail_set_replicator_state(&self) {
        self.inner.lock().await.fail_set_replicator_state = true;
    }

    /// Delivers `signal` right after the next replicator state change is applied. That
    /// command never returns.
    pub async fn interrupt_on_set_replicator(
        &self,
        shutdown_tx: ShutdownTx,
        signal: InterruptSignal,
    ) {
        self.inner.lock().await.interrupt_on_set_replicator = Some((shutdown_tx, signal));
    }

    pub async fn policy(&self) -> PolicyMode {
        self.inner.lock().await.policy.clone()
    }

    pub async fn node_state(&self, node: &str) -> Option<ReplicatorState> {
        self.inner.lock().await.nodes.get(node).cloned()
    }

    pub async fn commands(&self) -> Vec<ControlCommand> {
        self.inner.lock().await.commands.clone()
    }

    /// State-changing commands only.
    pub async fn set_commands(&self) -> Vec<ControlCommand> {
        self.inner
            .lock()
            .await
            .commands
            .iter()
            .filter(|command| command.is_set())
            .cloned()
            .collect()
    }
}

impl ClusterControlClient for FakeClusterControl {
    async fn policy_mode(&self) -> PurgeResult<PolicyMode> {
        let mut inner = self.inner.lock().await;
        inner.commands.push(ControlCommand::GetPolicy);

        Ok(inner.policy.clone())
    }

    async fn replicator_state(&self, node: &str) -> PurgeResult<ReplicatorState> {
        let mut inner = self.inner.lock().await;
        inner
            .commands
            .push(ControlCommand::GetReplicator(node.to_owned()));

        inner.nodes.get(node).cloned().ok_or_else(|| {
            purge_error!(
                ErrorKind::ControlParseError,
                "Node missing from cluster listing",
                node
            )
        })
    }

    async fn set_policy_mode(&self, mode: &PolicyMode) -> PurgeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.commands.push(ControlCommand::SetPolicy(mode.clone()));

        if inner.failing_policy_targets.contains(mode) {
            bail!(
                ErrorKind::ControlError,
                "Cluster control command failed",
                format!(
                    "`set policy {}` exited with exit status: 1",
                    mode.to_string().to_lowercase()
                )
            );
        }

        inner.policy = mode.clone();

        Ok(())
    }

    async fn set_replicator_state(&self, node: &str, state: &ReplicatorState) -> PurgeResult<()> {
        let interrupt = {
            let mut inner = self.inner.lock().await;
            inner
                .commands
                .push(ControlCommand::SetReplicator(node.to_owned(), state.clone()));

            if inner.fail_set_replicator_state {
                bail!(
                    ErrorKind::ControlError,
                    "Cluster control command failed",
                    format!(
                        "`replicator {node} {}` exited with exit status: 1",
                        state.to_string().to_lowercase()
                    )
                );
            }

            if !inner.nodes.contains_key(node) {
                bail!(
                    ErrorKind::ControlError,
                    "Cluster control command failed",
                    format!("unknown datasource {node}")
                );
            }

            inner.nodes.insert(node.to_owned(), state.clone());
            inner.interrupt_on_set_replicator.take()
        };

        if let Some((shutdown_tx, signal)) = interrupt {
            let _ = shutdown_tx.shutdown(signal);
            std::future::pending::<()>().await;
        }

        Ok(())
    }
}
