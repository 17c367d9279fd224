use std::future::Future;

use crate::error::PurgeResult;
use crate::types::{PolicyMode, ReplicatorState};

/// Gateway to the cluster coordinator.
///
/// Implementations hide how the coordinator is reached and how its responses are parsed;
/// callers only ever see typed states or a [`crate::error::PurgeError`].
pub trait ClusterControlClient {
    /// Returns the policy mode the coordinator currently applies to the cluster.
    fn policy_mode(&self) -> impl Future<Output = PurgeResult<PolicyMode>> + Send;

    /// Returns the replicator run-state of `node`.
    fn replicator_state(
        &self,
        node: &str,
    ) -> impl Future<Output = PurgeResult<ReplicatorState>> + Send;

    fn set_policy_mode(&self, mode: &PolicyMode) -> impl Future<Output = PurgeResult<()>> + Send;

    fn set_replicator_state(
        &self,
        node: &str,
        state: &ReplicatorState,
    ) -> impl Future<Output = PurgeResult<()>> + Send;
}
