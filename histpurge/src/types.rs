use chrono::NaiveDateTime;
use std::fmt;

/// Boundary below which history rows are safe to delete.
///
/// A row qualifies only if it was processed at or before `expire_cutoff` AND its sequence
/// number is strictly lower than `min_committed_seqno`. The sequence number condition keeps
/// every row still needed to resume replication, however old it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeWatermark {
    pub min_committed_seqno: i64,
    pub expire_cutoff: NaiveDateTime,
}

impl PurgeWatermark {
    /// Returns `true` if a row with the given sequence number and processing time may be deleted.
    pub fn admits(&self, seqno: i64, processed_at: NaiveDateTime) -> bool {
        processed_at <= self.expire_cutoff && seqno < self.min_committed_seqno
    }
}

/// Cluster-wide automation mode reported by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyMode {
    Automatic,
    Manual,
    Maintenance,
    Other(String),
}

impl PolicyMode {
    pub fn parse(value: &str) -> PolicyMode {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUTOMATIC" => PolicyMode::Automatic,
            "MANUAL" => PolicyMode::Manual,
            "MAINTENANCE" => PolicyMode::Maintenance,
            _ => PolicyMode::Other(value.trim().to_owned()),
        }
    }

    /// Returns `true` if the coordinator accepts this mode in a `set policy` command.
    pub fn is_settable(&self) -> bool {
        !matches!(self, PolicyMode::Other(_))
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Automatic => f.write_str("AUTOMATIC"),
            PolicyMode::Manual => f.write_str("MANUAL"),
            PolicyMode::Maintenance => f.write_str("MAINTENANCE"),
            PolicyMode::Other(value) => f.write_str(value),
        }
    }
}

/// Replicator run-state of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatorState {
    Online,
    Offline,
    Other(String),
}

impl ReplicatorState {
    pub fn parse(value: &str) -> ReplicatorState {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => ReplicatorState::Online,
            "OFFLINE" => ReplicatorState::Offline,
            _ => ReplicatorState::Other(value.trim().to_owned()),
        }
    }

    /// Returns `true` if the replicator can be driven into this state by a command.
    /// Transitional states such as `GOING-ONLINE:SYNCHRONIZING` are reported, never set.
    pub fn is_settable(&self) -> bool {
        !matches!(self, ReplicatorState::Other(_))
    }
}

impl fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorState::Online => f.write_str("ONLINE"),
            ReplicatorState::Offline => f.write_str("OFFLINE"),
            ReplicatorState::Other(value) => f.write_str(value),
        }
    }
}

/// Policy mode and replicator run-state of a node at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub policy_mode: PolicyMode,
    pub replicator_state: ReplicatorState,
}

/// Outcome of a single bounded delete statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    pub rows_deleted: u64,
}

/// Row count reported by the estimate diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeEstimate {
    pub qualifying_rows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// No row qualified for deletion.
    NoRows,
    /// Every qualifying row was deleted.
    Completed,
    /// Only the estimate diagnostic ran, nothing was deleted.
    EstimateOnly,
    /// The session hit a fatal error or was interrupted.
    Failed,
}

impl PurgeOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, PurgeOutcome::Failed)
    }
}

impl fmt::Display for PurgeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            PurgeOutcome::NoRows => "NO_ROWS",
            PurgeOutcome::Completed => "COMPLETED",
            PurgeOutcome::EstimateOnly => "ESTIMATE_ONLY",
            PurgeOutcome::Failed => "FAILED",
        };

        f.write_str(value)
    }
}

/// Result accumulated over the batch loop of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSessionResult {
    pub total_rows_deleted: u64,
    pub outcome: PurgeOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn watermark_requires_both_conditions() {
        let watermark = PurgeWatermark {
            min_committed_seqno: 1000,
            expire_cutoff: at(10),
        };

        assert!(watermark.admits(999, at(10)));
        assert!(watermark.admits(1, at(1)));
        // Still needed by a replication channel.
        assert!(!watermark.admits(1000, at(1)));
        assert!(!watermark.admits(999, at(11)));
    }

    #[test]
    fn states_parse_case_insensitively() {
        assert_eq!(PolicyMode::parse("automatic"), PolicyMode::Automatic);
        assert_eq!(PolicyMode::parse(" MANUAL "), PolicyMode::Manual);
        assert_eq!(
            PolicyMode::parse("ASSISTED"),
            PolicyMode::Other("ASSISTED".to_owned())
        );
        assert_eq!(ReplicatorState::parse("online"), ReplicatorState::Online);
        assert_eq!(
            ReplicatorState::parse("GOING-ONLINE:SYNCHRONIZING"),
            ReplicatorState::Other("GOING-ONLINE:SYNCHRONIZING".to_owned())
        );
    }
}
