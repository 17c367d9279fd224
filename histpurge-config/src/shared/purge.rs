use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default number of rows removed by a single delete statement.
pub const DEFAULT_BATCH_SIZE: u64 = 500_000;

/// Default retention window, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Settings of a purge session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PurgeConfig {
    /// Rows processed more than this many days ago are eligible for deletion.
    pub retention_days: u32,
    /// Maximum number of rows a single delete statement may remove.
    ///
    /// Must stay below the lock ceiling of the storage engine, the purge does not tune it.
    pub batch_size: u64,
    /// Whether to take the node out of automatic policy control and offline for the purge.
    pub isolate: bool,
    /// Only count qualifying rows, without isolating the node or deleting anything.
    pub estimate: bool,
    /// Cluster node to isolate. Defaults to the local host name when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            isolate: false,
            estimate: false,
            node: None,
        }
    }
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        if let Some(node) = &self.node
            && node.trim().is_empty()
        {
            return Err(ValidationError::EmptyNode);
        }

        Ok(())
    }
}
