use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for the cluster control console used to isolate the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ClusterControlConfig {
    /// Path of the cluster control console binary.
    pub cctrl_path: String,
    /// Extra arguments passed to the console on every invocation.
    pub args: Vec<String>,
    /// Maximum time, in seconds, a single control command may take.
    pub command_timeout_secs: u64,
}

impl Default for ClusterControlConfig {
    fn default() -> Self {
        Self {
            cctrl_path: "cctrl".to_owned(),
            args: vec!["-expert".to_owned()],
            command_timeout_secs: 60,
        }
    }
}

impl ClusterControlConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cctrl_path.trim().is_empty() {
            return Err(ValidationError::EmptyCctrlPath);
        }

        if self.command_timeout_secs == 0 {
            return Err(ValidationError::TimeoutZero("cluster.command_timeout_secs"));
        }

        Ok(())
    }
}
