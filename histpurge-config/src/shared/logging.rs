use serde::{Deserialize, Serialize};

/// Audit log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingConfig {
    /// Directory holding the persistent audit log file.
    pub log_dir: String,
    /// Emits debug-level entries, including every statement and control command.
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_owned(),
            verbose: false,
        }
    }
}
