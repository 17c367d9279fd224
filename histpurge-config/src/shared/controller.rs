use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{
    ClusterControlConfig, HistoryTableConfig, LoggingConfig, MySqlConnectionConfig, PurgeConfig,
    SentryConfig, ValidationError,
};

/// Complete configuration of the purge controller.
///
/// Loaded from `base.yaml`, the environment file and `APP_` variables, then overridden by
/// command line flags before being validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PurgeControllerConfig {
    /// Connection to the database holding the history table.
    pub database: MySqlConnectionConfig,
    /// Names of the history and replication progress tables.
    pub history: HistoryTableConfig,
    /// Purge session settings.
    pub purge: PurgeConfig,
    /// Cluster control console settings, used when isolation is enabled.
    pub cluster: ClusterControlConfig,
    /// Audit log settings.
    pub logging: LoggingConfig,
    /// Optional Sentry configuration for error tracking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentry: Option<SentryConfig>,
}

impl Config for PurgeControllerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["cluster.args"];
}

impl PurgeControllerConfig {
    /// Validates the complete controller configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.history.validate()?;
        self.purge.validate()?;

        if self.purge.isolate {
            self.cluster.validate()?;
        }

        Ok(())
    }
}
