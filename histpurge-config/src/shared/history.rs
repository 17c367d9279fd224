use serde::{Deserialize, Serialize};

use crate::shared::{ValidationError, validate_identifier};

/// Location of the history table and of the replication progress table it is purged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HistoryTableConfig {
    /// Schema holding both the history table and the replication progress table.
    pub schema: String,
    /// Append-only history table to purge.
    pub table: String,
    /// Sequence number column of the history table.
    pub seqno_column: String,
    /// Column recording when a history row was processed.
    pub processed_column: String,
    /// Table holding one committed position per replication channel.
    pub progress_table: String,
    /// Committed sequence number column of the progress table.
    pub progress_seqno_column: String,
}

impl Default for HistoryTableConfig {
    fn default() -> Self {
        Self {
            schema: "tungsten".to_owned(),
            table: "history".to_owned(),
            seqno_column: "seqno".to_owned(),
            processed_column: "processed_tstamp".to_owned(),
            progress_table: "trep_commit_seqno".to_owned(),
            progress_seqno_column: "seqno".to_owned(),
        }
    }
}

impl HistoryTableConfig {
    /// Validates every configured name as a plain identifier, since they are interpolated
    /// into statements.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("history.schema", &self.schema)?;
        validate_identifier("history.table", &self.table)?;
        validate_identifier("history.seqno_column", &self.seqno_column)?;
        validate_identifier("history.processed_column", &self.processed_column)?;
        validate_identifier("history.progress_table", &self.progress_table)?;
        validate_identifier("history.progress_seqno_column", &self.progress_seqno_column)?;

        Ok(())
    }
}
