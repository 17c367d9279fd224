use histpurge_config::shared::HistoryTableConfig;

/// Statement texts of the history purge, rendered once from validated table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStatements {
    pub min_committed_seqno: String,
    pub expire_cutoff: String,
    pub suppress_replication_logging: String,
    pub count_expired: String,
    pub delete_expired_batch: String,
}

/// Back-quotes an identifier. Names are validated by the configuration beforehand, so no
/// escaping is required.
fn quote_identifier(identifier: &str) -> String {
    format!("`{identifier}`")
}

impl HistoryStatements {
    pub fn new(config: &HistoryTableConfig) -> Self {
        let schema = quote_identifier(&config.schema);
        let history_table = format!("{schema}.{}", quote_identifier(&config.table));
        let progress_table = format!("{schema}.{}", quote_identifier(&config.progress_table));
        let seqno = quote_identifier(&config.seqno_column);
        let processed = quote_identifier(&config.processed_column);
        let progress_seqno = quote_identifier(&config.progress_seqno_column);

        // Both bounds are bound in the same order by every statement using it.
        let predicate = format!("{processed} <= ? AND {seqno} < ?");

        Self {
            min_committed_seqno: format!(
                "SELECT CAST(MIN({progress_seqno}) AS SIGNED) FROM {progress_table}"
            ),
            expire_cutoff: "SELECT CAST(NOW() - INTERVAL ? DAY AS DATETIME)".to_owned(),
            suppress_replication_logging: "SET SESSION sql_log_bin = 0".to_owned(),
            count_expired: format!("SELECT COUNT(*) FROM {history_table} WHERE {predicate}"),
            delete_expired_batch: format!(
                "DELETE FROM {history_table} WHERE {predicate} LIMIT ?"
            ),
        }
    }
}
