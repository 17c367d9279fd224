use chrono::NaiveDateTime;
use histpurge_config::shared::{HistoryTableConfig, MySqlConnectionConfig};
use sqlx::{Connection, MySqlConnection};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::{HistoryDatabase, HistoryStatements};
use crate::error::{ErrorKind, PurgeError, PurgeResult};
use crate::purge_error;
use crate::types::PurgeWatermark;

/// [`HistoryDatabase`] backed by a single MySQL connection.
///
/// `sql_log_bin` is a session variable, so every statement runs on this one connection.
#[derive(Debug)]
pub struct MySqlHistoryDatabase {
    connection: MySqlConnection,
    statements: HistoryStatements,
    statement_timeout: Duration,
}

impl MySqlHistoryDatabase {
    /// Opens the session connection to the server holding the history table.
    pub async fn connect(
        connection_config: &MySqlConnectionConfig,
        history_config: &HistoryTableConfig,
    ) -> PurgeResult<Self> {
        let options = connection_config.connect_options();
        let statement_timeout = Duration::from_secs(connection_config.statement_timeout_secs);
        let connect_timeout = Duration::from_secs(connection_config.connect_timeout_secs);

        let connection = match tokio::time::timeout(
            connect_timeout,
            MySqlConnection::connect_with(&options),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                return Err(purge_error!(
                    ErrorKind::ConnectionError,
                    "Failed to connect to MySQL",
                    format!(
                        "{}:{} as {}: {err}",
                        connection_config.host, connection_config.port, connection_config.username
                    )
                ));
            }
            Err(_) => {
                return Err(purge_error!(
                    ErrorKind::ConnectionError,
                    "Timed out connecting to MySQL",
                    format!("{}:{}", connection_config.host, connection_config.port)
                ));
            }
        };

        info!(
            host = connection_config.host,
            port = connection_config.port,
            tls_enabled = connection_config.tls.enabled,
            "connected to mysql"
        );

        Ok(Self {
            connection,
            statements: HistoryStatements::new(history_config),
            statement_timeout,
        })
    }

    /// Closes the session connection.
    pub async fn close(self) -> PurgeResult<()> {
        self.connection.close().await?;

        Ok(())
    }
}

/// Runs a statement future under the statement timeout, attaching the statement text to
/// any failure.
async fn bounded<T, F>(timeout: Duration, statement: &str, future: F) -> PurgeResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    debug!(statement, "executing statement");

    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let err = PurgeError::from(err);
            Err(purge_error!(
                err.kind(),
                err.description(),
                format!(
                    "{}; statement: {statement}",
                    err.detail().unwrap_or_default()
                )
            ))
        }
        Err(_) => Err(purge_error!(
            ErrorKind::QueryTimeout,
            "MySQL statement timed out",
            format!(
                "no result after {}s; statement: {statement}",
                timeout.as_secs()
            )
        )),
    }
}

impl HistoryDatabase for MySqlHistoryDatabase {
    async fn min_committed_seqno(&mut self) -> PurgeResult<Option<i64>> {
        let statement = &self.statements.min_committed_seqno;
        let query = sqlx::query_scalar::<_, Option<i64>>(statement).fetch_one(&mut self.connection);

        bounded(self.statement_timeout, statement, query).await
    }

    async fn expire_cutoff(&mut self, retention_days: u32) -> PurgeResult<Option<NaiveDateTime>> {
        let statement = &self.statements.expire_cutoff;
        let query = sqlx::query_scalar::<_, Option<NaiveDateTime>>(statement)
            .bind(retention_days)
            .fetch_one(&mut self.connection);

        bounded(self.statement_timeout, statement, query).await
    }

    async fn suppress_replication_logging(&mut self) -> PurgeResult<()> {
        let statement = &self.statements.suppress_replication_logging;
        let query = sqlx::Executor::execute(&mut self.connection, sqlx::raw_sql(statement));

        bounded(self.statement_timeout, statement, query).await?;

        Ok(())
    }

    async fn count_expired(&mut self, watermark: &PurgeWatermark) -> PurgeResult<u64> {
        let statement = &self.statements.count_expired;
        let query = sqlx::query_scalar::<_, i64>(statement)
            .bind(watermark.expire_cutoff)
            .bind(watermark.min_committed_seqno)
            .fetch_one(&mut self.connection);

        let count = bounded(self.statement_timeout, statement, query).await?;

        Ok(count.max(0) as u64)
    }

    async fn delete_expired_batch(
        &mut self,
        watermark: &PurgeWatermark,
        batch_size: u64,
    ) -> PurgeResult<u64> {
        let statement = &self.statements.delete_expired_batch;
        let query = sqlx::query(statement)
            .bind(watermark.expire_cutoff)
            .bind(watermark.min_committed_seqno)
            .bind(batch_size)
            .execute(&mut self.connection);

        let result = bounded(self.statement_timeout, statement, query).await?;

        Ok(result.rows_affected())
    }
}
