use tracing::{debug, info};

use crate::bail;
use crate::database::HistoryDatabase;
use crate::error::{ErrorKind, PurgeResult};
use crate::types::{BatchResult, PurgeEstimate, PurgeOutcome, PurgeSessionResult, PurgeWatermark};

/// Progress of the batch loop, readable even after the loop failed or was abandoned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeProgress {
    pub batches: u64,
    pub total_rows_deleted: u64,
}

/// Computes the purge watermark and deletes qualifying history rows in bounded batches.
#[derive(Debug)]
pub struct PurgeEngine<D> {
    database: D,
    progress: PurgeProgress,
}

impl<D> PurgeEngine<D>
where
    D: HistoryDatabase,
{
    pub fn new(database: D) -> Self {
        Self {
            database,
            progress: PurgeProgress::default(),
        }
    }

    pub fn progress(&self) -> PurgeProgress {
        self.progress
    }

    pub fn into_database(self) -> D {
        self.database
    }

    /// Reads the lowest committed sequence number and the expiration cutoff.
    ///
    /// An empty progress table leaves no safe watermark and is reported as a
    /// [`ErrorKind::QueryError`].
    pub async fn compute_watermark(&mut self, retention_days: u32) -> PurgeResult<PurgeWatermark> {
        let Some(min_committed_seqno) = self.database.min_committed_seqno().await? else {
            bail!(
                ErrorKind::QueryError,
                "No committed sequence number found",
                "the replication progress table is empty, no safe watermark exists"
            );
        };

        let Some(expire_cutoff) = self.database.expire_cutoff(retention_days).await? else {
            bail!(
                ErrorKind::QueryError,
                "No expiration cutoff returned",
                format!("retention of {retention_days} days")
            );
        };

        let watermark = PurgeWatermark {
            min_committed_seqno,
            expire_cutoff,
        };

        info!(
            min_committed_seqno,
            %expire_cutoff,
            retention_days,
            "computed purge watermark"
        );

        Ok(watermark)
    }

    /// Counts the rows the purge would delete. May scan the whole table.
    pub async fn estimate(&mut self, watermark: &PurgeWatermark) -> PurgeResult<PurgeEstimate> {
        let qualifying_rows = self.database.count_expired(watermark).await?;

        info!(qualifying_rows, "estimated rows eligible for purge");

        Ok(PurgeEstimate { qualifying_rows })
    }

    /// Deletes qualifying rows `batch_size` at a time with replication logging suppressed.
    ///
    /// The loop stops after the first batch if nothing was deleted, continues while a batch
    /// deletes exactly `batch_size` rows, and stops at the first shorter batch.
    pub async fn purge_batches(
        &mut self,
        watermark: &PurgeWatermark,
        batch_size: u64,
    ) -> PurgeResult<PurgeSessionResult> {
        if batch_size == 0 {
            bail!(ErrorKind::ConfigError, "Batch size must be positive");
        }

        self.progress = PurgeProgress::default();

        self.database.suppress_replication_logging().await?;
        debug!("replication logging suppressed for this session");

        loop {
            let batch = BatchResult {
                rows_deleted: self
                    .database
                    .delete_expired_batch(watermark, batch_size)
                    .await?,
            };

            self.progress.batches += 1;
            self.progress.total_rows_deleted += batch.rows_deleted;

            info!(
                batch = self.progress.batches,
                rows_deleted = batch.rows_deleted,
                total_rows_deleted = self.progress.total_rows_deleted,
                "deleted batch of history rows"
            );

            if self.progress.total_rows_deleted == 0 {
                return Ok(PurgeSessionResult {
                    total_rows_deleted: 0,
                    outcome: PurgeOutcome::NoRows,
                });
            }

            if batch.rows_deleted == batch_size {
                continue;
            }

            return Ok(PurgeSessionResult {
                total_rows_deleted: self.progress.total_rows_deleted,
                outcome: PurgeOutcome::Completed,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::database::{DatabaseCall, FakeHistoryDatabase};

    async fn purge(
        database: &FakeHistoryDatabase,
        batch_size: u64,
    ) -> (PurgeResult<PurgeSessionResult>, PurgeProgress) {
        let mut engine = PurgeEngine::new(database.clone());
        let watermark = engine.compute_watermark(3).await.unwrap();
        let result = engine.purge_batches(&watermark, batch_size).await;

        (result, engine.progress())
    }

    #[tokio::test]
    async fn stops_at_first_short_batch() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(25, 0);

        let (result, progress) = purge(&database, 10).await;

        assert_eq!(
            result.unwrap(),
            PurgeSessionResult {
                total_rows_deleted: 25,
                outcome: PurgeOutcome::Completed,
            }
        );
        assert_eq!(progress.batches, 3);
        assert_eq!(database.deleted_per_batch().await, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_batch() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(20, 0);

        let (result, progress) = purge(&database, 10).await;

        assert_eq!(result.unwrap().outcome, PurgeOutcome::Completed);
        assert_eq!(progress.batches, 3);
        assert_eq!(database.deleted_per_batch().await, vec![10, 10, 0]);
    }

    #[tokio::test]
    async fn nothing_to_delete_takes_one_batch() {
        let database = FakeHistoryDatabase::new(1000);

        let (result, _) = purge(&database, 10).await;

        assert_eq!(
            result.unwrap(),
            PurgeSessionResult {
                total_rows_deleted: 0,
                outcome: PurgeOutcome::NoRows,
            }
        );
        assert_eq!(database.deleted_per_batch().await, vec![0]);
    }

    #[tokio::test]
    async fn rows_at_or_above_watermark_survive_zero_retention() {
        // Rows that are old by wall clock but not yet committed on every channel.
        let database = FakeHistoryDatabase::new(1000)
            .with_expired_rows(5, 0)
            .with_expired_rows(5, 1000);

        let mut engine = PurgeEngine::new(database.clone());
        let watermark = engine.compute_watermark(0).await.unwrap();
        let result = engine.purge_batches(&watermark, 100).await.unwrap();

        assert_eq!(result.total_rows_deleted, 5);
        assert!(
            database
                .remaining_seqnos()
                .await
                .iter()
                .all(|seqno| *seqno >= 1000)
        );
        assert_eq!(database.remaining_seqnos().await.len(), 5);
    }

    #[tokio::test]
    async fn every_delete_runs_with_replication_logging_suppressed() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(30, 0);

        purge(&database, 10).await.0.unwrap();

        let calls = database.calls().await;
        let first_delete = calls
            .iter()
            .position(|call| matches!(call, DatabaseCall::DeleteBatch { .. }))
            .unwrap();
        let suppression = calls
            .iter()
            .position(|call| *call == DatabaseCall::SuppressReplicationLogging)
            .unwrap();

        assert!(suppression < first_delete);
        assert!(calls.iter().all(|call| match call {
            DatabaseCall::DeleteBatch {
                replication_logging_suppressed,
                ..
            } => *replication_logging_suppressed,
            _ => true,
        }));
    }

    #[tokio::test]
    async fn empty_progress_table_has_no_watermark() {
        let database = FakeHistoryDatabase::without_progress();
        let mut engine = PurgeEngine::new(database.clone());

        let err = engine.compute_watermark(3).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QueryError);
        assert!(database.deleted_per_batch().await.is_empty());
    }

    #[tokio::test]
    async fn failed_delete_aborts_the_loop_and_keeps_progress() {
        let database = FakeHistoryDatabase::new(1000).with_expired_rows(50, 0);
        database.fail_delete_on_batch(3).await;

        let (result, progress) = purge(&database, 10).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::QueryError);
        assert_eq!(
            progress,
            PurgeProgress {
                batches: 2,
                total_rows_deleted: 20,
            }
        );
    }

    #[tokio::test]
    async fn estimate_counts_without_deleting() {
        let database = FakeHistoryDatabase::new(1000)
            .with_expired_rows(7, 0)
            .with_recent_rows(4, 0);
        let mut engine = PurgeEngine::new(database.clone());

        let watermark = engine.compute_watermark(3).await.unwrap();
        let estimate = engine.estimate(&watermark).await.unwrap();

        assert_eq!(estimate.qualifying_rows, 7);
        assert_eq!(database.remaining_seqnos().await.len(), 11);
    }
}
