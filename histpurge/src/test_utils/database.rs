use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::concurrency::shutdown::{InterruptSignal, ShutdownTx};
use crate::database::HistoryDatabase;
use crate::error::{ErrorKind, PurgeResult};
use crate::purge_error;
use crate::types::PurgeWatermark;

/// Age of the rows created by [`FakeHistoryDatabase::with_expired_rows`].
const EXPIRED_ROW_AGE_DAYS: i64 = 30;

/// A call received by [`FakeHistoryDatabase`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseCall {
    MinCommittedSeqno,
    ExpireCutoff {
        retention_days: u32,
    },
    SuppressReplicationLogging,
    CountExpired,
    DeleteBatch {
        batch_size: u64,
        rows_deleted: u64,
        replication_logging_suppressed: bool,
    },
}

#[derive(Debug)]
struct Inner {
    now: NaiveDateTime,
    progress_seqnos: Vec<i64>,
    rows: Vec<(i64, NaiveDateTime)>,
    replication_logging_suppressed: bool,
    calls: Vec<DatabaseCall>,
    delete_batches: u64,
    fail_delete_on_batch: Option<u64>,
    interrupt_on_batch: Option<(u64, ShutdownTx, InterruptSignal)>,
}

/// In-memory history table and replication progress table.
///
/// Clones share state, so a test can hand one clone to the session and inspect another.
#[derive(Debug, Clone)]
pub struct FakeHistoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl FakeHistoryDatabase {
    /// Creates a database whose single replication channel committed `min_committed_seqno`.
    pub fn new(min_committed_seqno: i64) -> Self {
        Self::with_progress(vec![min_committed_seqno])
    }

    /// Creates a database with an empty replication progress table.
    pub fn without_progress() -> Self {
        Self::with_progress(Vec::new())
    }

    /// Creates a database with one committed sequence number per replication channel.
    pub fn with_progress(progress_seqnos: Vec<i64>) -> Self {
        let now = NaiveDate::from_ymd_opt(2026, 10, 16)
            .and_then(|date| date.and_hms_opt(3, 0, 0))
            .expect("valid fixed clock");

        let inner = Inner {
            now,
            progress_seqnos,
            rows: Vec::new(),
            replication_logging_suppressed: false,
            calls: Vec::new(),
            delete_batches: 0,
            fail_delete_on_batch: None,
            interrupt_on_batch: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Adds `count` rows processed long ago, numbered from `first_seqno`.
    pub fn with_expired_rows(self, count: usize, first_seqno: i64) -> Self {
        self.with_rows(count, first_seqno, Duration::days(EXPIRED_ROW_AGE_DAYS))
    }

    /// Adds `count` rows processed right now, numbered from `first_seqno`.
    pub fn with_recent_rows(self, count: usize, first_seqno: i64) -> Self {
        self.with_rows(count, first_seqno, Duration::zero())
    }

    fn with_rows(self, count: usize, first_seqno: i64, age: Duration) -> Self {
        {
            let mut inner = self
                .inner
                .try_lock()
                .expect("fake database is not shared yet");
            let processed_at = inner.now - age;
            inner
                .rows
                .extend((0..count as i64).map(|offset| (first_seqno + offset, processed_at)));
        }

        self
    }

    /// Makes the `batch`-th delete statement fail.
    pub async fn fail_delete_on_batch(&self, batch: u64) {
        self.inner.lock().await.fail_delete_on_batch = Some(batch);
    }

    /// Delivers `signal` while the `batch`-th delete statement is in flight. That statement
    /// never completes.
    pub async fn interrupt_on_batch(
        &self,
        batch: u64,
        shutdown_tx: ShutdownTx,
        signal: InterruptSignal,
    ) {
        self.inner.lock().await.interrupt_on_batch = Some((batch, shutdown_tx, signal));
    }

    pub async fn calls(&self) -> Vec<DatabaseCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Rows deleted by each completed delete statement.
    pub async fn deleted_per_batch(&self) -> Vec<u64> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                DatabaseCall::DeleteBatch { rows_deleted, .. } => Some(*rows_deleted),
                _ => None,
            })
            .collect()
    }

    pub async fn remaining_seqnos(&self) -> Vec<i64> {
        self.inner
            .lock()
            .await
            .rows
            .iter()
            .map(|(seqno, _)| *seqno)
            .collect()
    }
}

impl HistoryDatabase for FakeHistoryDatabase {
    async fn min_committed_seqno(&mut self) -> PurgeResult<Option<i64>> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(DatabaseCall::MinCommittedSeqno);

        Ok(inner.progress_seqnos.iter().min().copied())
    }

    async fn expire_cutoff(&mut self, retention_days: u32) -> PurgeResult<Option<NaiveDateTime>> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(DatabaseCall::ExpireCutoff { retention_days });

        Ok(Some(inner.now - Duration::days(i64::from(retention_days))))
    }

    async fn suppress_replication_logging(&mut self) -> PurgeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(DatabaseCall::SuppressReplicationLogging);
        inner.replication_logging_suppressed = true;

        Ok(())
    }

    async fn count_expired(&mut self, watermark: &PurgeWatermark) -> PurgeResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(DatabaseCall::CountExpired);

        let count = inner
            .rows
            .iter()
            .filter(|(seqno, processed_at)| watermark.admits(*seqno, *processed_at))
            .count();

        Ok(count as u64)
    }

    async fn delete_expired_batch(
        &mut self,
        watermark: &PurgeWatermark,
        batch_size: u64,
    ) -> PurgeResult<u64> {
        let interrupt = {
            let mut inner = self.inner.lock().await;
            assert!(
                inner.replication_logging_suppressed,
                "delete issued while replication logging is enabled"
            );

            inner.delete_batches += 1;
            let batch = inner.delete_batches;

            if inner.fail_delete_on_batch == Some(batch) {
                return Err(purge_error!(
                    ErrorKind::QueryError,
                    "MySQL statement failed",
                    "Lock wait timeout exceeded; try restarting transaction"
                ));
            }

            match inner.interrupt_on_batch.take() {
                Some((on_batch, shutdown_tx, signal)) if on_batch == batch => {
                    Some((shutdown_tx, signal))
                }
                other => {
                    inner.interrupt_on_batch = other;
                    None
                }
            }
        };

        if let Some((shutdown_tx, signal)) = interrupt {
            let _ = shutdown_tx.shutdown(signal);
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().await;
        let mut remaining = batch_size;
        inner.rows.retain(|(seqno, processed_at)| {
            if remaining > 0 && watermark.admits(*seqno, *processed_at) {
                remaining -= 1;
                return false;
            }

            true
        });

        let rows_deleted = batch_size - remaining;
        let replication_logging_suppressed = inner.replication_logging_suppressed;
        inner.calls.push(DatabaseCall::DeleteBatch {
            batch_size,
            rows_deleted,
            replication_logging_suppressed,
        });

        Ok(rows_deleted)
    }
}
