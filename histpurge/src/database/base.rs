use chrono::NaiveDateTime;
use std::future::Future;

use crate::error::PurgeResult;
use crate::types::PurgeWatermark;

/// Gateway to the database holding the history table.
///
/// Every method maps to exactly one statement, executed on a single session so that the
/// replication logging setting applies to all deletes that follow it.
pub trait HistoryDatabase {
    /// Returns the lowest committed sequence number across all replication channels, or
    /// `None` if the progress table is empty.
    fn min_committed_seqno(&mut self) -> impl Future<Output = PurgeResult<Option<i64>>> + Send;

    /// Returns the server time minus `retention_days` days.
    fn expire_cutoff(
        &mut self,
        retention_days: u32,
    ) -> impl Future<Output = PurgeResult<Option<NaiveDateTime>>> + Send;

    /// Stops the statements of this session from being written to the replication log.
    fn suppress_replication_logging(&mut self) -> impl Future<Output = PurgeResult<()>> + Send;

    /// Counts the rows admitted by `watermark` without modifying them.
    fn count_expired(
        &mut self,
        watermark: &PurgeWatermark,
    ) -> impl Future<Output = PurgeResult<u64>> + Send;

    /// Deletes at most `batch_size` rows admitted by `watermark` and returns the affected
    /// row count.
    fn delete_expired_batch(
        &mut self,
        watermark: &PurgeWatermark,
        batch_size: u64,
    ) -> impl Future<Output = PurgeResult<u64>> + Send;
}
