//! Safe batch purge of a replicated history table.
//!
//! A [`session::PurgeSession`] optionally isolates the target node through the cluster
//! coordinator, deletes expired history rows below the replication watermark in bounded
//! batches, and restores the node state exactly once on every exit path.

pub mod cluster;
pub mod concurrency;
pub mod database;
pub mod engine;
pub mod error;
pub mod isolation;
mod macros;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
