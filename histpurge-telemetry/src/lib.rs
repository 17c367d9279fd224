//! Audit logging for the history purge controller.
//!
//! Every state transition, batch progress update and error is written both to standard
//! output and to an append-only log file, each line carrying a timestamp.

pub mod tracing;
