//! In-memory doubles of the database and cluster control gateways.

pub mod cluster;
pub mod database;
