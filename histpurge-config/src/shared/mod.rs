mod base;
mod cluster;
mod connection;
mod controller;
mod history;
mod logging;
mod purge;
mod sentry;

pub use base::*;
pub use cluster::*;
pub use connection::*;
pub use controller::*;
pub use history::*;
pub use logging::*;
pub use purge::*;
pub use sentry::*;
