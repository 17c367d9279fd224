mod base;
pub mod mysql;
mod statements;

pub use base::*;
pub use statements::*;
