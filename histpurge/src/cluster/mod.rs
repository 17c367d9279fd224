mod base;
pub mod cctrl;

pub use base::*;
