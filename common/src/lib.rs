pub mod config;
pub mod jtl;
pub mod plot;
pub mod report;
pub mod stats;
pub mod util;

pub const MS_PER_SECOND: f64 = 1_000.0;
