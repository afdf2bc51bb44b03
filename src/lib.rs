pub mod datasets;
pub mod metrics;
pub mod models;
pub mod nn;
pub mod train;
pub mod utils;
