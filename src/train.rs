mod driver;
pub use driver::{EpochSummary, Phase, RunReport, Splits, TestSummary, TrainConfig, Trainer};
mod epoch;
pub use epoch::{evaluate, train_epoch, Evaluation, TrainOutput};
