use std::{fmt, io::Write, time::Instant};

use anyhow::{bail, Result};
use candle_core::Device;
use candle_nn::Optimizer;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use super::epoch::{evaluate, train_epoch, Evaluation};
use crate::datasets::{GraphLoader, Partition};
use crate::metrics::{aggregate, Metrics};
use crate::models::GraphClassifier;

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// L2 penalty coefficient added to the training objective.
    pub weight_decay: f64,
    /// Seeds the per-epoch shuffling of the training partition.
    pub seed: u64,
    /// Draw an epoch progress bar on stderr.
    pub progress: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    TrainingEpoch(usize),
    Validating(usize),
    Testing,
    Done,
}

pub struct Splits<'a> {
    pub train: Partition<'a>,
    pub val: Partition<'a>,
    pub test: Partition<'a>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub train: Metrics,
    pub val: Evaluation,
}
impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "loss_train: {:.4}, acc_train: {:.4}, recall_train: {:.4}, loss_val: {:.4}, acc_val: {:.4}, recall_val: {:.4}",
            self.train_loss,
            self.train.accuracy,
            self.train.recall,
            self.val.loss,
            self.val.metrics.accuracy,
            self.val.metrics.recall,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TestSummary(pub Evaluation);
impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let m = &self.0.metrics;
        write!(
            f,
            "Test set results: acc: {:.4}, f1_macro: {:.4}, precision: {:.4}, recall: {:.4}",
            m.accuracy, m.f1_macro, m.precision, m.recall,
        )
    }
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub epochs: Vec<EpochSummary>,
    pub test: TestSummary,
}

/// Runs `epochs` rounds of training and validation, then one test pass.
pub struct Trainer<M, O> {
    model: M,
    optimizer: O,
    config: TrainConfig,
    device: Device,
    rng: StdRng,
    phase: Phase,
}
impl<M: GraphClassifier, O: Optimizer> Trainer<M, O> {
    pub fn new(model: M, optimizer: O, config: TrainConfig, device: Device) -> Self {
        Self {
            model,
            optimizer,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            phase: Phase::Initializing,
        }
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn model(&self) -> &M {
        &self.model
    }
    pub fn into_model(self) -> M {
        self.model
    }
    fn transition(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// Writes one line per epoch and a final test line to `out`.
    pub fn run<W: Write>(&mut self, splits: &Splits, out: &mut W) -> Result<RunReport> {
        if self.phase != Phase::Initializing {
            bail!("trainer already used ({:?})", self.phase);
        }
        info!(
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            epochs = self.config.epochs,
            "start training"
        );
        let batch_size = self.config.batch_size;
        let pbar = if self.config.progress {
            let pbar = ProgressBar::new(self.config.epochs as u64);
            pbar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} epochs ({eta})")?
                    .progress_chars("#>-"),
            );
            pbar
        } else {
            ProgressBar::hidden()
        };

        let mut epochs = Vec::with_capacity(self.config.epochs);
        for epoch in 0..self.config.epochs {
            let start = Instant::now();

            self.transition(Phase::TrainingEpoch(epoch));
            let loader = GraphLoader::shuffled(&splits.train, batch_size, &self.device, &mut self.rng);
            let train = train_epoch(
                &mut self.model,
                &mut self.optimizer,
                loader,
                self.config.weight_decay,
            )?;
            let train_metrics = aggregate(&train.records);

            self.transition(Phase::Validating(epoch));
            let loader = GraphLoader::new(&splits.val, batch_size, &self.device);
            let val = evaluate(&mut self.model, loader)?;

            let summary = EpochSummary {
                epoch,
                train_loss: train.loss,
                train: train_metrics,
                val,
            };
            pbar.suspend(|| writeln!(out, "{}", summary))?;
            debug!(
                epoch,
                batches = train.records.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "epoch done"
            );
            pbar.inc(1);
            epochs.push(summary);
        }
        pbar.finish_and_clear();

        self.transition(Phase::Testing);
        let loader = GraphLoader::new(&splits.test, batch_size, &self.device);
        let test = TestSummary(evaluate(&mut self.model, loader)?);
        writeln!(out, "{}", test)?;
        self.transition(Phase::Done);

        Ok(RunReport { epochs, test })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{toy_graphs, RandomSplit};
    use crate::models::{GatClassifier, ModelConfig, Mode};
    use candle_nn::{AdamW, ParamsAdamW};
    use regex::Regex;

    fn trainer(epochs: usize, device: &Device) -> Result<Trainer<GatClassifier, AdamW>> {
        let model = GatClassifier::new(&ModelConfig::new(3, 8, 2), device)?;
        let optimizer = AdamW::new(
            model.parameters(),
            ParamsAdamW {
                lr: 0.001,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let config = TrainConfig {
            epochs,
            batch_size: 10,
            weight_decay: 0.01,
            seed: 777,
            progress: false,
        };
        Ok(Trainer::new(model, optimizer, config, device.clone()))
    }

    #[test]
    fn prints_one_line_per_epoch_and_a_test_line() -> Result<()> {
        let device = Device::Cpu;
        let dataset = toy_graphs(100, 777)?;
        let [train, val, test] = (&dataset).random_split([0.6, 0.1, 0.3], 777)?;
        let mut trainer = trainer(2, &device)?;
        assert_eq!(trainer.phase(), Phase::Initializing);

        let mut out = Vec::new();
        let report = trainer.run(&Splits { train, val, test }, &mut out)?;
        let text = String::from_utf8(out)?;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("loss_train: "));
        assert!(lines[1].starts_with("loss_train: "));
        assert!(lines[2].starts_with("Test set results: "));
        assert_eq!(report.epochs.len(), 2);
        assert_eq!(lines[2], report.test.to_string());

        let values = Regex::new(r"(acc|recall|precision|f1_macro)(_train|_val)?: (\d+\.\d+)")?;
        let mut count = 0;
        for c in values.captures_iter(&text) {
            let v: f64 = c[3].parse()?;
            assert!((0.0..=1.0).contains(&v), "{}", &c[0]);
            count += 1;
        }
        assert_eq!(count, 2 * 4 + 4);

        assert_eq!(trainer.phase(), Phase::Done);
        assert_eq!(trainer.model().mode(), Mode::Train);
        let model = trainer.into_model();
        assert_eq!(model.parameters().len(), 12);
        Ok(())
    }

    #[test]
    fn zero_epochs_only_tests() -> Result<()> {
        let device = Device::Cpu;
        let dataset = toy_graphs(20, 0)?;
        let [train, val, test] = (&dataset).random_split([0.6, 0.1, 0.3], 0)?;
        let mut out = Vec::new();
        let report = trainer(0, &device)?.run(&Splits { train, val, test }, &mut out)?;
        assert!(report.epochs.is_empty());
        assert_eq!(String::from_utf8(out)?.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn trainer_runs_once() -> Result<()> {
        let device = Device::Cpu;
        let dataset = toy_graphs(20, 0)?;
        let split = |seed| (&dataset).random_split([0.6, 0.1, 0.3], seed);
        let mut trainer = trainer(1, &device)?;

        let [train, val, test] = split(1)?;
        trainer.run(&Splits { train, val, test }, &mut std::io::sink())?;
        let [train, val, test] = split(1)?;
        assert!(trainer.run(&Splits { train, val, test }, &mut std::io::sink()).is_err());
        Ok(())
    }
}
