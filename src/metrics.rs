use std::collections::BTreeSet;

use candle_core::{Result, Tensor};

/// Label treated as "positive" by precision and recall.
pub const POSITIVE_CLASS: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    pub accuracy: f64,
    pub f1_macro: f64,
    pub precision: f64,
    pub recall: f64,
}
impl Metrics {
    /// Scores one batch of predictions.
    ///
    /// - `f1_macro` averages the per-class F1 over the classes that occur in
    ///   either `truth` or `predicted`.
    /// - `precision` and `recall` are computed for [`POSITIVE_CLASS`] and fall
    ///   back to 0.0 instead of dividing by zero.
    pub fn from_predictions(predicted: &[u32], truth: &[u32]) -> Self {
        assert_eq!(predicted.len(), truth.len());
        if truth.is_empty() {
            return Self::default();
        }
        let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();

        let classes: BTreeSet<u32> = predicted.iter().chain(truth).copied().collect();
        let f1_sum: f64 = classes
            .iter()
            .map(|&c| ConfusionCounts::for_class(c, predicted, truth).f1())
            .sum();

        let positive = ConfusionCounts::for_class(POSITIVE_CLASS, predicted, truth);
        Self {
            accuracy: correct as f64 / truth.len() as f64,
            f1_macro: f1_sum / classes.len() as f64,
            precision: positive.precision(),
            recall: positive.recall(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ConfusionCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
}
impl ConfusionCounts {
    fn for_class(class: u32, predicted: &[u32], truth: &[u32]) -> Self {
        let mut counts = Self::default();
        for (&p, &t) in predicted.iter().zip(truth) {
            match (p == class, t == class) {
                (true, true) => counts.tp += 1,
                (true, false) => counts.fp += 1,
                (false, true) => counts.fn_ += 1,
                (false, false) => {}
            }
        }
        counts
    }
    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }
    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }
    fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Class probabilities and ground-truth labels of one batch, copied to host memory.
#[derive(Clone, Debug)]
pub struct PredictionRecord {
    probs: Vec<Vec<f32>>,
    labels: Vec<u32>,
}
impl PredictionRecord {
    pub fn new(probs: Vec<Vec<f32>>, labels: Vec<u32>) -> Self {
        assert_eq!(probs.len(), labels.len());
        Self { probs, labels }
    }
    /// Builds a record from the `(batch, classes)` log-probabilities a model returns.
    pub fn from_log_probs(log_probs: &Tensor, labels: &Tensor) -> Result<Self> {
        let probs = log_probs.exp()?.to_vec2::<f32>()?;
        let labels = labels.to_vec1::<u32>()?;
        Ok(Self::new(probs, labels))
    }
    pub fn probs(&self) -> &[Vec<f32>] {
        &self.probs
    }
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }
    /// Argmax of every probability row; the first maximum wins ties.
    pub fn predictions(&self) -> Vec<u32> {
        self.probs
            .iter()
            .map(|row| {
                let mut best = 0;
                for (idx, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = idx;
                    }
                }
                best as u32
            })
            .collect()
    }
    pub fn metrics(&self) -> Metrics {
        Metrics::from_predictions(&self.predictions(), &self.labels)
    }
}

/// Sums per-batch metrics over one pass.
#[derive(Clone, Debug, Default)]
pub struct RunningMetrics {
    sum: Metrics,
    batches: usize,
}
impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, m: Metrics) {
        self.sum.accuracy += m.accuracy;
        self.sum.f1_macro += m.f1_macro;
        self.sum.precision += m.precision;
        self.sum.recall += m.recall;
        self.batches += 1;
    }
    pub fn batches(&self) -> usize {
        self.batches
    }
    /// Mean of the batch metrics; every batch has the same weight whatever its size.
    pub fn finalize(self) -> Metrics {
        if self.batches == 0 {
            return Metrics::default();
        }
        let n = self.batches as f64;
        Metrics {
            accuracy: self.sum.accuracy / n,
            f1_macro: self.sum.f1_macro / n,
            precision: self.sum.precision / n,
            recall: self.sum.recall / n,
        }
    }
}

/// Average of the batch-level metrics of `records`.
pub fn aggregate(records: &[PredictionRecord]) -> Metrics {
    let mut running = RunningMetrics::new();
    for record in records {
        running.push(record.metrics());
    }
    running.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn one_hot_record(predicted: &[u32], truth: &[u32], num_classes: usize) -> PredictionRecord {
        let probs = predicted
            .iter()
            .map(|&p| {
                let mut row = vec![0.0; num_classes];
                row[p as usize] = 1.0;
                row
            })
            .collect();
        PredictionRecord::new(probs, truth.to_vec())
    }

    fn assert_unit_interval(m: &Metrics) {
        for v in [m.accuracy, m.f1_macro, m.precision, m.recall] {
            assert!((0.0..=1.0).contains(&v), "{:?}", m);
        }
    }

    #[test]
    fn batch_metrics_match_hand_computation() {
        // tp=2 fp=1 fn=1 for class 1; class 0: tp=1 fp=1 fn=1
        let m = Metrics::from_predictions(&[1, 1, 0, 1, 0], &[1, 0, 1, 1, 0]);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        let f1_pos = 4.0 / 6.0;
        let f1_neg = 2.0 / 4.0;
        assert!((m.f1_macro - (f1_pos + f1_neg) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn negative_only_batch_does_not_divide_by_zero() {
        let m = Metrics::from_predictions(&[0, 0, 0], &[0, 0, 0]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1_macro, 1.0);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let records = vec![
            one_hot_record(&[0, 1, 1], &[0, 1, 1], 2),
            one_hot_record(&[1, 0], &[1, 0], 2),
        ];
        let m = aggregate(&records);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.f1_macro, 1.0);
    }

    #[test]
    fn batches_are_weighted_equally() {
        let records = vec![
            one_hot_record(&[0; 9], &[0; 9], 2),
            one_hot_record(&[1], &[0], 2),
        ];
        let m = aggregate(&records);
        assert!((m.accuracy - 0.5).abs() < 1e-12);

        let mut running = RunningMetrics::new();
        for record in &records {
            running.push(record.metrics());
        }
        assert_eq!(running.batches(), 2);
        assert_eq!(running.finalize(), m);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        assert_eq!(aggregate(&[]), Metrics::default());
    }

    #[test]
    fn random_records_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let num_classes = rng.gen_range(2..5);
            let records: Vec<_> = (0..rng.gen_range(1..6))
                .map(|_| {
                    let n = rng.gen_range(1..20);
                    let probs = (0..n)
                        .map(|_| (0..num_classes).map(|_| rng.gen::<f32>()).collect())
                        .collect();
                    let labels = (0..n).map(|_| rng.gen_range(0..num_classes as u32)).collect();
                    PredictionRecord::new(probs, labels)
                })
                .collect();
            assert_unit_interval(&aggregate(&records));
        }
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        let record = PredictionRecord::new(vec![vec![0.5, 0.5], vec![0.2, 0.8]], vec![0, 1]);
        assert_eq!(record.predictions(), vec![0, 1]);
    }

    #[test]
    fn record_from_log_probs() -> Result<()> {
        let device = Device::Cpu;
        let log_probs = Tensor::new(&[[0.9f32, 0.1], [0.3, 0.7]], &device)?.log()?;
        let labels = Tensor::new(&[0u32, 0], &device)?;
        let record = PredictionRecord::from_log_probs(&log_probs, &labels)?;
        assert_eq!(record.labels(), &[0, 0]);
        assert!((record.probs()[1][1] - 0.7).abs() < 1e-6);
        assert_eq!(record.predictions(), vec![0, 1]);
        Ok(())
    }
}
