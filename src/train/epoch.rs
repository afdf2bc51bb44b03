use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{loss, Optimizer};

use crate::datasets::GraphBatch;
use crate::metrics::{aggregate, Metrics, PredictionRecord};
use crate::models::{GraphClassifier, Mode};

/// Result of one pass over the training partition.
#[derive(Clone, Debug)]
pub struct TrainOutput {
    /// Sum of the per-batch mean NLL.
    pub loss: f64,
    pub records: Vec<PredictionRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    /// Sum of the per-batch mean NLL.
    pub loss: f64,
    pub metrics: Metrics,
}

/// `0.5 * Σ‖p‖²`; its gradient is the parameters themselves.
pub fn l2_penalty(params: &[Var]) -> candle_core::Result<Tensor> {
    let device = match params.first() {
        Some(p) => p.device().clone(),
        None => Device::Cpu,
    };
    let mut total = Tensor::zeros((), DType::F32, &device)?;
    for p in params {
        total = (total + p.sqr()?.sum_all()?)?;
    }
    total.affine(0.5, 0.0)
}

/// One optimizer step per batch; leaves the model in [`Mode::Train`].
///
/// `weight_decay` adds `weight_decay * p` to every gradient (L2 penalty on the
/// objective). The reported loss is the NLL alone.
pub fn train_epoch<M, O, I>(
    model: &mut M,
    optimizer: &mut O,
    batches: I,
    weight_decay: f64,
) -> Result<TrainOutput>
where
    M: GraphClassifier,
    O: Optimizer,
    I: IntoIterator<Item = Result<GraphBatch>>,
{
    model.set_mode(Mode::Train);
    let params = model.parameters();
    let mut total_loss = 0.0;
    let mut records = Vec::new();
    for batch in batches {
        let batch = batch?;
        let log_probs =
            model.forward(&batch.x, &batch.edge_index, &batch.batch, batch.num_graphs)?;
        let loss = loss::nll(&log_probs, &batch.y)?;
        let objective = if weight_decay > 0.0 {
            (&loss + l2_penalty(&params)?.affine(weight_decay, 0.0)?)?
        } else {
            loss.clone()
        };
        // candle builds a fresh gradient store on every backward pass
        optimizer.backward_step(&objective)?;
        total_loss += loss.to_scalar::<f32>()? as f64;
        records.push(PredictionRecord::from_log_probs(&log_probs, &batch.y)?);
    }
    Ok(TrainOutput {
        loss: total_loss,
        records,
    })
}

/// Forward-only pass in [`Mode::Eval`]; the previous mode is restored afterwards, even on error.
pub fn evaluate<M, I>(model: &mut M, batches: I) -> Result<Evaluation>
where
    M: GraphClassifier,
    I: IntoIterator<Item = Result<GraphBatch>>,
{
    let previous = model.mode();
    model.set_mode(Mode::Eval);
    let result = forward_only(&*model, batches);
    model.set_mode(previous);

    let (loss, records) = result?;
    Ok(Evaluation {
        loss,
        metrics: aggregate(&records),
    })
}

fn forward_only<M, I>(model: &M, batches: I) -> Result<(f64, Vec<PredictionRecord>)>
where
    M: GraphClassifier,
    I: IntoIterator<Item = Result<GraphBatch>>,
{
    let mut total_loss = 0.0;
    let mut records = Vec::new();
    for batch in batches {
        let batch = batch?;
        let log_probs =
            model.forward(&batch.x, &batch.edge_index, &batch.batch, batch.num_graphs)?;
        total_loss += loss::nll(&log_probs, &batch.y)?.to_scalar::<f32>()? as f64;
        records.push(PredictionRecord::from_log_probs(&log_probs, &batch.y)?);
    }
    Ok((total_loss, records))
}
