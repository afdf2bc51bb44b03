use candle_core::{Result, Tensor};

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

/// `scale * (max(0, x) + alpha * (exp(min(0, x)) - 1))`
pub fn selu(xs: &Tensor) -> Result<Tensor> {
    let negative = xs.minimum(0f32)?.exp()?.affine(SELU_ALPHA, -SELU_ALPHA)?;
    (xs.relu()? + negative)?.affine(SELU_SCALE, 0.0)
}

/// Appends the edge `(i, i)` for every node.
pub fn add_self_loops(edge_index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let loops = Tensor::arange(0u32, num_nodes as u32, edge_index.device())?;
    let loops = Tensor::stack(&[&loops, &loops], 0)?;
    if edge_index.dim(1)? == 0 {
        return Ok(loops);
    }
    Tensor::cat(&[edge_index, &loops], 1)
}

/// Averages the rows of `xs` that share a graph id in `batch`.
///
/// Returns `(num_graphs, dim)`; graphs without nodes pool to zero.
pub fn global_mean_pool(xs: &Tensor, batch: &Tensor, num_graphs: usize) -> Result<Tensor> {
    let (num_nodes, dim) = xs.dims2()?;
    let sums = Tensor::zeros((num_graphs, dim), xs.dtype(), xs.device())?.index_add(batch, xs, 0)?;
    let counts = Tensor::zeros(num_graphs, xs.dtype(), xs.device())?
        .index_add(batch, &Tensor::ones(num_nodes, xs.dtype(), xs.device())?, 0)?
        .maximum(1f32)?
        .reshape((num_graphs, 1))?;
    sums.broadcast_div(&counts)
}
