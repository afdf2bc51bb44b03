use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::{ops, Init, VarBuilder};

use super::traits::GnnModule;
use super::utils::add_self_loops;

pub struct GatParams {
    pub num_heads: usize,
    pub negative_slope: f64,
    pub attention_dropout_rate: f32,
}
impl Default for GatParams {
    fn default() -> Self {
        Self {
            num_heads: 1,
            negative_slope: 0.2,
            attention_dropout_rate: 0.0,
        }
    }
}

/// https://arxiv.org/abs/1710.10903
/// - messages flow from `edge_index[0]` to `edge_index[1]`
/// - every node also attends to itself
/// - heads are concatenated
pub struct GatConv {
    in_dim: usize,
    out_dim: usize,
    num_heads: usize,
    dropout: f32,
    negative_slope: f64,
    weight: Tensor,
    att_src: Tensor,
    att_dst: Tensor,
    bias: Tensor,
}
impl GatConv {
    pub fn new(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Self> {
        Self::with_params(in_dim, out_dim, GatParams::default(), vs)
    }
    pub fn with_params(
        in_dim: usize,
        out_dim: usize,
        params: GatParams,
        vs: VarBuilder,
    ) -> Result<Self> {
        let num_heads = params.num_heads;
        assert!(out_dim % num_heads == 0);
        let hidden_dim = out_dim / num_heads;

        // Xavier Uniform
        let bound = (6.0 / (in_dim + out_dim) as f64).sqrt();
        let att_bound = (6.0 / (1 + hidden_dim) as f64).sqrt();
        Ok(Self {
            in_dim,
            out_dim,
            weight: vs.get_with_hints(
                (in_dim, out_dim),
                "weight",
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                },
            )?,
            att_src: vs.get_with_hints(
                (1, num_heads, hidden_dim),
                "att_src",
                Init::Uniform {
                    lo: -att_bound,
                    up: att_bound,
                },
            )?,
            att_dst: vs.get_with_hints(
                (1, num_heads, hidden_dim),
                "att_dst",
                Init::Uniform {
                    lo: -att_bound,
                    up: att_bound,
                },
            )?,
            bias: vs.get_with_hints((1, out_dim), "bias", Init::Const(0.0))?,
            num_heads,
            negative_slope: params.negative_slope,
            dropout: params.attention_dropout_rate,
        })
    }
}
impl GatConv {
    /// Normalised attention of every edge, shape `(E, heads, 1)`.
    /// `source`/`target` must already contain the self loops.
    fn attention(
        &self,
        h: &Tensor,
        source: &Tensor,
        target: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let num_nodes = h.dim(0)?;
        let a_src = h.broadcast_mul(&self.att_src)?.sum_keepdim(D::Minus1)?; // (n, h, 1)
        let a_dst = h.broadcast_mul(&self.att_dst)?.sum_keepdim(D::Minus1)?;
        let logits = ops::leaky_relu(
            &(a_src.i(source)? + a_dst.i(target)?)?,
            self.negative_slope,
        )?;
        let shift = scatter_max(&logits, target, num_nodes)?;
        let a_edge = logits.sub(&shift.i(target)?)?.exp()?;
        let a_sum = Tensor::zeros((num_nodes, self.num_heads, 1), h.dtype(), h.device())?
            .index_add(target, &a_edge, 0)?;
        let a_edge = a_edge.broadcast_div(&a_sum.i(target)?.affine(1.0, 1e-16)?)?;
        if train && self.dropout > 0.0 {
            ops::dropout(&a_edge, self.dropout)
        } else {
            Ok(a_edge)
        }
    }
}
impl GnnModule for GatConv {
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> Result<Tensor> {
        assert_eq!(x.shape().rank(), 2);
        assert_eq!(x.shape().dims()[1], self.in_dim);
        let hidden_dim = self.out_dim / self.num_heads;
        let num_nodes = x.shape().dims()[0];

        let edge_index = add_self_loops(edge_index, num_nodes)?;
        let source = edge_index.i((0, ..))?;
        let target = edge_index.i((1, ..))?;

        let h = x
            .matmul(&self.weight)?
            .reshape((num_nodes, self.num_heads, hidden_dim))?;
        let attention = self.attention(&h, &source, &target, train)?;

        h.zeros_like()?
            .index_add(&target, &h.i(&source)?.broadcast_mul(&attention)?, 0)?
            .reshape((num_nodes, self.out_dim))?
            .broadcast_add(&self.bias)
    }
}

/// Per-target maximum of `values` `(E, heads, 1)`, as a constant `(n, heads, 1)` tensor.
///
/// Subtracting it leaves the softmax unchanged and keeps every `exp()` in range.
fn scatter_max(values: &Tensor, target: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let num_heads = values.dim(1)?;
    let rows = values.to_dtype(DType::F32)?.squeeze(2)?.to_vec2::<f32>()?;
    let target = target.to_vec1::<u32>()?;
    let mut max = vec![f32::NEG_INFINITY; num_nodes * num_heads];
    for (row, &t) in rows.iter().zip(&target) {
        for (head, &v) in row.iter().enumerate() {
            let m = &mut max[t as usize * num_heads + head];
            *m = m.max(v);
        }
    }
    // nodes without incoming edges are never gathered
    for m in max.iter_mut().filter(|m| !m.is_finite()) {
        *m = 0.0;
    }
    Tensor::from_vec(max, (num_nodes, num_heads, 1), values.device())?.to_dtype(values.dtype())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn output_has_one_row_per_node() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let conv = GatConv::with_params(
            3,
            8,
            GatParams {
                num_heads: 2,
                ..Default::default()
            },
            vs.pp("gat"),
        )?;
        let x = Tensor::randn(0f32, 1.0, (4, 3), &device)?;
        let edge_index = Tensor::new(&[[0u32, 1, 2], [1, 2, 3]], &device)?;
        let h = conv.forward(&x, &edge_index)?;
        assert_eq!(h.dims(), &[4, 8]);
        assert!(h.to_vec2::<f32>()?.iter().flatten().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn isolated_node_only_sees_itself() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let conv = GatConv::new(2, 2, vs)?;
        let x = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.0]], &device)?;
        let no_edges = Tensor::from_vec(Vec::<u32>::new(), (2, 0), &device)?;

        // with only self loops the attention weight is 1 and the layer is linear
        let h = conv.forward(&x, &no_edges)?;
        let expected = x.matmul(&conv.weight)?.broadcast_add(&conv.bias)?;
        let diff = (h - expected)?.abs()?.max_keepdim(0)?.max_keepdim(1)?;
        assert!(diff.flatten_all()?.to_vec1::<f32>()?[0] < 1e-5);
        Ok(())
    }

    // in = out = 1 with fixed parameters
    fn scalar_conv(varmap: &mut VarMap, att_src: f32, att_dst: f32) -> Result<GatConv> {
        let device = Device::Cpu;
        let vs = VarBuilder::from_varmap(varmap, DType::F32, &device);
        let conv = GatConv::new(1, 1, vs)?;
        varmap.set_one("weight", Tensor::new(&[[1f32]], &device)?)?;
        varmap.set_one("att_src", Tensor::new(&[[[att_src]]], &device)?)?;
        varmap.set_one("att_dst", Tensor::new(&[[[att_dst]]], &device)?)?;
        varmap.set_one("bias", Tensor::new(&[[0f32]], &device)?)?;
        Ok(conv)
    }

    #[test]
    fn distant_logits_do_not_underflow() -> Result<()> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let conv = scalar_conv(&mut varmap, 0.25, 0.25)?;
        // self-loop logits are 150 and -30; a single shared shift would zero the second node
        let x = Tensor::new(&[[300f32], [-300.0]], &device)?;
        let no_edges = Tensor::from_vec(Vec::<u32>::new(), (2, 0), &device)?;

        let h = conv.forward(&x, &no_edges)?.to_vec2::<f32>()?;
        assert!((h[0][0] - 300.0).abs() < 1e-3, "{:?}", h);
        assert!((h[1][0] + 300.0).abs() < 1e-3, "{:?}", h);
        Ok(())
    }

    #[test]
    fn attention_is_a_softmax_over_incoming_edges() -> Result<()> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        // logit of an edge is the source value
        let conv = scalar_conv(&mut varmap, 1.0, 0.0)?;
        let x = Tensor::new(&[[1f32], [2.0], [3.0]], &device)?;
        let edge_index = Tensor::new(&[[0u32, 1], [2, 2]], &device)?;

        let looped = add_self_loops(&edge_index, 3)?;
        let source = looped.i((0, ..))?;
        let target = looped.i((1, ..))?;
        let h = x.reshape((3, 1, 1))?;
        let attention = conv.attention(&h, &source, &target, false)?;
        let sums = Tensor::zeros((3, 1, 1), DType::F32, &device)?
            .index_add(&target, &attention, 0)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5), "{:?}", sums);

        let out = conv.forward(&x, &edge_index)?.flatten_all()?.to_vec1::<f32>()?;
        let e = |v: f32| v.exp();
        let mean = (1.0 * e(1.0) + 2.0 * e(2.0) + 3.0 * e(3.0)) / (e(1.0) + e(2.0) + e(3.0));
        assert!((out[0] - 1.0).abs() < 1e-5);
        assert!((out[1] - 2.0).abs() < 1e-5);
        assert!((out[2] - mean).abs() < 1e-5, "{} vs {}", out[2], mean);
        Ok(())
    }
}
