use candle_core::{DType, Device, Result, Tensor, Var, D};
use candle_nn::{ops, Dropout, Linear, Module, VarBuilder, VarMap};

use super::traits::{GraphClassifier, Mode};
use super::utils::linear;
use crate::nn::{
    utils::{global_mean_pool, selu},
    GatConv, GnnModule,
};

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub num_features: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    pub dropout_rate: f32,
}
impl ModelConfig {
    pub fn new(num_features: usize, hidden_dim: usize, num_classes: usize) -> Self {
        Self {
            num_features,
            hidden_dim,
            num_classes,
            dropout_rate: 0.5,
        }
    }
}

/// Two GAT layers, mean pooling and a two-layer head, with SELU in between.
///
/// ```text
/// x -> gat(F, 2h) -> gat(2h, 2h) -> mean_pool -> linear(2h, h) -> dropout -> linear(h, C) -> log_softmax
/// ```
pub struct GatClassifier {
    conv1: GatConv,
    conv2: GatConv,
    fc1: Linear,
    fc2: Linear,
    dropout: Dropout,
    mode: Mode,
    varmap: VarMap,
}
impl GatClassifier {
    pub fn new(config: &ModelConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let h = config.hidden_dim;
        Ok(Self {
            conv1: GatConv::new(config.num_features, 2 * h, vs.pp("conv1"))?,
            conv2: GatConv::new(2 * h, 2 * h, vs.pp("conv2"))?,
            fc1: linear(2 * h, h, vs.pp("fc1"))?,
            fc2: linear(h, config.num_classes, vs.pp("fc2"))?,
            dropout: Dropout::new(config.dropout_rate),
            mode: Mode::Train,
            varmap,
        })
    }
}
impl GraphClassifier for GatClassifier {
    fn forward(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        batch: &Tensor,
        num_graphs: usize,
    ) -> Result<Tensor> {
        let train = self.mode.is_train();
        let h = selu(&self.conv1.forward_t(x, edge_index, train)?)?;
        let h = selu(&self.conv2.forward_t(&h, edge_index, train)?)?;
        let h = selu(&global_mean_pool(&h, batch, num_graphs)?)?;
        let h = selu(&self.fc1.forward(&h)?)?;
        let h = self.dropout.forward(&h, train)?;
        let h = self.fc2.forward(&h)?;
        ops::log_softmax(&h, D::Minus1)
    }
    fn mode(&self) -> Mode {
        self.mode
    }
    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
    fn parameters(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}
