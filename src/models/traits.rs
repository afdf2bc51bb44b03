use candle_core::{Result, Tensor, Var};

/// Training enables dropout; evaluation is deterministic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}
impl Mode {
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }
}

pub trait GraphClassifier {
    /// Log-probabilities of shape `(num_graphs, num_classes)`.
    fn forward(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        batch: &Tensor,
        num_graphs: usize,
    ) -> Result<Tensor>;
    fn mode(&self) -> Mode;
    fn set_mode(&mut self, mode: Mode);
    fn parameters(&self) -> Vec<Var>;
}
