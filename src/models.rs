mod traits;
pub use traits::{GraphClassifier, Mode};
mod utils;

mod gat;
pub use gat::{GatClassifier, ModelConfig};
