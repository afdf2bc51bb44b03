mod traits;
pub use traits::*;
pub mod utils;

mod gat;
pub use gat::{GatConv, GatParams};
