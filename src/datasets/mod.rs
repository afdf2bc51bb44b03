mod catalog;
pub use catalog::*;

mod graph;
pub use graph::*;

mod loader;
pub use loader::*;

mod split;

mod synthetic;
pub use synthetic::*;

mod traits;
pub use traits::*;

mod tu_dataset;
pub use tu_dataset::*;

mod utils;
pub use utils::*;
