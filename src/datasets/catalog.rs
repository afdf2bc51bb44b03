use std::path::Path;

use anyhow::Result;

use super::{toy_graphs, GraphDataset, TuDataset};

/// Datasets the trainer knows how to obtain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DatasetName {
    #[value(name = "DD")]
    Dd,
    #[value(name = "PROTEINS")]
    Proteins,
    #[value(name = "NCI1")]
    Nci1,
    #[value(name = "NCI109")]
    Nci109,
    #[value(name = "Mutagenicity")]
    Mutagenicity,
    #[value(name = "ENZYMES")]
    Enzymes,
    /// Generated ring-vs-star graphs, no download.
    #[value(name = "SYNTHETIC")]
    Synthetic,
}
impl DatasetName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dd => "DD",
            Self::Proteins => "PROTEINS",
            Self::Nci1 => "NCI1",
            Self::Nci109 => "NCI109",
            Self::Mutagenicity => "Mutagenicity",
            Self::Enzymes => "ENZYMES",
            Self::Synthetic => "SYNTHETIC",
        }
    }

    /// TU datasets live in `root/<NAME>`; `num_graphs` and `seed` only shape the synthetic one.
    pub fn load<P: AsRef<Path>>(&self, root: P, num_graphs: usize, seed: u64) -> Result<GraphDataset> {
        match self {
            Self::Synthetic => toy_graphs(num_graphs, seed),
            name => TuDataset::new(root.as_ref().join(name.as_str()), name.as_str()).load(),
        }
    }
}
impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
