use anyhow::{bail, Result};

/// A single labelled graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    /// Row-major `(num_nodes, num_features)` node features.
    pub x: Vec<f32>,
    pub num_nodes: usize,
    /// Local `(source, target)` pairs.
    pub edges: Vec<(u32, u32)>,
    pub y: u32,
}
impl Graph {
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Clone)]
pub struct GraphDataset {
    pub name: String,
    pub num_features: usize,
    pub num_classes: usize,
    graphs: Vec<Graph>,
}
impl GraphDataset {
    pub fn new(
        name: impl Into<String>,
        num_features: usize,
        num_classes: usize,
        graphs: Vec<Graph>,
    ) -> Result<Self> {
        let name = name.into();
        for (idx, g) in graphs.iter().enumerate() {
            if g.x.len() != g.num_nodes * num_features {
                bail!(
                    "{}: graph {} has {} feature values, expected {}x{}",
                    name,
                    idx,
                    g.x.len(),
                    g.num_nodes,
                    num_features
                );
            }
            if let Some(&(u, v)) = g
                .edges
                .iter()
                .find(|&&(u, v)| u as usize >= g.num_nodes || v as usize >= g.num_nodes)
            {
                bail!("{}: graph {} has edge ({}, {}) out of range", name, idx, u, v);
            }
            if g.y as usize >= num_classes {
                bail!("{}: graph {} has label {} >= {}", name, idx, g.y, num_classes);
            }
        }
        Ok(Self {
            name,
            num_features,
            num_classes,
            graphs,
        })
    }
    pub fn len(&self) -> usize {
        self.graphs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
    pub fn get(&self, idx: usize) -> Option<&Graph> {
        self.graphs.get(idx)
    }
    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }
}

/// A subset of a dataset, addressed by graph index.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    dataset: &'a GraphDataset,
    indices: Vec<usize>,
}
impl<'a> Partition<'a> {
    pub fn new(dataset: &'a GraphDataset, indices: Vec<usize>) -> Self {
        assert!(indices.iter().all(|&i| i < dataset.len()));
        Self { dataset, indices }
    }
    pub fn dataset(&self) -> &'a GraphDataset {
        self.dataset
    }
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
