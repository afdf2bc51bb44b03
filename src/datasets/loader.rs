use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::{seq::SliceRandom, Rng};

use super::{Graph, GraphDataset, Partition};

/// Several graphs glued into one disconnected graph.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// `(num_nodes, num_features)`
    pub x: Tensor,
    /// `(2, num_edges)`, u32, node ids offset per graph
    pub edge_index: Tensor,
    /// `(num_nodes,)`, u32, owning graph of every node
    pub batch: Tensor,
    /// `(num_graphs,)`, u32
    pub y: Tensor,
    pub num_graphs: usize,
}
impl GraphBatch {
    pub fn collate<'g, I>(graphs: I, num_features: usize, device: &Device) -> Result<Self>
    where
        I: IntoIterator<Item = &'g Graph>,
    {
        let mut xs = Vec::new();
        let mut source = Vec::new();
        let mut target = Vec::new();
        let mut batch = Vec::new();
        let mut ys = Vec::new();
        let mut offset = 0u32;
        for (graph_idx, g) in graphs.into_iter().enumerate() {
            xs.extend_from_slice(&g.x);
            for &(u, v) in &g.edges {
                source.push(u + offset);
                target.push(v + offset);
            }
            batch.extend(std::iter::repeat(graph_idx as u32).take(g.num_nodes));
            ys.push(g.y);
            offset += g.num_nodes as u32;
        }
        let num_nodes = offset as usize;
        let num_edges = source.len();
        let num_graphs = ys.len();

        let mut edge_index = source;
        edge_index.extend(target);
        Ok(Self {
            x: Tensor::from_vec(xs, (num_nodes, num_features), device)?,
            edge_index: Tensor::from_vec(edge_index, (2, num_edges), device)?,
            batch: Tensor::from_vec(batch, num_nodes, device)?,
            y: Tensor::from_vec(ys, num_graphs, device)?,
            num_graphs,
        })
    }
}

/// Iterates over a partition in mini-batches of `batch_size` graphs.
pub struct GraphLoader<'a> {
    dataset: &'a GraphDataset,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
    device: &'a Device,
}
impl<'a> GraphLoader<'a> {
    /// Keeps the partition order.
    pub fn new(partition: &Partition<'a>, batch_size: usize, device: &'a Device) -> Self {
        assert!(batch_size > 0);
        Self {
            dataset: partition.dataset(),
            order: partition.indices().to_vec(),
            batch_size,
            position: 0,
            device,
        }
    }
    /// Visits the partition in a fresh random order.
    pub fn shuffled<R: Rng + ?Sized>(
        partition: &Partition<'a>,
        batch_size: usize,
        device: &'a Device,
        rng: &mut R,
    ) -> Self {
        let mut loader = Self::new(partition, batch_size, device);
        loader.order.shuffle(rng);
        loader
    }
    pub fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }
}

impl<'a> Iterator for GraphLoader<'a> {
    type Item = Result<GraphBatch>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let graphs = self.order[self.position..end]
            .iter()
            .filter_map(|&idx| self.dataset.get(idx));
        let batch = GraphBatch::collate(graphs, self.dataset.num_features, self.device);
        self.position = end;
        Some(batch)
    }
}
