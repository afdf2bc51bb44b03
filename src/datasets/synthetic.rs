use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Graph, GraphDataset};

pub const TOY_NUM_FEATURES: usize = 3;

/// Balanced two-class toy problem: class 0 graphs are rings, class 1 graphs are stars.
///
/// Node features are `[1, degree / 4, noise]`.
pub fn toy_graphs(num_graphs: usize, seed: u64) -> Result<GraphDataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let graphs = (0..num_graphs)
        .map(|idx| {
            let label = (idx % 2) as u32;
            let num_nodes = rng.gen_range(4..=10);
            let undirected: Vec<(u32, u32)> = if label == 0 {
                (0..num_nodes as u32)
                    .map(|u| (u, (u + 1) % num_nodes as u32))
                    .collect()
            } else {
                (1..num_nodes as u32).map(|v| (0, v)).collect()
            };
            let mut degree = vec![0usize; num_nodes];
            let mut edges = Vec::with_capacity(2 * undirected.len());
            for (u, v) in undirected {
                degree[u as usize] += 1;
                degree[v as usize] += 1;
                edges.push((u, v));
                edges.push((v, u));
            }
            let x = degree
                .iter()
                .flat_map(|&d| [1.0, d as f32 / 4.0, rng.gen_range(0.0..0.1)])
                .collect();
            Graph {
                x,
                num_nodes,
                edges,
                y: label,
            }
        })
        .collect();
    GraphDataset::new("SYNTHETIC", TOY_NUM_FEATURES, 2, graphs)
}
