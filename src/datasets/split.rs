use anyhow::{bail, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{GraphDataset, Partition, RandomSplit};

/// Shuffles the graph indices with `seed` and cuts them into consecutive runs.
///
/// Every part but the last gets `floor(len * ratio)` graphs; the last part takes
/// the remainder, so the parts always cover the dataset.
impl<'a, const N: usize> RandomSplit<[f64; N]> for &'a GraphDataset {
    type Output = [Partition<'a>; N];
    fn random_split(&self, ratio: [f64; N], seed: u64) -> Result<Self::Output> {
        if N == 0 {
            bail!("random_split needs at least one part");
        }
        if ratio.iter().any(|&r| !(0.0..=1.0).contains(&r)) {
            bail!("split ratios must lie in [0, 1]: {:?}", ratio);
        }
        let total: f64 = ratio[..N - 1].iter().sum();
        if total > 1.0 + 1e-9 {
            bail!("split ratios exceed 1: {:?}", ratio);
        }

        let dataset: &'a GraphDataset = *self;
        let n = dataset.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut parts = Vec::with_capacity(N);
        let mut start = 0;
        for (i, r) in ratio.iter().enumerate() {
            let end = if i + 1 == N {
                n
            } else {
                (start + (n as f64 * r) as usize).min(n)
            };
            parts.push(Partition::new(dataset, order[start..end].to_vec()));
            start = end;
        }
        match parts.try_into() {
            Ok(parts) => Ok(parts),
            Err(_) => bail!("random_split produced the wrong number of parts"),
        }
    }
}
