use anyhow::Result;

pub trait RandomSplit<Ratio> {
    type Output;
    fn random_split(&self, ratio: Ratio, seed: u64) -> Result<Self::Output>;
}
