use std::{
    collections::BTreeSet,
    fs::{create_dir_all, remove_dir_all, rename, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use super::{download_and_extract, Graph, GraphDataset};

pub const TU_URL: &str = "https://www.chrsc.de/datasets";

const PROCESSED_FILES: [&str; 3] = ["nodes.parquet", "edges.parquet", "graphs.parquet"];

/// Graph classification benchmark in the TU Dortmund text format.
///
/// `root` holds `raw/` (the unpacked archive) and `processed/` (parquet tables).
#[derive(Debug, Clone)]
pub struct TuDataset {
    name: String,
    root: PathBuf,
}
impl TuDataset {
    pub fn new<P: AsRef<Path>>(root: P, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            root: root.as_ref().to_owned(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    fn raw_dir(&self) -> PathBuf {
        self.root.join("raw").join(&self.name)
    }
    fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Downloads and processes the dataset if needed, then loads it.
    pub fn load(&self) -> Result<GraphDataset> {
        self.prepare_data()?;
        self.from_processed()
    }

    pub fn prepare_data(&self) -> Result<()> {
        let raw = self.root.join("raw");
        if !self.raw_dir().exists() {
            create_dir_all(&raw)?;
            download_and_extract(&format!("{}/{}.zip", TU_URL, self.name), &raw)?;
        }
        let processed = self.processed_dir();
        if !PROCESSED_FILES.iter().all(|f| processed.join(f).exists()) {
            info!(dataset = %self.name, "processing raw files");
            let tables = TuTables::from_raw(&self.raw_dir(), &self.name)?;
            // written next to the final location, then renamed in one step
            let staging = self.root.join("processed.tmp");
            if staging.exists() {
                remove_dir_all(&staging)?;
            }
            create_dir_all(&staging)?;
            tables.write_parquet(&staging)?;
            if processed.exists() {
                remove_dir_all(&processed)?;
            }
            rename(&staging, &processed)?;
        }
        Ok(())
    }

    pub fn from_processed(&self) -> Result<GraphDataset> {
        let tables = TuTables::read_parquet(&self.processed_dir())?;
        let dataset = tables.into_dataset(&self.name)?;
        info!(
            dataset = %dataset.name,
            graphs = dataset.len(),
            num_features = dataset.num_features,
            num_classes = dataset.num_classes,
            "loaded"
        );
        Ok(dataset)
    }
}

/// Column-oriented contents of a TU dataset with global, 0-based node ids.
#[derive(Debug, Clone, PartialEq)]
struct TuTables {
    /// owning graph of each node
    graph: Vec<u32>,
    /// `features[j][node]`
    features: Vec<Vec<f32>>,
    source: Vec<u32>,
    target: Vec<u32>,
    label_raw: Vec<i64>,
    label: Vec<u32>,
}
impl TuTables {
    fn from_raw(dir: &Path, name: &str) -> Result<Self> {
        let file = |suffix: &str| dir.join(format!("{}_{}.txt", name, suffix));

        let indicator: Vec<i64> = read_rows::<i64>(&file("graph_indicator"))?
            .into_iter()
            .map(first_column)
            .collect::<Result<_>>()?;
        let num_nodes = indicator.len();
        if indicator.iter().any(|&g| g < 1) {
            bail!("{}: graph ids must start at 1", name);
        }
        if indicator.windows(2).any(|w| w[0] > w[1]) {
            bail!("{}: nodes are not grouped by graph", name);
        }
        let graph: Vec<u32> = indicator.iter().map(|&g| (g - 1) as u32).collect();

        let label_raw: Vec<i64> = read_rows::<i64>(&file("graph_labels"))?
            .into_iter()
            .map(first_column)
            .collect::<Result<_>>()?;
        let num_graphs = graph.last().map_or(0, |&g| g as usize + 1);
        if label_raw.len() != num_graphs {
            bail!(
                "{}: {} graph labels for {} graphs",
                name,
                label_raw.len(),
                num_graphs
            );
        }
        let classes: Vec<i64> = label_raw
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let label: Vec<u32> = label_raw
            .iter()
            .map(|l| classes.binary_search(l).map(|c| c as u32))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| anyhow!("{}: label lookup failed", name))?;

        let mut edges = Vec::new();
        for row in read_rows::<i64>(&file("A"))? {
            let &[u, v] = row.as_slice() else {
                bail!("{}: edge rows need two endpoints, got {:?}", name, row);
            };
            if u < 1 || v < 1 || u as usize > num_nodes || v as usize > num_nodes {
                bail!("{}: edge ({}, {}) out of range", name, u, v);
            }
            if u != v {
                edges.push(((u - 1) as u32, (v - 1) as u32));
            }
        }
        edges.sort_unstable();
        edges.dedup();
        let (source, target): (Vec<u32>, Vec<u32>) = edges.into_iter().unzip();

        let mut features = Vec::new();
        let attributes = file("node_attributes");
        if attributes.exists() {
            let rows = read_rows::<f32>(&attributes)?;
            features.extend(transpose(&rows, num_nodes, name)?);
        }
        let node_labels = file("node_labels");
        if node_labels.exists() {
            let rows = read_rows::<i64>(&node_labels)?;
            for column in transpose(&rows, num_nodes, name)? {
                features.extend(one_hot(&column));
            }
        }
        if features.is_empty() {
            bail!("{}: dataset has no node features", name);
        }
        debug!(dataset = name, num_nodes, num_graphs, "parsed raw files");

        Ok(Self {
            graph,
            features,
            source,
            target,
            label_raw,
            label,
        })
    }

    fn write_parquet(&self, dir: &Path) -> Result<()> {
        let mut node_df = df! { "graph" => self.graph.clone() }?;
        for (i, x) in self.features.iter().enumerate() {
            let name = format!("xs.{}", i);
            node_df.with_column(Series::from_vec(&name, x.clone()))?;
        }
        ParquetWriter::new(File::create(dir.join("nodes.parquet"))?).finish(&mut node_df)?;

        let mut edge_df = df! {
            "source" => self.source.clone(),
            "target" => self.target.clone(),
        }?;
        ParquetWriter::new(File::create(dir.join("edges.parquet"))?).finish(&mut edge_df)?;

        let mut graph_df = df! {
            "label" => self.label_raw.clone(),
            "label_u32" => self.label.clone(),
        }?;
        ParquetWriter::new(File::create(dir.join("graphs.parquet"))?).finish(&mut graph_df)?;
        Ok(())
    }

    fn read_parquet(dir: &Path) -> Result<Self> {
        let read = |file: &str| -> Result<DataFrame> {
            let path = dir.join(file);
            let df = ParquetReader::new(
                File::open(&path).with_context(|| format!("opening {}", path.display()))?,
            )
            .finish()?;
            Ok(df)
        };
        let node_df = read("nodes.parquet")?;
        let edge_df = read("edges.parquet")?;
        let graph_df = read("graphs.parquet")?;

        let num_features = node_df
            .get_column_names()
            .iter()
            .filter(|c| c.starts_with("xs."))
            .count();
        let features = (0..num_features)
            .map(|i| -> Result<Vec<f32>> {
                let col = node_df.column(&format!("xs.{}", i))?;
                Ok(col.f32()?.into_no_null_iter().collect())
            })
            .collect::<Result<Vec<Vec<f32>>>>()?;

        Ok(Self {
            graph: node_df.column("graph")?.u32()?.into_no_null_iter().collect(),
            features,
            source: edge_df.column("source")?.u32()?.into_no_null_iter().collect(),
            target: edge_df.column("target")?.u32()?.into_no_null_iter().collect(),
            label_raw: graph_df.column("label")?.i64()?.into_no_null_iter().collect(),
            label: graph_df.column("label_u32")?.u32()?.into_no_null_iter().collect(),
        })
    }

    fn into_dataset(self, name: &str) -> Result<GraphDataset> {
        let num_features = self.features.len();
        let num_graphs = self.label.len();
        let num_classes = self.label_raw.iter().collect::<BTreeSet<_>>().len();

        let mut offsets = vec![0usize; num_graphs + 1];
        for &g in &self.graph {
            let g = g as usize;
            if g >= num_graphs {
                bail!("{}: node belongs to unknown graph {}", name, g);
            }
            offsets[g + 1] += 1;
        }
        for g in 0..num_graphs {
            offsets[g + 1] += offsets[g];
        }

        let mut graphs: Vec<Graph> = self
            .label
            .iter()
            .enumerate()
            .map(|(g, &y)| {
                let num_nodes = offsets[g + 1] - offsets[g];
                Graph {
                    x: Vec::with_capacity(num_nodes * num_features),
                    num_nodes,
                    edges: Vec::new(),
                    y,
                }
            })
            .collect();
        for (node, &g) in self.graph.iter().enumerate() {
            let x = &mut graphs[g as usize].x;
            x.extend(self.features.iter().map(|col| col[node]));
        }
        for (&s, &t) in self.source.iter().zip(&self.target) {
            let g = self.graph[s as usize];
            if self.graph[t as usize] != g {
                bail!("{}: edge ({}, {}) crosses graphs", name, s, t);
            }
            let offset = offsets[g as usize] as u32;
            graphs[g as usize].edges.push((s - offset, t - offset));
        }
        GraphDataset::new(name, num_features, num_classes, graphs)
    }
}

fn read_rows<T>(path: &Path) -> Result<Vec<Vec<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let separator = Regex::new(r"\s*,\s*")?;
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("opening {}", path.display()))?,
    );
    let mut rows = Vec::new();
    for (lineno, buf) in reader.lines().enumerate() {
        let line = buf?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = separator
            .split(line)
            .map(|v| v.parse::<T>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}: {:?}", path.display(), lineno + 1, line))?;
        rows.push(row);
    }
    Ok(rows)
}

fn first_column<T: Copy>(row: Vec<T>) -> Result<T> {
    row.first().copied().ok_or_else(|| anyhow!("empty row"))
}

fn transpose<T: Copy>(rows: &[Vec<T>], num_nodes: usize, name: &str) -> Result<Vec<Vec<T>>> {
    if rows.len() != num_nodes {
        bail!("{}: {} node rows for {} nodes", name, rows.len(), num_nodes);
    }
    let width = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != width) {
        bail!("{}: ragged node rows", name);
    }
    Ok((0..width)
        .map(|j| rows.iter().map(|r| r[j]).collect())
        .collect())
}

/// One-hot columns for a categorical column, shifted so its minimum maps to 0.
fn one_hot(column: &[i64]) -> Vec<Vec<f32>> {
    let min = column.iter().copied().min().unwrap_or(0);
    let width = column.iter().map(|&v| (v - min) as usize + 1).max().unwrap_or(0);
    let mut out = vec![vec![0.0; column.len()]; width];
    for (node, &v) in column.iter().enumerate() {
        out[(v - min) as usize][node] = 1.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // two graphs: a triangle with a duplicated edge and a self loop, and a single edge
    fn write_fixture(dir: &Path) -> Result<()> {
        let raw = dir.join("raw").join("TOY");
        fs::create_dir_all(&raw)?;
        fs::write(raw.join("TOY_graph_indicator.txt"), "1\n1\n1\n2\n2\n")?;
        fs::write(raw.join("TOY_graph_labels.txt"), "-1\n1\n")?;
        fs::write(
            raw.join("TOY_A.txt"),
            "1, 2\n2, 1\n2, 3\n3, 2\n1, 3\n3, 1\n1, 2\n3, 3\n4, 5\n5, 4\n",
        )?;
        fs::write(raw.join("TOY_node_labels.txt"), "1\n2\n1\n3\n1\n")?;
        fs::write(
            raw.join("TOY_node_attributes.txt"),
            "0.5, 1.0\n0.0, 0.0\n1.5, -1\n2, 2\n3, 3\n",
        )?;
        Ok(())
    }

    #[test]
    fn parses_raw_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path())?;
        let tables = TuTables::from_raw(&dir.path().join("raw").join("TOY"), "TOY")?;
        assert_eq!(tables.graph, vec![0, 0, 0, 1, 1]);
        // 2 attribute columns + 3 one-hot columns
        assert_eq!(tables.features.len(), 5);
        assert_eq!(tables.features[0], vec![0.5, 0.0, 1.5, 2.0, 3.0]);
        assert_eq!(tables.features[2], vec![1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(tables.features[4], vec![0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(tables.label, vec![0, 1]);
        assert_eq!(tables.source.len(), 8);
        assert!(tables.source.iter().zip(&tables.target).all(|(s, t)| s != t));
        Ok(())
    }

    #[test]
    fn builds_local_graphs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path())?;
        let dataset = TuTables::from_raw(&dir.path().join("raw").join("TOY"), "TOY")?
            .into_dataset("TOY")?;
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_features, 5);
        assert_eq!(dataset.num_classes, 2);
        let second = &dataset.graphs()[1];
        assert_eq!(second.num_nodes, 2);
        assert_eq!(second.edges, vec![(0, 1), (1, 0)]);
        assert_eq!(&second.x[..5], &[2.0, 2.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn parquet_cache_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path())?;
        let tu = TuDataset::new(dir.path(), "TOY");
        tu.prepare_data()?;
        assert!(dir.path().join("processed").join("nodes.parquet").exists());

        let from_cache = tu.from_processed()?;
        let direct = TuTables::from_raw(&dir.path().join("raw").join("TOY"), "TOY")?
            .into_dataset("TOY")?;
        assert_eq!(from_cache.graphs(), direct.graphs());
        Ok(())
    }

    #[test]
    fn incomplete_cache_is_rebuilt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path())?;
        let tu = TuDataset::new(dir.path(), "TOY");
        let processed = dir.path().join("processed");
        fs::create_dir_all(&processed)?;
        fs::write(processed.join("nodes.parquet"), b"truncated")?;

        let dataset = tu.load()?;
        assert_eq!(dataset.len(), 2);
        for f in PROCESSED_FILES {
            assert!(processed.join(f).exists(), "{}", f);
        }
        assert!(!dir.path().join("processed.tmp").exists());
        Ok(())
    }

    #[test]
    fn rejects_dataset_without_features() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path())?;
        let raw = dir.path().join("raw").join("TOY");
        fs::remove_file(raw.join("TOY_node_labels.txt"))?;
        fs::remove_file(raw.join("TOY_node_attributes.txt"))?;
        assert!(TuTables::from_raw(&raw, "TOY").is_err());
        Ok(())
    }
}
