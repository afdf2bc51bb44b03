use std::path::PathBuf;

use anyhow::Result;
use candle_gat_graphcls::datasets::{DatasetName, RandomSplit};
use candle_gat_graphcls::models::{GatClassifier, GraphClassifier, ModelConfig};
use candle_gat_graphcls::train::{Splits, TrainConfig, Trainer};
use candle_gat_graphcls::utils::{parse_device, seed_device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Train a graph attention network on a TU graph-classification benchmark.
#[derive(Parser, Debug)]
#[command(name = "gat-graphcls", version, about)]
struct Args {
    /// Random seed for the split, shuffling and device generator
    #[arg(long, default_value_t = 777)]
    seed: u64,

    /// auto, cpu, cuda[:N] or metal[:N]
    #[arg(long, default_value = "auto")]
    device: String,

    #[arg(long, value_enum, default_value_t = DatasetName::Proteins)]
    dataset: DatasetName,

    #[arg(long, default_value_t = 128, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    lr: f64,

    /// L2 penalty coefficient; adds weight_decay * p to every gradient
    #[arg(long, default_value_t = 0.01)]
    weight_decay: f64,

    /// Hidden size
    #[arg(long, default_value_t = 128, value_parser = clap::value_parser!(u64).range(1..))]
    nhid: u64,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Directory holding downloaded datasets
    #[arg(long, default_value = "data")]
    root: PathBuf,

    /// Number of graphs generated for SYNTHETIC
    #[arg(long, default_value_t = 100)]
    num_graphs: usize,

    /// Hide the epoch progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let device = parse_device(&args.device)?;
    seed_device(&device, args.seed)?;

    let dataset = args.dataset.load(&args.root, args.num_graphs, args.seed)?;
    info!(
        ?args,
        num_features = dataset.num_features,
        num_classes = dataset.num_classes,
        "configuration"
    );

    let [train, val, test] = (&dataset).random_split([0.6, 0.1, 0.3], args.seed)?;

    let model = GatClassifier::new(
        &ModelConfig::new(dataset.num_features, args.nhid as usize, dataset.num_classes),
        &device,
    )?;
    let optimizer = AdamW::new(
        model.parameters(),
        ParamsAdamW {
            lr: args.lr,
            // decay goes through the loss, see TrainConfig::weight_decay
            weight_decay: 0.0,
            ..Default::default()
        },
    )?;
    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size as usize,
        weight_decay: args.weight_decay,
        seed: args.seed,
        progress: !args.no_progress,
    };

    let mut trainer = Trainer::new(model, optimizer, config, device);
    trainer.run(&Splits { train, val, test }, &mut std::io::stdout().lock())?;
    Ok(())
}
