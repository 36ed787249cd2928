use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ferrite_seg::train::{JsonlSink, MetricsSink};
use ferrite_seg::{
    Network, NetworkSpec, RunConfig, SplitDataset, SyntheticVolumes, Trainer, TrainError,
};

/// Train a point-wise segmentation network on synthetic multi-channel volumes.
#[derive(Parser, Debug)]
#[command(name = "ferrite-seg", version)]
struct Args {
    /// JSON settings file
    config: PathBuf,

    /// Number of synthetic volumes to generate
    #[arg(long, default_value_t = 64)]
    samples: usize,

    /// Edge length of each (square) volume in voxels
    #[arg(long, default_value_t = 16)]
    side: usize,

    /// Channels per voxel
    #[arg(long, default_value_t = 4)]
    channels: usize,

    /// Segmentation classes, background included
    #[arg(long, default_value_t = 4)]
    classes: usize,

    /// Uniform noise amplitude added to every channel
    #[arg(long, default_value_t = 0.3)]
    noise: f64,

    /// Directory for the per-epoch scalar log; disabled when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match RunConfig::load_json(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!(path = %args.config.display(), error = %e, "cannot load settings");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.print_debug);

    match train(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "training failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn train(args: &Args, config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(?config, "settings");

    let samples = SyntheticVolumes {
        samples: args.samples,
        side: args.side,
        channels: args.channels,
        classes: args.classes,
        noise: args.noise,
        seed: config.seed,
    }
    .generate()?;

    let mut dataset = SplitDataset::new(samples, config.split_options())?;
    let (voxels, channels) = dataset
        .sample_shape()
        .ok_or_else(|| TrainError::config("the dataset is empty"))?;
    info!(
        train = dataset.train_len(),
        validation = dataset.val_len(),
        voxels,
        channels,
        "dataset ready"
    );

    let spec = NetworkSpec::from_settings(&config.model_settings, channels)?;
    let mut network = Network::from_spec(&spec)?;
    let mut optimizer = config.optimizer.build(config.learning_rate, config.weight_decay);
    let loss_fn = config.loss.build();

    let sink: Box<dyn MetricsSink> = match &args.log_dir {
        Some(dir) => Box::new(JsonlSink::new(dir)),
        None => Box::new(()),
    };

    let state = Trainer::new(config)?
        .with_sink(sink)
        .run(&mut dataset, &mut network, optimizer.as_mut(), loss_fn.as_ref())?;

    info!(
        epochs = state.epochs_executed(),
        termination = ?state.termination(),
        last = ?state.last(),
        checkpoint = ?state.checkpoint(),
        "run finished"
    );
    Ok(())
}
