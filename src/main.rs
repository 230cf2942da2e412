use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    config::Config,
};
use clap::Parser;
use tracing::info;

use modulation_classifier::{
    logging::init_logging,
    reporting::{print_summary, write_reports},
    run, ExperimentConfig,
};

/// Fine-tunes a pretrained MobileNetV2 on spectrogram images of radio
/// modulation schemes and reports test-set metrics.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Dataset root holding `train/`, `validation/` and `test/`
    #[arg(long)]
    data_dir: PathBuf,

    /// Output directory for the checkpoint, config and reports
    #[arg(long, default_value = "artifact")]
    artifact_dir: PathBuf,

    /// Pretrained backbone record (`.mpk`)
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    /// Experiment config, as written to `config.json` by an earlier run
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    frozen_epochs: Option<usize>,

    #[arg(long)]
    total_epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    image_size: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .map_err(|err| anyhow!("{err}"))
                .with_context(|| format!("failed to load config `{}`", path.display()))?,
            None => ExperimentConfig::new(),
        };

        if let Some(epochs) = self.frozen_epochs {
            config.training.frozen_epochs = epochs;
        }
        if let Some(epochs) = self.total_epochs {
            config.training.total_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.loader.batch_size = batch_size;
        }
        if let Some(image_size) = self.image_size {
            config.loader.image_size = image_size;
        }
        if let Some(seed) = self.seed {
            config.loader.seed = seed;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    type Backend = Wgpu<f32, i32>;
    type AutodiffBackend = Autodiff<Backend>;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.experiment_config()?;
    let device = WgpuDevice::default();

    let experiment = run::<AutodiffBackend>(
        &cli.data_dir,
        &cli.artifact_dir,
        cli.backbone_weights.as_deref(),
        &config,
        device,
    )
    .context("training run failed")?;

    print_summary(&experiment.classes, &experiment.evaluation);
    write_reports(
        &cli.artifact_dir,
        &experiment.classes,
        &experiment.history,
        &experiment.evaluation,
    )
    .context("failed to write reports")?;

    info!(
        checkpoint = %experiment.checkpoint.display(),
        artifact_dir = %cli.artifact_dir.display(),
        "done"
    );
    Ok(())
}
