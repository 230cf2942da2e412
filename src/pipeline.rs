use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};
use tracing::info;

use crate::{
    augmentation::AugmentationConfig,
    classes::ClassIndex,
    data::{evaluation_loader, training_loader, LoaderConfig, Partitions},
    error::Result,
    evaluation::{predict, Evaluation},
    model::{HeadConfig, ModelConfig},
    training::{history::TrainingHistory, train, TrainingConfig},
};

/// Every tunable of a run. Saved as `config.json` in the artifact directory.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    #[config(default = "LoaderConfig::new()")]
    pub loader: LoaderConfig,

    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,

    #[config(default = "HeadConfig::new()")]
    pub head: HeadConfig,

    #[config(default = "TrainingConfig::new()")]
    pub training: TrainingConfig,
}

pub struct Experiment {
    pub classes: ClassIndex,
    pub history: TrainingHistory,
    pub evaluation: Evaluation,
    pub checkpoint: PathBuf,
}

/// Loads the dataset, trains both phases and evaluates the reloaded
/// checkpoint on the test partition.
pub fn run<B: AutodiffBackend>(
    data_dir: &Path,
    artifact_dir: &Path,
    backbone_weights: Option<&Path>,
    config: &ExperimentConfig,
    device: B::Device,
) -> Result<Experiment> {
    fs::create_dir_all(artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;

    B::seed(config.loader.seed);

    let Partitions {
        classes,
        train: train_set,
        validation,
        test,
    } = Partitions::load(data_dir, config.loader.image_size)?;

    let dataloader_train =
        training_loader::<B>(train_set, &config.augmentation, &config.loader, device.clone());
    let dataloader_valid =
        evaluation_loader::<B::InnerBackend>(validation, &config.loader, device.clone());
    let dataloader_test = evaluation_loader::<B::InnerBackend>(test, &config.loader, device.clone());

    let model = ModelConfig::new(classes.len(), config.head.clone())
        .init_pretrained::<B>(backbone_weights, &device)?;
    info!(
        classes = classes.len(),
        backbone_layers = model.backbone().num_layers(),
        "model assembled"
    );

    let outcome = train(
        model,
        dataloader_train.as_ref(),
        dataloader_valid.as_ref(),
        &config.training,
        artifact_dir,
        &device,
    )?;

    let predictions = predict(&outcome.model.valid(), dataloader_test.as_ref())?;
    let evaluation = Evaluation::new(&predictions, &classes)?;

    Ok(Experiment {
        classes,
        history: outcome.history,
        evaluation,
        checkpoint: outcome.checkpoint,
    })
}
