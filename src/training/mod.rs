use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::ClassificationOutput,
};
use tracing::{debug, info, warn};

use crate::{
    data::ModulationBatch,
    error::{Error, Result},
    model::Model,
};

pub mod history;
pub mod monitor;
pub mod phase;

use history::{EpochRecord, TrainingHistory};
use monitor::MonitorSet;
use phase::TrainingPhase;

/// Checkpoint file stem inside the artifact directory. Both phases write here.
pub const CHECKPOINT_NAME: &str = "best_model";

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 0.9)]
    pub momentum: f64,

    #[config(default = 1.0e-3)]
    pub frozen_learning_rate: f64,

    #[config(default = 12)]
    pub frozen_epochs: usize,

    #[config(default = 1.0e-4)]
    pub fine_tune_learning_rate: f64,

    #[config(default = 32)]
    pub total_epochs: usize,

    /// Backbone layers unfrozen for fine-tuning, counted from the end.
    #[config(default = 4)]
    pub fine_tune_layers: usize,

    #[config(default = 5)]
    pub early_stopping_patience: usize,

    #[config(default = 3)]
    pub plateau_patience: usize,

    #[config(default = 0.2)]
    pub plateau_factor: f64,

    #[config(default = 1.0e-4)]
    pub plateau_min_delta: f64,

    #[config(default = 1.0e-5)]
    pub min_learning_rate: f64,
}

pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: Model<B>,
    pub history: TrainingHistory,
    pub checkpoint: PathBuf,
}

/// Running loss and accuracy over one pass of a loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochMetrics {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl EpochMetrics {
    fn record<B: Backend>(&mut self, output: &ClassificationOutput<B>) {
        let batch_size = output.targets.dims()[0];
        let loss: f64 = output.loss.clone().into_scalar().elem();
        let correct: i64 = output
            .output
            .clone()
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(output.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem();

        self.loss_sum += loss * batch_size as f64;
        self.correct += correct as usize;
        self.samples += batch_size;
    }

    pub fn loss(&self) -> f64 {
        self.loss_sum / self.samples.max(1) as f64
    }

    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / self.samples.max(1) as f64
    }
}

/// Runs the frozen phase, then the fine-tuning phase, and finally reloads the
/// checkpointed weights.
pub fn train<B: AutodiffBackend>(
    model: Model<B>,
    dataloader_train: &dyn DataLoader<ModulationBatch<B>>,
    dataloader_valid: &dyn DataLoader<ModulationBatch<B::InnerBackend>>,
    config: &TrainingConfig,
    artifact_dir: &Path,
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    let checkpoint = artifact_dir.join(CHECKPOINT_NAME);
    let mut history = TrainingHistory::default();
    let mut model = model;

    for phase in TrainingPhase::ALL {
        model = model.with_trainable_backbone_tail(phase.trainable_backbone_layers(config));
        let epochs = phase.epochs(config, history.len());

        info!(
            %phase,
            first_epoch = epochs.start + 1,
            last_epoch = epochs.end,
            learning_rate = phase.learning_rate(config),
            trainable_backbone_layers = model.backbone().trainable_layers(),
            "starting training phase"
        );

        let (trained, phase_history) = run_phase(
            phase,
            model,
            dataloader_train,
            dataloader_valid,
            config,
            &checkpoint,
            epochs,
        )?;
        model = trained;
        history.extend(phase_history);
    }

    // Each phase tracks its own best accuracy, so the file holds the best
    // weights of whichever phase wrote last, not necessarily the overall best.
    let model = reload_checkpoint(model, &checkpoint, device)?;

    Ok(TrainingOutcome {
        model,
        history,
        checkpoint,
    })
}

fn run_phase<B: AutodiffBackend>(
    phase: TrainingPhase,
    mut model: Model<B>,
    dataloader_train: &dyn DataLoader<ModulationBatch<B>>,
    dataloader_valid: &dyn DataLoader<ModulationBatch<B::InnerBackend>>,
    config: &TrainingConfig,
    checkpoint: &Path,
    epochs: Range<usize>,
) -> Result<(Model<B>, TrainingHistory)> {
    let mut optimizer = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(config.momentum)
                .with_dampening(0.0),
        ))
        .init();
    let mut monitors = MonitorSet::from_config(config);
    let mut learning_rate = phase.learning_rate(config);
    let mut best_record = None;
    let mut history = TrainingHistory::default();

    for epoch in epochs {
        let (trained, train_metrics) =
            train_epoch(model, &mut optimizer, dataloader_train, learning_rate);
        model = trained;
        let valid_metrics = validate(&model.valid(), dataloader_valid);

        let decision = monitors.observe(
            epoch,
            valid_metrics.loss(),
            valid_metrics.accuracy(),
            learning_rate,
        );

        info!(
            epoch = epoch + 1,
            %phase,
            loss = train_metrics.loss(),
            accuracy = train_metrics.accuracy(),
            val_loss = valid_metrics.loss(),
            val_accuracy = valid_metrics.accuracy(),
            learning_rate,
            "epoch complete"
        );
        history.push(EpochRecord {
            epoch,
            phase,
            learning_rate,
            loss: train_metrics.loss(),
            accuracy: train_metrics.accuracy(),
            val_loss: valid_metrics.loss(),
            val_accuracy: valid_metrics.accuracy(),
        });

        if decision.save_checkpoint {
            model
                .clone()
                .save_file(checkpoint, &CompactRecorder::new())
                .map_err(|err| Error::Checkpoint {
                    path: checkpoint.to_path_buf(),
                    message: format!("{err:?}"),
                })?;
            info!(
                epoch = epoch + 1,
                val_accuracy = valid_metrics.accuracy(),
                path = %checkpoint.display(),
                "validation accuracy improved, checkpoint saved"
            );
        }

        // a record snapshots batch norm running statistics, a clone shares them
        if decision.keep_best_weights {
            best_record = Some(model.clone().into_record());
        }

        if decision.stop {
            info!(
                epoch = epoch + 1,
                best_epoch = monitors.early_stopping.best_epoch().map(|epoch| epoch + 1),
                "validation loss stopped improving, restoring best weights"
            );
            if let Some(record) = best_record.take() {
                model = model.load_record(record);
            }
            break;
        }

        learning_rate = decision.learning_rate;
    }

    Ok((model, history))
}

fn train_epoch<B, O>(
    mut model: Model<B>,
    optimizer: &mut O,
    dataloader: &dyn DataLoader<ModulationBatch<B>>,
    learning_rate: f64,
) -> (Model<B>, EpochMetrics)
where
    B: AutodiffBackend,
    O: Optimizer<Model<B>, B>,
{
    let mut metrics = EpochMetrics::default();

    for (iteration, batch) in dataloader.iter().enumerate() {
        let output = model.forward_classification_training(batch.images, batch.targets);
        metrics.record(&output);
        debug!(
            iteration,
            running_loss = metrics.loss(),
            running_accuracy = metrics.accuracy(),
            "training batch"
        );

        let grads = GradientsParams::from_grads(output.loss.backward(), &model);
        model = optimizer.step(learning_rate, model, grads);
    }

    (model, metrics)
}

fn validate<B: Backend>(
    model: &Model<B>,
    dataloader: &dyn DataLoader<ModulationBatch<B>>,
) -> EpochMetrics {
    let mut metrics = EpochMetrics::default();

    for batch in dataloader.iter() {
        let output = model.forward_classification(batch.images, batch.targets);
        metrics.record(&output);
    }

    metrics
}

fn reload_checkpoint<B: AutodiffBackend>(
    model: Model<B>,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<Model<B>> {
    let recorder = CompactRecorder::new();
    if !checkpoint.with_extension("mpk").exists() {
        warn!(
            path = %checkpoint.display(),
            "no checkpoint was written, keeping the final weights"
        );
        return Ok(model);
    }

    let model = model
        .load_file(checkpoint, &recorder, device)
        .map_err(|err| Error::Checkpoint {
            path: checkpoint.to_path_buf(),
            message: format!("{err:?}"),
        })?;
    info!(path = %checkpoint.display(), "reloaded best checkpoint");

    Ok(model)
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataset::InMemDataset,
    };
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::{
        data::{evaluation_loader, LoaderConfig, ModulationDataset, ModulationImage},
        model::{HeadConfig, ModelConfig},
    };

    type TestBackend = Autodiff<NdArray>;

    fn dataset(label: usize) -> ModulationDataset {
        let items = [[200, 30, 30], [30, 200, 30], [30, 30, 200], [120, 120, 120]]
            .into_iter()
            .map(|color| ModulationImage {
                image: RgbImage::from_pixel(32, 32, Rgb(color)),
                label,
            })
            .collect();

        ModulationDataset {
            dataset: InMemDataset::new(items),
        }
    }

    #[test]
    fn early_stop_restores_best_validation_weights() {
        let device: <TestBackend as burn::tensor::backend::Backend>::Device = Default::default();
        let artifacts = tempfile::tempdir().unwrap();
        let loader = LoaderConfig::new().with_batch_size(2);

        // training pushes towards class 0 while validation expects class 1,
        // so validation loss rises after the first epoch
        let dataloader_train = evaluation_loader::<TestBackend>(dataset(0), &loader, device.clone());
        let dataloader_valid = evaluation_loader::<NdArray>(dataset(1), &loader, device.clone());

        let config = TrainingConfig::new()
            .with_frozen_learning_rate(0.05)
            .with_early_stopping_patience(1);
        let model = ModelConfig::new(2, HeadConfig::new().with_hidden_size(8))
            .init::<TestBackend>(&device);
        let epochs = 0..6;

        let (model, history) = run_phase(
            TrainingPhase::Frozen,
            model,
            dataloader_train.as_ref(),
            dataloader_valid.as_ref(),
            &config,
            &artifacts.path().join(CHECKPOINT_NAME),
            epochs.clone(),
        )
        .unwrap();

        assert!(history.len() >= 2);
        assert!(history.len() < epochs.len());

        let best = history
            .epochs
            .iter()
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
            .unwrap();
        assert!(best.epoch < history.len() - 1);

        let restored = validate(&model.valid(), dataloader_valid.as_ref()).loss();
        assert!(
            (restored - best.val_loss).abs() <= 1e-5 * best.val_loss.abs().max(1.0),
            "restored val_loss {restored}, best {}",
            best.val_loss
        );
    }
}
