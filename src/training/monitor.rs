//! End-of-epoch monitors shared by both training phases.
//!
//! Each monitor only looks at the epoch's validation metrics and keeps its own
//! state. The controller acts on the combined [`MonitorDecision`].

use tracing::info;

use super::TrainingConfig;

/// Tracks the best validation accuracy. An epoch whose accuracy is strictly
/// greater than every earlier one in the phase should be checkpointed.
#[derive(Debug, Clone, Default)]
pub struct ModelCheckpoint {
    best: Option<f64>,
}

impl ModelCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn on_epoch_end(&mut self, val_accuracy: f64) -> bool {
        let improved = match self.best {
            Some(best) => val_accuracy > best,
            None => !val_accuracy.is_nan(),
        };
        if improved {
            self.best = Some(val_accuracy);
        }
        improved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStoppingAction {
    /// Validation loss reached a new minimum; keep these weights.
    Improved,
    Continue,
    /// Patience exhausted; restore the weights kept at the last improvement.
    Stop,
}

/// Stops a phase once validation loss has not decreased for `patience`
/// consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn on_epoch_end(&mut self, epoch: usize, val_loss: f64) -> EarlyStoppingAction {
        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return EarlyStoppingAction::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            EarlyStoppingAction::Stop
        } else {
            EarlyStoppingAction::Continue
        }
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs without a
/// validation loss decrease of more than `min_delta`, never going below
/// `min_learning_rate`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_learning_rate: f64,
    min_delta: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_learning_rate: f64, min_delta: f64) -> Self {
        Self {
            factor,
            patience,
            min_learning_rate,
            min_delta,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    /// Returns the learning rate for the next epoch.
    pub fn on_epoch_end(&mut self, val_loss: f64, learning_rate: f64) -> f64 {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.wait = 0;
            return learning_rate;
        }

        self.wait += 1;
        if self.wait < self.patience {
            return learning_rate;
        }

        self.wait = 0;
        if learning_rate > self.min_learning_rate {
            (learning_rate * self.factor).max(self.min_learning_rate)
        } else {
            learning_rate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorDecision {
    pub save_checkpoint: bool,
    pub keep_best_weights: bool,
    pub stop: bool,
    pub learning_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MonitorSet {
    pub checkpoint: ModelCheckpoint,
    pub early_stopping: EarlyStopping,
    pub plateau: ReduceLrOnPlateau,
}

impl MonitorSet {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            checkpoint: ModelCheckpoint::new(),
            early_stopping: EarlyStopping::new(config.early_stopping_patience),
            plateau: ReduceLrOnPlateau::new(
                config.plateau_factor,
                config.plateau_patience,
                config.min_learning_rate,
                config.plateau_min_delta,
            ),
        }
    }

    pub fn observe(
        &mut self,
        epoch: usize,
        val_loss: f64,
        val_accuracy: f64,
        learning_rate: f64,
    ) -> MonitorDecision {
        let save_checkpoint = self.checkpoint.on_epoch_end(val_accuracy);
        let early_stopping = self.early_stopping.on_epoch_end(epoch, val_loss);
        let next_learning_rate = self.plateau.on_epoch_end(val_loss, learning_rate);

        if next_learning_rate < learning_rate {
            info!(
                epoch = epoch + 1,
                from = learning_rate,
                to = next_learning_rate,
                "validation loss plateaued, reducing learning rate"
            );
        }

        MonitorDecision {
            save_checkpoint,
            keep_best_weights: early_stopping == EarlyStoppingAction::Improved,
            stop: early_stopping == EarlyStoppingAction::Stop,
            learning_rate: next_learning_rate,
        }
    }
}
