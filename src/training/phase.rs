use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};

use super::TrainingConfig;

/// The two sequential optimisation phases. Each phase gets a fresh optimizer
/// and a fresh monitor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingPhase {
    /// Whole backbone frozen, only the head learns.
    Frozen,
    /// The last backbone layers are unfrozen at a lower learning rate.
    FineTune,
}

impl TrainingPhase {
    pub const ALL: [TrainingPhase; 2] = [TrainingPhase::Frozen, TrainingPhase::FineTune];

    pub fn learning_rate(self, config: &TrainingConfig) -> f64 {
        match self {
            TrainingPhase::Frozen => config.frozen_learning_rate,
            TrainingPhase::FineTune => config.fine_tune_learning_rate,
        }
    }

    pub fn trainable_backbone_layers(self, config: &TrainingConfig) -> usize {
        match self {
            TrainingPhase::Frozen => 0,
            TrainingPhase::FineTune => config.fine_tune_layers,
        }
    }

    /// Epoch target counted from the start of training, not of the phase.
    pub fn epoch_target(self, config: &TrainingConfig) -> usize {
        match self {
            TrainingPhase::Frozen => config.frozen_epochs,
            TrainingPhase::FineTune => config.total_epochs,
        }
    }

    /// Epochs this phase may run once `completed` epochs are done.
    pub fn epochs(self, config: &TrainingConfig, completed: usize) -> Range<usize> {
        completed..self.epoch_target(config).max(completed)
    }
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingPhase::Frozen => write!(f, "frozen"),
            TrainingPhase::FineTune => write!(f, "fine-tune"),
        }
    }
}
