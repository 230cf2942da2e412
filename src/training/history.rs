use serde::{Deserialize, Serialize};

use super::phase::TrainingPhase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Zero-based, counted across both phases.
    pub epoch: usize,
    pub phase: TrainingPhase,
    pub learning_rate: f64,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Per-epoch metrics of every phase, in epoch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn extend(&mut self, other: TrainingHistory) {
        self.epochs.extend(other.epochs);
    }

    pub fn phase_len(&self, phase: TrainingPhase) -> usize {
        self.epochs.iter().filter(|record| record.phase == phase).count()
    }

    pub fn accuracy(&self) -> Vec<f64> {
        self.epochs.iter().map(|record| record.accuracy).collect()
    }

    pub fn val_accuracy(&self) -> Vec<f64> {
        self.epochs.iter().map(|record| record.val_accuracy).collect()
    }

    pub fn loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|record| record.loss).collect()
    }

    pub fn val_loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|record| record.val_loss).collect()
    }
}
