use burn::{data::dataloader::DataLoader, prelude::*, tensor::activation::softmax};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    classes::ClassIndex,
    data::ModulationBatch,
    error::{Error, Result},
    model::Model,
};

pub mod confusion;
pub mod report;
pub mod roc;

use confusion::{ConfusionMatrix, OneVsRest};
use report::ClassificationReport;
use roc::RocCurve;

/// Softmax outputs for every test sample, in loader order.
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub probabilities: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
    pub loss: f64,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn predicted_classes(&self) -> Vec<usize> {
        self.probabilities
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(class, _)| class)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Probability of `class` for every sample.
    pub fn scores(&self, class: usize) -> Vec<f32> {
        self.probabilities
            .iter()
            .map(|row| row.get(class).copied().unwrap_or(0.0))
            .collect()
    }
}

/// One full pass over an unshuffled loader.
pub fn predict<B: Backend>(
    model: &Model<B>,
    dataloader: &dyn DataLoader<ModulationBatch<B>>,
) -> Result<Predictions> {
    let mut predictions = Predictions::default();
    let mut loss_sum = 0.0;

    for batch in dataloader.iter() {
        let output = model.forward_classification(batch.images, batch.targets);
        let [batch_size, classes] = output.output.dims();

        let loss: f64 = output.loss.into_scalar().elem();
        loss_sum += loss * batch_size as f64;

        let probabilities = softmax(output.output, 1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| Error::TensorData(format!("{err:?}")))?;
        let labels = output
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|err| Error::TensorData(format!("{err:?}")))?;

        predictions
            .probabilities
            .extend(probabilities.chunks(classes).map(<[f32]>::to_vec));
        predictions
            .labels
            .extend(labels.into_iter().map(|label| label as usize));
    }

    predictions.loss = loss_sum / predictions.len().max(1) as f64;
    Ok(predictions)
}

/// Everything derived from the test predictions.
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    pub per_class_accuracy: Vec<f64>,
    pub one_vs_rest: Vec<OneVsRest>,
    /// `None` for a class whose ROC is undefined on this test set.
    pub roc: Vec<Option<RocCurve>>,
}

impl Evaluation {
    pub fn new(predictions: &Predictions, classes: &ClassIndex) -> Result<Self> {
        let confusion = ConfusionMatrix::from_predictions(
            &predictions.labels,
            &predictions.predicted_classes(),
            classes.len(),
        )?;

        let roc = (0..classes.len())
            .map(|class| {
                let positive: Vec<bool> = predictions
                    .labels
                    .iter()
                    .map(|&label| label == class)
                    .collect();
                let curve = RocCurve::from_scores(&predictions.scores(class), &positive);
                if curve.is_none() {
                    warn!(
                        class = classes.name(class).unwrap_or_default(),
                        "ROC undefined, test set lacks positive or negative samples"
                    );
                }
                curve
            })
            .collect();

        let evaluation = Self {
            loss: predictions.loss,
            accuracy: confusion.accuracy(),
            report: ClassificationReport::new(&confusion, classes),
            per_class_accuracy: confusion.per_class_accuracy(),
            one_vs_rest: confusion.one_vs_rest_all(),
            roc,
            confusion,
        };
        info!(
            samples = evaluation.confusion.total(),
            loss = evaluation.loss,
            accuracy = evaluation.accuracy,
            "evaluated test partition"
        );

        Ok(evaluation)
    }

    pub fn summary(&self, classes: &ClassIndex) -> EvaluationSummary {
        EvaluationSummary {
            loss: self.loss,
            accuracy: self.accuracy,
            classes: classes.names().to_vec(),
            confusion_matrix: self.confusion.rows(),
            report: self.report.clone(),
            per_class_accuracy: self.per_class_accuracy.clone(),
            one_vs_rest: self.one_vs_rest.clone(),
            roc_auc: self
                .roc
                .iter()
                .map(|curve| curve.as_ref().map(|curve| curve.auc))
                .collect(),
        }
    }
}

/// Serializable form of an [`Evaluation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub classes: Vec<String>,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub report: ClassificationReport,
    pub per_class_accuracy: Vec<f64>,
    pub one_vs_rest: Vec<OneVsRest>,
    pub roc_auc: Vec<Option<f64>>,
}
