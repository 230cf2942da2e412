use ndarray::{array, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Counts of (true class, predicted class) pairs. Rows are true classes,
/// columns are predictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[usize], predicted: &[usize], classes: usize) -> Result<Self> {
        let mut counts = Array2::zeros((classes, classes));

        for (&actual, &guess) in truth.iter().zip(predicted) {
            for label in [actual, guess] {
                if label >= classes {
                    return Err(Error::LabelOutOfRange { label, classes });
                }
            }
            counts[[actual, guess]] += 1;
        }

        Ok(Self { counts })
    }

    /// Wraps an existing count matrix.
    ///
    /// # Panics
    ///
    /// Panics if `counts` is not square.
    pub fn from_counts(counts: Array2<usize>) -> Self {
        assert!(counts.is_square(), "confusion matrix must be square");
        Self { counts }
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn rows(&self) -> Vec<Vec<usize>> {
        self.counts.outer_iter().map(|row| row.to_vec()).collect()
    }

    pub fn num_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn correct(&self) -> usize {
        self.counts.diag().sum()
    }

    pub fn row_sum(&self, class: usize) -> usize {
        self.counts.row(class).sum()
    }

    pub fn column_sum(&self, class: usize) -> usize {
        self.counts.column(class).sum()
    }

    /// Fraction of all samples on the diagonal.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Diagonal count over row sum for each class; 0 for a class with no
    /// samples.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        (0..self.num_classes())
            .map(|class| ratio(self.counts[[class, class]], self.row_sum(class)))
            .collect()
    }

    pub fn one_vs_rest(&self, class: usize) -> OneVsRest {
        let true_positive = self.counts[[class, class]];
        let false_negative = self.row_sum(class) - true_positive;
        let false_positive = self.column_sum(class) - true_positive;
        let true_negative = self.total() - true_positive - false_negative - false_positive;

        OneVsRest {
            true_positive,
            false_negative,
            false_positive,
            true_negative,
        }
    }

    pub fn one_vs_rest_all(&self) -> Vec<OneVsRest> {
        (0..self.num_classes()).map(|class| self.one_vs_rest(class)).collect()
    }
}

/// A class against every other class, collapsed into a 2x2 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneVsRest {
    pub true_positive: usize,
    pub false_negative: usize,
    pub false_positive: usize,
    pub true_negative: usize,
}

impl OneVsRest {
    /// `[[TP, FN], [FP, TN]]`: the first row is the class, the second the rest.
    pub fn to_matrix(&self) -> Array2<usize> {
        array![
            [self.true_positive, self.false_negative],
            [self.false_positive, self.true_negative],
        ]
    }
}

pub(crate) fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_class() -> ConfusionMatrix {
        ConfusionMatrix::from_counts(array![[8, 1, 1], [0, 9, 1], [2, 0, 8]])
    }

    #[test]
    fn per_class_accuracy_uses_row_sums() {
        let accuracy = three_class().per_class_accuracy();

        for (actual, expected) in accuracy.iter().zip([0.8, 0.9, 0.8]) {
            assert!((actual - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn one_vs_rest_collapses_the_matrix() {
        let matrix = three_class();

        assert_eq!(
            matrix.one_vs_rest(0),
            OneVsRest {
                true_positive: 8,
                false_negative: 2,
                false_positive: 2,
                true_negative: 18,
            }
        );
        assert_eq!(matrix.one_vs_rest(0).to_matrix(), array![[8, 2], [2, 18]]);

        for class in 0..3 {
            let collapsed = matrix.one_vs_rest(class);
            assert_eq!(collapsed.true_positive + collapsed.false_negative, matrix.row_sum(class));
            assert_eq!(collapsed.true_positive + collapsed.false_positive, matrix.column_sum(class));
            assert_eq!(
                collapsed.true_positive
                    + collapsed.false_negative
                    + collapsed.false_positive
                    + collapsed.true_negative,
                matrix.total()
            );
        }
    }

    #[test]
    fn built_from_predictions() {
        let truth = [0, 0, 1, 2, 2, 2];
        let predicted = [0, 1, 1, 2, 0, 2];

        let matrix = ConfusionMatrix::from_predictions(&truth, &predicted, 3).unwrap();

        assert_eq!(matrix.counts(), &array![[1, 1, 0], [0, 1, 0], [1, 0, 2]]);
        assert_eq!(matrix.total(), 6);
        assert_eq!(matrix.correct(), 4);
    }

    #[test]
    fn empty_class_has_zero_accuracy() {
        let matrix = ConfusionMatrix::from_predictions(&[0, 0], &[0, 1], 3).unwrap();

        assert_eq!(matrix.per_class_accuracy(), vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn rejects_labels_outside_the_class_set() {
        let result = ConfusionMatrix::from_predictions(&[0, 3], &[0, 1], 3);

        assert!(matches!(
            result,
            Err(Error::LabelOutOfRange { label: 3, classes: 3 })
        ));
    }
}
