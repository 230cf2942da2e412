use std::fmt;

use serde::{Deserialize, Serialize};

use super::confusion::{ratio, ConfusionMatrix};
use crate::classes::ClassIndex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class precision, recall and F1, with unweighted and support-weighted
/// averages. Any metric with a zero denominator is reported as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: AverageScores,
    pub weighted_avg: AverageScores,
    pub support: usize,
}

impl ClassificationReport {
    pub fn new(matrix: &ConfusionMatrix, names: &ClassIndex) -> Self {
        let classes: Vec<ClassScores> = (0..matrix.num_classes())
            .map(|class| {
                let true_positive = matrix.counts()[[class, class]];
                let precision = ratio(true_positive, matrix.column_sum(class));
                let recall = ratio(true_positive, matrix.row_sum(class));
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassScores {
                    name: names
                        .name(class)
                        .map(str::to_owned)
                        .unwrap_or_else(|| class.to_string()),
                    precision,
                    recall,
                    f1,
                    support: matrix.row_sum(class),
                }
            })
            .collect();

        let support = matrix.total();
        let count = classes.len().max(1) as f64;
        let macro_avg = AverageScores {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / count,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / count,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / count,
        };

        let weight = |metric: fn(&ClassScores) -> f64| {
            if support == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / support as f64
        };
        let weighted_avg = AverageScores {
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1: weight(|c| c.f1),
        };

        Self {
            accuracy: matrix.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            support,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.support
        )?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, avg.precision, avg.recall, avg.f1, self.support
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn report() -> ClassificationReport {
        let matrix = ConfusionMatrix::from_counts(array![[8, 1, 1], [0, 9, 1], [2, 0, 8]]);
        ClassificationReport::new(&matrix, &ClassIndex::new(["am", "fm", "qpsk"]))
    }

    #[test]
    fn per_class_scores() {
        let report = report();
        let am = &report.classes[0];

        assert_eq!(am.name, "am");
        assert_eq!(am.support, 10);
        assert!((am.precision - 0.8).abs() < 1e-12);
        assert!((am.recall - 0.8).abs() < 1e-12);
        assert!((am.f1 - 0.8).abs() < 1e-12);

        let fm = &report.classes[1];
        assert!((fm.precision - 0.9).abs() < 1e-12);
        assert!((fm.recall - 0.9).abs() < 1e-12);
    }

    #[test]
    fn averages_and_accuracy() {
        let report = report();

        assert!((report.accuracy - 25.0 / 30.0).abs() < 1e-12);
        assert_eq!(report.support, 30);
        // equal supports make both averages coincide
        assert!((report.macro_avg.recall - report.weighted_avg.recall).abs() < 1e-12);
        assert!((report.macro_avg.recall - 25.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn renders_every_class_row() {
        let text = report().to_string();

        for label in ["am", "fm", "qpsk", "accuracy", "macro avg", "weighted avg"] {
            assert!(text.contains(label), "missing `{label}` in\n{text}");
        }
        assert!(text.contains("0.80"));
    }

    #[test]
    fn unpredicted_class_scores_zero() {
        let matrix = ConfusionMatrix::from_counts(array![[2, 0], [3, 0]]);
        let report = ClassificationReport::new(&matrix, &ClassIndex::new(["a", "b"]));

        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].recall, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }
}
