use serde::{Deserialize, Serialize};

/// Receiver operating characteristic of one class against the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub false_positive_rate: Vec<f64>,
    pub true_positive_rate: Vec<f64>,
    /// Decreasing; the first threshold is `+inf` and admits no sample.
    pub thresholds: Vec<f64>,
    pub auc: f64,
}

impl RocCurve {
    /// Builds the curve by thresholding `scores` at every distinct value.
    /// Returns `None` when either the positive or the negative set is empty,
    /// since one of the two rates is then undefined.
    pub fn from_scores(scores: &[f32], positive: &[bool]) -> Option<Self> {
        let mut pairs: Vec<(f64, bool)> = scores
            .iter()
            .zip(positive)
            .map(|(&score, &positive)| (score as f64, positive))
            .collect();
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let positives = pairs.iter().filter(|(_, positive)| *positive).count();
        let negatives = pairs.len() - positives;
        if positives == 0 || negatives == 0 {
            return None;
        }

        // cumulative (false positives, true positives) at each distinct score
        let mut points = vec![(0usize, 0usize, f64::INFINITY)];
        let (mut fp, mut tp) = (0, 0);
        for (index, &(score, positive)) in pairs.iter().enumerate() {
            if positive {
                tp += 1;
            } else {
                fp += 1;
            }

            let last_of_score = pairs
                .get(index + 1)
                .map_or(true, |&(next, _)| next != score);
            if last_of_score {
                points.push((fp, tp, score));
            }
        }

        let points = drop_intermediate(points);

        let false_positive_rate: Vec<f64> = points
            .iter()
            .map(|&(fp, _, _)| fp as f64 / negatives as f64)
            .collect();
        let true_positive_rate: Vec<f64> = points
            .iter()
            .map(|&(_, tp, _)| tp as f64 / positives as f64)
            .collect();
        let thresholds = points.iter().map(|&(_, _, threshold)| threshold).collect();
        let auc = trapezoid(&false_positive_rate, &true_positive_rate);

        Some(Self {
            false_positive_rate,
            true_positive_rate,
            thresholds,
            auc,
        })
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.false_positive_rate
            .iter()
            .copied()
            .zip(self.true_positive_rate.iter().copied())
    }
}

/// Removes interior points whose false and true positive counts both have a
/// zero second difference, as scikit-learn's `drop_intermediate` does. Such a
/// point is the midpoint of its neighbours, so the area is unchanged.
fn drop_intermediate(points: Vec<(usize, usize, f64)>) -> Vec<(usize, usize, f64)> {
    if points.len() <= 2 {
        return points;
    }

    let mut kept = vec![points[0]];
    for window in points.windows(3) {
        let [(fp0, tp0, _), (fp1, tp1, _), (fp2, tp2, _)] = [window[0], window[1], window[2]];
        let fp_bends = fp0 + fp2 != 2 * fp1;
        let tp_bends = tp0 + tp2 != 2 * tp1;
        if fp_bends || tp_bends {
            kept.push(window[1]);
        }
    }
    kept.push(points[points.len() - 1]);

    kept
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_separation_has_unit_area() {
        let curve = RocCurve::from_scores(&[0.9, 0.8, 0.3, 0.1], &[true, true, false, false]).unwrap();

        assert!((curve.auc - 1.0).abs() < 1e-12);
        assert_eq!(curve.points().next(), Some((0.0, 0.0)));
        assert_eq!(curve.points().last(), Some((1.0, 1.0)));
    }

    #[test]
    fn reversed_scores_have_zero_area() {
        let curve = RocCurve::from_scores(&[0.1, 0.2, 0.8, 0.9], &[true, true, false, false]).unwrap();

        assert!(curve.auc.abs() < 1e-12);
    }

    #[test]
    fn matches_reference_example() {
        let curve =
            RocCurve::from_scores(&[0.1, 0.4, 0.35, 0.8], &[false, false, true, true]).unwrap();

        assert!((curve.auc - 0.75).abs() < 1e-12);
        assert_eq!(curve.false_positive_rate, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.true_positive_rate, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(curve.thresholds[0], f64::INFINITY);
        assert!((curve.thresholds[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn tied_scores_form_a_single_step() {
        let curve = RocCurve::from_scores(&[0.5, 0.5, 0.5, 0.5], &[true, false, true, false]).unwrap();

        assert_eq!(curve.false_positive_rate, vec![0.0, 1.0]);
        assert_eq!(curve.true_positive_rate, vec![0.0, 1.0]);
        assert!((curve.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_sided_labels_have_no_curve() {
        assert!(RocCurve::from_scores(&[0.2, 0.7], &[true, true]).is_none());
        assert!(RocCurve::from_scores(&[0.2, 0.7], &[false, false]).is_none());
    }

    #[test]
    fn only_evenly_spaced_midpoints_are_dropped() {
        let points = vec![
            (0, 0, f64::INFINITY),
            (0, 1, 0.9),
            (0, 2, 0.8),
            (0, 4, 0.7),
            (2, 4, 0.2),
        ];

        let kept: Vec<_> = drop_intermediate(points)
            .into_iter()
            .map(|(fp, tp, _)| (fp, tp))
            .collect();

        // (0, 2) sits on the same vertical segment but is not a midpoint
        assert_eq!(kept, vec![(0, 0), (0, 2), (0, 4), (2, 4)]);
    }
}
