// In: src/metrics/mod.rs

//! Evaluation metrics reported per trained candidate.
//!
//! The engine computes a `Metrics` value on the comparison split (to rank grid
//! candidates) and on the test split (cached on the model handle).

use serde::{Deserialize, Serialize};

use crate::config::ComparisonMetric;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metrics {
    Regression(RegressionMetrics),
    BinaryClassification(BinaryClassificationMetrics),
    MulticlassClassification(MulticlassClassificationMetrics),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegressionMetrics {
    pub mse: f32,
    pub rmse: f32,
    pub mae: f32,
    pub r2: f32,
    /// The mse of always predicting the mean label.
    pub baseline_mse: f32,
    pub baseline_rmse: f32,
}

/// Thresholds reported per binary model, evenly spaced in (0, 1). Odd, so 0.5
/// is the middle one.
pub const BINARY_METRICS_THRESHOLDS: usize = 9;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BinaryClassificationMetrics {
    pub auc_roc: f32,
    /// The following are computed at a threshold of 0.5.
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Accuracy of always predicting the majority class.
    pub baseline_accuracy: f32,
    /// Confusion counts and rates at each of `BINARY_METRICS_THRESHOLDS`
    /// thresholds, ascending.
    #[serde(default)]
    pub thresholds: Vec<ThresholdMetrics>,
}

/// Binary metrics when rows with p(positive) >= `threshold` are called positive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThresholdMetrics {
    pub threshold: f32,
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub false_positive_rate: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MulticlassClassificationMetrics {
    pub accuracy: f32,
    pub baseline_accuracy: f32,
    /// Per class, in target variant order.
    pub class_metrics: Vec<ClassMetrics>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl Metrics {
    /// The value of `metric`, or `None` if this kind of metrics does not carry it.
    pub fn score(&self, metric: ComparisonMetric) -> Option<f32> {
        match (self, metric) {
            (Metrics::Regression(m), ComparisonMetric::Mae) => Some(m.mae),
            (Metrics::Regression(m), ComparisonMetric::Mse) => Some(m.mse),
            (Metrics::Regression(m), ComparisonMetric::Rmse) => Some(m.rmse),
            (Metrics::Regression(m), ComparisonMetric::R2) => Some(m.r2),
            (Metrics::BinaryClassification(m), ComparisonMetric::Auc) => Some(m.auc_roc),
            (Metrics::BinaryClassification(m), ComparisonMetric::Accuracy) => Some(m.accuracy),
            (Metrics::BinaryClassification(m), ComparisonMetric::F1) => Some(m.f1),
            (Metrics::MulticlassClassification(m), ComparisonMetric::Accuracy) => {
                Some(m.accuracy)
            }
            _ => None,
        }
    }
}

//==================================================================================
// Computation
//==================================================================================

pub fn regression_metrics(predictions: &[f32], labels: &[f32]) -> RegressionMetrics {
    let n = labels.len().max(1) as f64;
    let mean = labels.iter().map(|&l| l as f64).sum::<f64>() / n;

    let mut squared_error = 0.0f64;
    let mut absolute_error = 0.0f64;
    let mut baseline_squared_error = 0.0f64;
    for (&prediction, &label) in predictions.iter().zip(labels) {
        let error = prediction as f64 - label as f64;
        squared_error += error * error;
        absolute_error += error.abs();
        baseline_squared_error += (label as f64 - mean).powi(2);
    }

    let mse = squared_error / n;
    let baseline_mse = baseline_squared_error / n;
    let r2 = if baseline_squared_error > 0.0 {
        1.0 - squared_error / baseline_squared_error
    } else {
        f64::NAN
    };
    RegressionMetrics {
        mse: mse as f32,
        rmse: mse.sqrt() as f32,
        mae: (absolute_error / n) as f32,
        r2: r2 as f32,
        baseline_mse: baseline_mse as f32,
        baseline_rmse: baseline_mse.sqrt() as f32,
    }
}

/// `probabilities` holds the probability of the positive class per row.
pub fn binary_classification_metrics(
    probabilities: &[f32],
    labels: &[bool],
) -> BinaryClassificationMetrics {
    let at_half = threshold_metrics(probabilities, labels, 0.5);
    let total = labels.len().max(1) as f32;
    let positives = at_half.true_positives + at_half.false_negatives;
    let negatives = at_half.false_positives + at_half.true_negatives;

    let steps = (BINARY_METRICS_THRESHOLDS + 1) as f32;
    let thresholds = (1..=BINARY_METRICS_THRESHOLDS)
        .map(|i| threshold_metrics(probabilities, labels, i as f32 / steps))
        .collect();

    BinaryClassificationMetrics {
        auc_roc: auc_roc(probabilities, labels),
        accuracy: at_half.accuracy,
        precision: at_half.precision,
        recall: at_half.recall,
        f1: at_half.f1,
        baseline_accuracy: positives.max(negatives) as f32 / total,
        thresholds,
    }
}

pub fn threshold_metrics(
    probabilities: &[f32],
    labels: &[bool],
    threshold: f32,
) -> ThresholdMetrics {
    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (&probability, &label) in probabilities.iter().zip(labels) {
        match (probability >= threshold, label) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }
    let total = (tp + fp + tn + fn_).max(1) as f32;
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);

    ThresholdMetrics {
        threshold,
        true_positives: tp as u64,
        false_positives: fp as u64,
        true_negatives: tn as u64,
        false_negatives: fn_ as u64,
        accuracy: (tp + tn) as f32 / total,
        precision,
        recall,
        f1: harmonic_mean(precision, recall),
        false_positive_rate: ratio(fp, fp + tn),
    }
}

/// Area under the ROC curve by the trapezoidal rule.
///
/// Rows with equal probability form one step of the curve. Returns NaN when
/// the labels hold a single class.
pub fn auc_roc(probabilities: &[f32], labels: &[bool]) -> f32 {
    let mut rows: Vec<(f32, bool)> = probabilities
        .iter()
        .copied()
        .zip(labels.iter().copied())
        .collect();
    rows.sort_by(|a, b| b.0.total_cmp(&a.0));

    let positives = rows.iter().filter(|(_, label)| *label).count() as f64;
    let negatives = rows.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return f32::NAN;
    }

    let mut area = 0.0f64;
    let (mut tp, mut fp) = (0.0f64, 0.0f64);
    let (mut prev_tpr, mut prev_fpr) = (0.0f64, 0.0f64);
    let mut i = 0;
    while i < rows.len() {
        let threshold = rows[i].0;
        while i < rows.len() && rows[i].0 == threshold {
            if rows[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let (tpr, fpr) = (tp / positives, fp / negatives);
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }
    area as f32
}

/// `probabilities` holds one row of class probabilities per example.
pub fn multiclass_classification_metrics(
    probabilities: &[Vec<f32>],
    labels: &[usize],
    n_classes: usize,
) -> MulticlassClassificationMetrics {
    // confusion[actual][predicted]
    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (row, &label) in probabilities.iter().zip(labels) {
        let predicted = argmax(row);
        if label < n_classes && predicted < n_classes {
            confusion[label][predicted] += 1;
        }
    }

    let total = labels.len().max(1) as f32;
    let correct: usize = (0..n_classes).map(|c| confusion[c][c]).sum();
    let majority = confusion
        .iter()
        .map(|row| row.iter().sum::<usize>())
        .max()
        .unwrap_or(0);

    let class_metrics = (0..n_classes)
        .map(|class| {
            let tp = confusion[class][class];
            let predicted: usize = confusion.iter().map(|row| row[class]).sum();
            let actual: usize = confusion[class].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, actual);
            ClassMetrics {
                precision,
                recall,
                f1: harmonic_mean(precision, recall),
            }
        })
        .collect();

    MulticlassClassificationMetrics {
        accuracy: correct as f32 / total,
        baseline_accuracy: majority as f32 / total,
        class_metrics,
    }
}

/// Index of the largest value. Ties resolve to the first index.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = i;
        }
    }
    best
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

fn harmonic_mean(a: f32, b: f32) -> f32 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regression_metrics() {
        let metrics = regression_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]);
        assert!((metrics.mse - 4.0 / 3.0).abs() < 1e-6);
        assert!((metrics.mae - 2.0 / 3.0).abs() < 1e-6);
        assert!((metrics.rmse - (4.0f32 / 3.0).sqrt()).abs() < 1e-6);
        // Labels have mean 8/3; total sum of squares is 26/3.
        assert!((metrics.r2 - (1.0 - 12.0 / 26.0)).abs() < 1e-5);
    }

    #[test]
    fn test_auc_perfect_random_and_ties() {
        let labels = [false, false, true, true];
        assert_eq!(auc_roc(&[0.1, 0.2, 0.8, 0.9], &labels), 1.0);
        assert_eq!(auc_roc(&[0.9, 0.8, 0.2, 0.1], &labels), 0.0);
        // All probabilities tied: the curve is the diagonal.
        assert_eq!(auc_roc(&[0.5, 0.5, 0.5, 0.5], &labels), 0.5);
        assert!(auc_roc(&[0.1, 0.9], &[true, true]).is_nan());
    }

    #[test]
    fn test_binary_metrics_at_half_threshold() {
        let metrics = binary_classification_metrics(
            &[0.9, 0.6, 0.4, 0.2],
            &[true, false, true, false],
        );
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.precision, 0.5);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.f1, 0.5);
        assert_eq!(metrics.auc_roc, 0.75);
    }

    #[test]
    fn test_threshold_metrics_are_ascending_and_centered() {
        let metrics = binary_classification_metrics(
            &[0.95, 0.65, 0.35, 0.05],
            &[true, false, true, false],
        );
        assert_eq!(metrics.thresholds.len(), BINARY_METRICS_THRESHOLDS);

        let middle = &metrics.thresholds[BINARY_METRICS_THRESHOLDS / 2];
        assert_eq!(middle.threshold, 0.5);
        assert_eq!(middle.accuracy, metrics.accuracy);
        assert_eq!(middle.f1, metrics.f1);

        // At 0.1 everything but the last row is called positive.
        let lowest = &metrics.thresholds[0];
        assert_eq!(
            (lowest.true_positives, lowest.false_positives, lowest.true_negatives),
            (2, 1, 1)
        );
        assert_eq!(lowest.false_positive_rate, 0.5);
        // At 0.9 only the first row is.
        let highest = &metrics.thresholds[BINARY_METRICS_THRESHOLDS - 1];
        assert_eq!((highest.true_positives, highest.false_negatives), (1, 1));
        assert_eq!(highest.precision, 1.0);
    }

    #[test]
    fn test_multiclass_metrics() {
        let probabilities = vec![
            vec![0.7, 0.2, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.2, 0.3, 0.5],
            vec![0.6, 0.3, 0.1],
        ];
        let metrics = multiclass_classification_metrics(&probabilities, &[0, 1, 2, 1], 3);
        assert_eq!(metrics.accuracy, 0.75);
        assert_eq!(metrics.baseline_accuracy, 0.5);
        assert_eq!(metrics.class_metrics[1].recall, 0.5);
    }

    #[test]
    fn test_score_lookup_by_task() {
        let metrics = Metrics::MulticlassClassification(multiclass_classification_metrics(
            &[vec![1.0, 0.0]],
            &[0],
            2,
        ));
        assert_eq!(metrics.score(ComparisonMetric::Accuracy), Some(1.0));
        assert_eq!(metrics.score(ComparisonMetric::Auc), None);
    }
}
