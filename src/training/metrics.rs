use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// An evaluation metric computed on the validation partition each epoch.
/// Classification metrics receive activated outputs (probabilities);
/// regression metrics receive raw outputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Metric {
    /// Fraction of thresholded probabilities matching the binary target
    BinaryAccuracy,
    /// Fraction of argmax rows matching the class index target
    Accuracy,
    /// Root mean squared error of the first output column
    RootMeanSquaredError,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::BinaryAccuracy => "binary_accuracy",
            Metric::Accuracy => "accuracy",
            Metric::RootMeanSquaredError => "rmse",
        }
    }

    pub fn compute(&self, predictions: ArrayView2<f32>, targets: ArrayView1<f32>) -> f32 {
        let n = targets.len();
        if n == 0 || predictions.nrows() != n {
            return f32::NAN;
        }
        match self {
            Metric::BinaryAccuracy => {
                let correct = predictions
                    .column(0)
                    .iter()
                    .zip(targets.iter())
                    .filter(|(&p, &y)| (p >= 0.5) == (y >= 0.5))
                    .count();
                correct as f32 / n as f32
            }
            Metric::Accuracy => {
                let correct = predictions
                    .rows()
                    .into_iter()
                    .zip(targets.iter())
                    .filter(|(row, &y)| {
                        let mut best = 0;
                        for (j, &v) in row.iter().enumerate() {
                            if v > row[best] {
                                best = j;
                            }
                        }
                        best == y.round() as usize
                    })
                    .count();
                correct as f32 / n as f32
            }
            Metric::RootMeanSquaredError => {
                let sum: f32 = predictions
                    .column(0)
                    .iter()
                    .zip(targets.iter())
                    .map(|(&p, &y)| (p - y) * (p - y))
                    .sum();
                (sum / n as f32).sqrt()
            }
        }
    }
}

/// One epoch's summary, recorded in the fit history
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    /// Metric name -> value, in the order metrics were registered
    pub metrics: Vec<(String, f32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_binary_accuracy() {
        let predictions = array![[0.9], [0.2], [0.6], [0.4]];
        let targets = Array1::from(vec![1.0, 0.0, 0.0, 0.0]);
        let value = Metric::BinaryAccuracy.compute(predictions.view(), targets.view());
        assert_abs_diff_eq!(value, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_accuracy_uses_argmax() {
        let predictions = array![[0.1, 0.7, 0.2], [0.5, 0.3, 0.2]];
        let targets = Array1::from(vec![1.0, 2.0]);
        let value = Metric::Accuracy.compute(predictions.view(), targets.view());
        assert_abs_diff_eq!(value, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rmse() {
        let predictions = array![[1.0], [5.0]];
        let targets = Array1::from(vec![0.0, 2.0]);
        let value = Metric::RootMeanSquaredError.compute(predictions.view(), targets.view());
        assert_abs_diff_eq!(value, (10.0f32 / 2.0).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_empty_targets_yield_nan() {
        let predictions = array![[0.5]];
        let targets = Array1::from(vec![]);
        assert!(Metric::BinaryAccuracy
            .compute(predictions.view(), targets.view())
            .is_nan());
    }
}
