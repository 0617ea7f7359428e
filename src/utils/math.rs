use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MathError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

/// Numerically stable logistic function
pub fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Applies the logistic function elementwise
pub fn sigmoid_2d(logits: ArrayView2<f32>) -> Array2<f32> {
    logits.mapv(sigmoid)
}

/// Computes softmax along the last dimension of a 2D array
pub fn softmax_rows(matrix: &mut ArrayViewMut2<f32>) {
    for mut row in matrix.rows_mut() {
        // Find max value, ignoring NaNs and infinities
        let max = row.fold(f32::NEG_INFINITY, |a, &b| {
            if b.is_nan() || b.is_infinite() { a } else { a.max(b) }
        });

        // If we got -inf (all values were non-finite), set to uniform distribution
        if max == f32::NEG_INFINITY {
            row.fill(1.0 / row.len() as f32);
            continue;
        }

        let mut sum = 0.0f32;
        for val in row.iter_mut() {
            *val = (*val - max).exp();
            sum += *val;
        }

        sum = sum.max(1e-20);
        for val in row.iter_mut() {
            *val /= sum;
        }
    }
}

fn check_single_column(logits: &ArrayView2<f32>, targets: &ArrayView1<f32>) -> Result<(), MathError> {
    if logits.ncols() != 1 {
        return Err(MathError::DimensionMismatch(format!(
            "Expected a single output column, got {}",
            logits.ncols()
        )));
    }
    if logits.nrows() != targets.len() {
        return Err(MathError::DimensionMismatch(format!(
            "Expected {} rows, got {}",
            targets.len(),
            logits.nrows()
        )));
    }
    Ok(())
}

/// Binary cross-entropy over raw logits, averaged over the batch.
/// Uses the max(z, 0) - z*y + ln(1 + exp(-|z|)) form so large logits
/// never overflow.
pub fn binary_cross_entropy(
    logits: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<f32, MathError> {
    check_single_column(&logits, &targets)?;

    let mut loss = 0.0;
    for (z, &y) in logits.column(0).iter().zip(targets.iter()) {
        loss += z.max(0.0) - z * y + (-z.abs()).exp().ln_1p();
    }
    Ok(loss / targets.len().max(1) as f32)
}

/// Gradient of binary cross-entropy w.r.t. logits: (sigmoid(z) - y) / n
pub fn d_binary_cross_entropy(
    logits: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<Array2<f32>, MathError> {
    check_single_column(&logits, &targets)?;

    let n = targets.len().max(1) as f32;
    let mut grad = logits.to_owned();
    for (g, &y) in grad.column_mut(0).iter_mut().zip(targets.iter()) {
        *g = (sigmoid(*g) - y) / n;
    }
    Ok(grad)
}

fn class_index(target: f32, n_classes: usize) -> Result<usize, MathError> {
    let class = target.round();
    if class < 0.0 || class as usize >= n_classes {
        return Err(MathError::InvalidTarget(format!(
            "Class {} outside 0..{}",
            target, n_classes
        )));
    }
    Ok(class as usize)
}

/// Categorical cross-entropy over raw logits, averaged over the batch.
/// Targets hold class indices stored as floats.
pub fn cross_entropy(
    logits: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<f32, MathError> {
    if logits.nrows() != targets.len() {
        return Err(MathError::DimensionMismatch(format!(
            "Expected {} rows, got {}",
            targets.len(),
            logits.nrows()
        )));
    }

    let mut loss = 0.0;
    for (row, &target) in logits.rows().into_iter().zip(targets.iter()) {
        let class = class_index(target, logits.ncols())?;
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let sum_exp: f32 = row.iter().map(|&x| (x - max).exp()).sum();
        let log_prob = (row[class] - max) - sum_exp.ln();
        loss -= log_prob;
    }

    Ok(loss / targets.len().max(1) as f32)
}

/// Gradient of categorical cross-entropy w.r.t. logits:
/// (softmax(z) - onehot(y)) / n
pub fn d_cross_entropy(
    logits: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<Array2<f32>, MathError> {
    if logits.nrows() != targets.len() {
        return Err(MathError::DimensionMismatch(format!(
            "Expected {} rows, got {}",
            targets.len(),
            logits.nrows()
        )));
    }

    let n = targets.len().max(1) as f32;
    let mut grad = logits.to_owned();
    softmax_rows(&mut grad.view_mut());
    for (i, &target) in targets.iter().enumerate() {
        let class = class_index(target, grad.ncols())?;
        grad[[i, class]] -= 1.0;
    }
    grad.mapv_inplace(|g| g / n);
    Ok(grad)
}

/// Mean squared error, averaged over the batch
pub fn mean_squared_error(
    outputs: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<f32, MathError> {
    check_single_column(&outputs, &targets)?;

    let mut loss = 0.0;
    for (z, &y) in outputs.column(0).iter().zip(targets.iter()) {
        let d = z - y;
        loss += d * d;
    }
    Ok(loss / targets.len().max(1) as f32)
}

/// Gradient of mean squared error w.r.t. outputs: 2 (z - y) / n
pub fn d_mean_squared_error(
    outputs: ArrayView2<f32>,
    targets: ArrayView1<f32>,
) -> Result<Array2<f32>, MathError> {
    check_single_column(&outputs, &targets)?;

    let n = targets.len().max(1) as f32;
    let mut grad = outputs.to_owned();
    for (g, &y) in grad.column_mut(0).iter_mut().zip(targets.iter()) {
        *g = 2.0 * (*g - y) / n;
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_sigmoid_extremes_stay_finite() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-6);
        assert!(sigmoid(100.0) <= 1.0);
        assert!(sigmoid(-100.0) >= 0.0);
        assert!(sigmoid(100.0).is_finite());
        assert!(sigmoid(-100.0).is_finite());
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut matrix = array![[1.0, 2.0, 3.0], [1.0, 1.0, 1.0]];
        softmax_rows(&mut matrix.view_mut());
        for row in matrix.rows() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_binary_cross_entropy_matches_naive_form() {
        let logits = array![[0.3], [-1.2], [2.0]];
        let targets = Array1::from(vec![1.0, 0.0, 1.0]);

        let loss = binary_cross_entropy(logits.view(), targets.view()).unwrap();

        let mut expected = 0.0;
        for (&z, &y) in logits.column(0).iter().zip(targets.iter()) {
            let p: f32 = sigmoid(z);
            expected -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
        }
        expected /= targets.len() as f32;

        assert_abs_diff_eq!(loss, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_d_binary_cross_entropy_sign() {
        let logits = array![[3.0], [-3.0]];
        let targets = Array1::from(vec![0.0, 1.0]);
        let grad = d_binary_cross_entropy(logits.view(), targets.view()).unwrap();

        // Confident wrong predictions push hard in the correcting direction
        assert!(grad[[0, 0]] > 0.0);
        assert!(grad[[1, 0]] < 0.0);
    }

    #[test]
    fn test_cross_entropy_and_gradient() {
        let logits = array![[2.0, 1.0, 0.1], [1.0, 3.0, 0.2]];
        let targets = Array1::from(vec![0.0, 1.0]);

        let loss = cross_entropy(logits.view(), targets.view()).unwrap();
        assert!(loss > 0.0);

        let grad = d_cross_entropy(logits.view(), targets.view()).unwrap();
        assert_eq!(grad.dim(), (2, 3));
        for row in grad.rows() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 0.0).abs() < 1e-5); // Gradient sums to 0 per row
        }
    }

    #[test]
    fn test_cross_entropy_rejects_out_of_range_class() {
        let logits = array![[0.0, 0.0]];
        let targets = Array1::from(vec![5.0]);
        let result = cross_entropy(logits.view(), targets.view());
        assert!(matches!(result, Err(MathError::InvalidTarget(_))));
    }

    #[test]
    fn test_mean_squared_error() {
        let outputs = array![[1.0], [3.0]];
        let targets = Array1::from(vec![0.0, 1.0]);

        let loss = mean_squared_error(outputs.view(), targets.view()).unwrap();
        assert_abs_diff_eq!(loss, (1.0 + 4.0) / 2.0, epsilon = 1e-6);

        let grad = d_mean_squared_error(outputs.view(), targets.view()).unwrap();
        assert_abs_diff_eq!(grad[[0, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[[1, 0]], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_loss_rejects_row_mismatch() {
        let logits = array![[0.1], [0.2]];
        let targets = Array1::from(vec![1.0]);
        let result = binary_cross_entropy(logits.view(), targets.view());
        assert!(matches!(result, Err(MathError::DimensionMismatch(_))));
    }
}
