use super::super::error::ModelError;
use ndarray::{Array2, ArrayView2, Axis};
use rand_distr::{Distribution, Normal};

/// A linear (fully-connected) layer with gradient accumulators
#[derive(Debug, Clone)]
pub struct Linear {
    pub weight: Array2<f32>,      // [input_dim, output_dim]
    pub bias: Array2<f32>,        // [1, output_dim]
    pub grad_weight: Array2<f32>,
    pub grad_bias: Array2<f32>,
    input: Option<Array2<f32>>,   // cached by forward_train for backward
}

impl Linear {
    pub fn new(input_dim: usize, output_dim: usize) -> Result<Self, ModelError> {
        let mut rng = rand::thread_rng();
        let normal = Normal::new(0.0, 0.02).map_err(|e| {
            ModelError::InitializationError(e.to_string())
        })?;

        Ok(Self {
            weight: Array2::from_shape_fn((input_dim, output_dim), |_| {
                normal.sample(&mut rng)
            }),
            bias: Array2::zeros((1, output_dim)),
            grad_weight: Array2::zeros((input_dim, output_dim)),
            grad_bias: Array2::zeros((1, output_dim)),
            input: None,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    fn check_input(&self, x: &ArrayView2<f32>) -> Result<(), ModelError> {
        if x.ncols() != self.input_dim() {
            return Err(ModelError::ShapeMismatch(format!(
                "Linear layer expects {} input columns, got {}",
                self.input_dim(),
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Forward pass for inference. No caching, no gradient bookkeeping.
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_input(&x)?;
        Ok(x.dot(&self.weight) + &self.bias)
    }

    /// Forward pass for training; caches the input for `backward`
    pub fn forward_train(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_input(&x)?;
        self.input = Some(x.to_owned());
        Ok(x.dot(&self.weight) + &self.bias)
    }

    /// Accumulates weight/bias gradients and returns the gradient w.r.t.
    /// the cached input
    pub fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        let input = self.input.as_ref().ok_or_else(|| {
            ModelError::BackwardError("Linear backward called before forward_train".to_string())
        })?;
        if grad_output.ncols() != self.output_dim() || grad_output.nrows() != input.nrows() {
            return Err(ModelError::BackwardError(format!(
                "Gradient shape {:?} does not match output [{}, {}]",
                grad_output.dim(),
                input.nrows(),
                self.output_dim()
            )));
        }

        self.grad_weight += &input.t().dot(&grad_output);
        self.grad_bias += &grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
        Ok(grad_output.dot(&self.weight.t()))
    }

    pub fn zero_grad(&mut self) {
        self.grad_weight.fill(0.0);
        self.grad_bias.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_linear_initialization() {
        let input_dim = 4;
        let output_dim = 3;
        let linear = Linear::new(input_dim, output_dim).unwrap();

        assert_eq!(linear.weight.shape(), &[input_dim, output_dim]);
        assert_eq!(linear.bias.shape(), &[1, output_dim]);
        assert_eq!(linear.param_count(), input_dim * output_dim + output_dim);
    }

    #[test]
    fn test_forward_computation_known_weights() {
        // Define a Linear layer manually for deterministic testing
        let weight = array![[1.0, 2.0], [0.0, 1.0], [-1.0, 0.0]];
        let bias = array![[0.5, -0.5]];
        let linear = Linear {
            grad_weight: Array2::zeros(weight.raw_dim()),
            grad_bias: Array2::zeros(bias.raw_dim()),
            weight,
            bias,
            input: None,
        };

        let input = Array::from_shape_vec((1, 3), vec![2.0, 3.0, 4.0]).unwrap();
        let output = linear.forward(input.view()).unwrap();

        // y = x · W + b = [2*1 + 3*0 + 4*(-1) + 0.5, 2*2 + 3*1 + 4*0 - 0.5]
        let expected = Array::from_shape_vec((1, 2), vec![-1.5, 6.5]).unwrap();
        for ((o, e), idx) in output.iter().zip(expected.iter()).zip(0..) {
            assert!((o - e).abs() < 1e-5, "Mismatch at index {}: got {}, expected {}", idx, o, e);
        }
    }

    #[test]
    fn test_backward_known_gradients() {
        let weight = array![[1.0, 0.0], [0.0, 1.0]];
        let bias = array![[0.0, 0.0]];
        let mut linear = Linear {
            grad_weight: Array2::zeros(weight.raw_dim()),
            grad_bias: Array2::zeros(bias.raw_dim()),
            weight,
            bias,
            input: None,
        };

        let input = array![[1.0, 2.0]];
        let _ = linear.forward_train(input.view()).unwrap();

        let grad_output = array![[1.0, -1.0]];
        let grad_input = linear.backward(grad_output.view()).unwrap();

        // grad_w = x^T · g, grad_b = column sums of g, grad_in = g · W^T
        assert_eq!(linear.grad_weight, array![[1.0, -1.0], [2.0, -2.0]]);
        assert_eq!(linear.grad_bias, array![[1.0, -1.0]]);
        assert_eq!(grad_input, array![[1.0, -1.0]]);
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut linear = Linear::new(2, 2).unwrap();
        let grad_output = array![[1.0, 1.0]];
        let result = linear.backward(grad_output.view());
        assert!(matches!(result, Err(ModelError::BackwardError(_))));
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let linear = Linear::new(3, 2).unwrap();
        let input = Array2::<f32>::zeros((1, 4));
        let result = linear.forward(input.view());
        assert!(matches!(result, Err(ModelError::ShapeMismatch(_))));
    }
}
