use ndarray::{Array2, ArrayView2};

use super::error::ModelError;
use super::layers::Linear;
use super::Component;

/// The wide part: a single linear map over the sparse one-hot/crossed
/// features, projecting straight to the output dimension.
#[derive(Debug)]
pub struct Wide {
    linear: Linear,
}

impl Wide {
    pub fn new(wide_dim: usize, output_dim: usize) -> Result<Self, ModelError> {
        if wide_dim == 0 {
            return Err(ModelError::ConfigError(
                "Wide component needs at least one input column".to_string(),
            ));
        }
        Ok(Self {
            linear: Linear::new(wide_dim, output_dim)?,
        })
    }
}

impl Component for Wide {
    fn input_dim(&self) -> usize {
        self.linear.input_dim()
    }

    fn param_count(&self) -> usize {
        self.linear.param_count()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.linear.forward(input)
    }

    fn forward_train(&mut self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.linear.forward_train(input)
    }

    fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<(), ModelError> {
        self.linear.backward(grad_output)?;
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.linear.zero_grad();
    }

    fn for_each_param(&self, visit: &mut dyn FnMut(&str, &Array2<f32>)) {
        visit("weight", &self.linear.weight);
        visit("bias", &self.linear.bias);
    }

    fn for_each_param_mut(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut Array2<f32>, &mut Array2<f32>),
    ) {
        visit("weight", &mut self.linear.weight, &mut self.linear.grad_weight);
        visit("bias", &mut self.linear.bias, &mut self.linear.grad_bias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_wide_param_count() {
        let wide = Wide::new(5, 1).unwrap();
        assert_eq!(wide.param_count(), 5 + 1);
    }

    #[test]
    fn test_wide_forward_shape() {
        let wide = Wide::new(4, 2).unwrap();
        let input = Array2::<f32>::zeros((3, 4));
        let output = wide.forward(input.view()).unwrap();
        assert_eq!(output.dim(), (3, 2));
    }

    #[test]
    fn test_wide_rejects_empty_input() {
        assert!(matches!(Wide::new(0, 1), Err(ModelError::ConfigError(_))));
    }
}
