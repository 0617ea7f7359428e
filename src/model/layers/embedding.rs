use super::super::error::ModelError;
use ndarray::{Array2, ArrayView2};
use rand_distr::{Distribution, Normal};

/// Embedding table for one categorical column
#[derive(Debug, Clone)]
pub struct Embedding {
    pub weight: Array2<f32>, // [n_categories, dim]
    pub grad: Array2<f32>,
}

impl Embedding {
    pub fn new(n_categories: usize, dim: usize) -> Result<Self, ModelError> {
        let mut rng = rand::thread_rng();
        let normal = Normal::new(0.0, 0.02).map_err(|e| {
            ModelError::InitializationError(e.to_string())
        })?;

        Ok(Self {
            weight: Array2::from_shape_fn((n_categories, dim), |_| {
                normal.sample(&mut rng)
            }),
            grad: Array2::zeros((n_categories, dim)),
        })
    }

    pub fn n_categories(&self) -> usize {
        self.weight.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn param_count(&self) -> usize {
        self.weight.len()
    }

    /// Gathers the embedding row for each index: output is [batch, dim]
    pub fn forward(&self, indices: &[usize]) -> Result<Array2<f32>, ModelError> {
        let mut output = Array2::zeros((indices.len(), self.dim()));
        for (row, &idx) in indices.iter().enumerate() {
            if idx >= self.n_categories() {
                return Err(ModelError::ForwardError(format!(
                    "Category index {} outside embedding table of {} rows",
                    idx,
                    self.n_categories()
                )));
            }
            output.row_mut(row).assign(&self.weight.row(idx));
        }
        Ok(output)
    }

    /// Scatter-accumulates gradients into the rows selected by `indices`
    pub fn backward(&mut self, indices: &[usize], grad_output: ArrayView2<f32>) -> Result<(), ModelError> {
        if grad_output.nrows() != indices.len() || grad_output.ncols() != self.dim() {
            return Err(ModelError::BackwardError(format!(
                "Gradient shape {:?} does not match [{}, {}]",
                grad_output.dim(),
                indices.len(),
                self.dim()
            )));
        }
        for (row, &idx) in indices.iter().enumerate() {
            let mut target = self.grad.row_mut(idx);
            target += &grad_output.row(row);
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}
