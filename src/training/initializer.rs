use ndarray::Array2;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// Weight initialization scheme, applied per component at compile time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    Normal { mean: f32, std: f32 },
    Uniform { low: f32, high: f32 },
    XavierNormal,
    XavierUniform,
}

impl Initializer {
    /// Redraws every element of `param` in place
    pub fn apply(&self, param: &mut Array2<f32>, rng: &mut SmallRng) -> Result<(), ModelError> {
        let (fan_in, fan_out) = (param.nrows(), param.ncols());
        match self {
            Initializer::Normal { mean, std } => {
                let dist = Normal::new(*mean, *std)
                    .map_err(|e| ModelError::InitializationError(e.to_string()))?;
                param.mapv_inplace(|_| dist.sample(rng));
            }
            Initializer::Uniform { low, high } => {
                if low >= high {
                    return Err(ModelError::InitializationError(format!(
                        "Uniform bounds [{}, {}) are empty",
                        low, high
                    )));
                }
                let dist = Uniform::new(*low, *high);
                param.mapv_inplace(|_| dist.sample(rng));
            }
            Initializer::XavierNormal => {
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                let dist = Normal::new(0.0, std)
                    .map_err(|e| ModelError::InitializationError(e.to_string()))?;
                param.mapv_inplace(|_| dist.sample(rng));
            }
            Initializer::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                let dist = Uniform::new(-limit, limit);
                param.mapv_inplace(|_| dist.sample(rng));
            }
        }
        Ok(())
    }
}
