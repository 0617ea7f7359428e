use serde::{Deserialize, Serialize};

/// A rule adjusting an optimizer's learning rate over epochs. Applied at
/// the start of every epoch to the binding's base rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Keep the base rate
    Constant,
    /// Multiply by `gamma` every `step_size` epochs
    StepLr { step_size: usize, gamma: f32 },
    /// Multiply by `gamma` at each listed epoch
    MultiStepLr { milestones: Vec<usize>, gamma: f32 },
}

impl Default for LrSchedule {
    fn default() -> Self {
        Self::Constant
    }
}

impl LrSchedule {
    /// Convenience for the common step schedule with the stock decay of 0.1
    pub fn step(step_size: usize) -> Self {
        LrSchedule::StepLr {
            step_size,
            gamma: 0.1,
        }
    }

    /// The learning rate to use for `epoch` (0-based)
    pub fn learning_rate(&self, base_lr: f32, epoch: usize) -> f32 {
        match self {
            LrSchedule::Constant => base_lr,
            LrSchedule::StepLr { step_size, gamma } => {
                if *step_size == 0 {
                    return base_lr;
                }
                base_lr * gamma.powi((epoch / step_size) as i32)
            }
            LrSchedule::MultiStepLr { milestones, gamma } => {
                let passed = milestones.iter().filter(|&&m| m <= epoch).count();
                base_lr * gamma.powi(passed as i32)
            }
        }
    }
}
