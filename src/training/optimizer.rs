use std::collections::HashMap;

use ndarray::Array2;

use crate::model::Component;

const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// First/second moment estimates for a single parameter matrix
#[derive(Debug, Clone)]
struct MomentState {
    m: Array2<f32>,
    v: Array2<f32>,
}

impl MomentState {
    fn zeros_like(param: &Array2<f32>) -> Self {
        Self {
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        }
    }
}

/// Adam optimizer
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: usize,
    state: HashMap<String, MomentState>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            state: HashMap::new(),
        }
    }

    fn step(&mut self, component: &mut dyn Component) {
        self.step += 1;
        let t = self.step as f32;
        let lr = self.learning_rate;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let state = &mut self.state;

        component.for_each_param_mut(&mut |name, param, grad| {
            let entry = state
                .entry(name.to_string())
                .or_insert_with(|| MomentState::zeros_like(param));

            // Update first moment estimate (m)
            entry.m = &entry.m * beta1 + &*grad * (1.0 - beta1);

            // Update second moment estimate (v)
            entry.v = &entry.v * beta2 + grad.mapv(|g| g * g) * (1.0 - beta2);

            // Compute bias-corrected estimates
            let m_hat = &entry.m / (1.0 - beta1.powf(t));
            let v_hat = &entry.v / (1.0 - beta2.powf(t));

            // Compute and apply update
            let denom = v_hat.mapv(|v| v.sqrt() + epsilon);
            let update = (m_hat / denom) * lr;
            *param -= &update;
        });
    }
}

/// Stochastic gradient descent, optionally with momentum
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    velocity: HashMap<String, Array2<f32>>,
}

impl Sgd {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: HashMap::new(),
        }
    }

    fn step(&mut self, component: &mut dyn Component) {
        let lr = self.learning_rate;
        let momentum = self.momentum;
        let velocity = &mut self.velocity;

        component.for_each_param_mut(&mut |name, param, grad| {
            if momentum > 0.0 {
                let v = velocity
                    .entry(name.to_string())
                    .or_insert_with(|| Array2::zeros(param.raw_dim()));
                *v = &*v * momentum + &*grad;
                *param -= &(&*v * lr);
            } else {
                *param -= &(&*grad * lr);
            }
        });
    }
}

/// A strongly-typed optimizer handle. Each model component is bound to its
/// own instance, so the wide optimizer never touches deep parameters and
/// vice versa.
#[derive(Debug, Clone)]
pub enum Optimizer {
    Adam(Adam),
    Sgd(Sgd),
}

impl Optimizer {
    /// Adam with the stock learning rate
    pub fn default_adam() -> Self {
        Self::adam(DEFAULT_LEARNING_RATE)
    }

    pub fn adam(learning_rate: f32) -> Self {
        Optimizer::Adam(Adam::new(learning_rate))
    }

    pub fn sgd(learning_rate: f32, momentum: f32) -> Self {
        Optimizer::Sgd(Sgd::new(learning_rate, momentum))
    }

    /// Applies one update to every parameter of the given component
    pub fn step(&mut self, component: &mut dyn Component) {
        match self {
            Optimizer::Adam(adam) => adam.step(component),
            Optimizer::Sgd(sgd) => sgd.step(component),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match self {
            Optimizer::Adam(adam) => adam.learning_rate,
            Optimizer::Sgd(sgd) => sgd.learning_rate,
        }
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        match self {
            Optimizer::Adam(adam) => adam.learning_rate = lr,
            Optimizer::Sgd(sgd) => sgd.learning_rate = lr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Wide;
    use ndarray::{Array2, ArrayView2};

    fn constant_grad_component() -> Wide {
        let mut wide = Wide::new(2, 1).unwrap();
        // A forward/backward pass with unit gradient fills the accumulators
        let input = Array2::from_shape_vec((1, 2), vec![1.0, 2.0]).unwrap();
        let _ = wide.forward_train(input.view()).unwrap();
        wide.backward(ArrayView2::from_shape((1, 1), &[1.0]).unwrap())
            .unwrap();
        wide
    }

    fn snapshot(component: &dyn Component) -> Vec<Array2<f32>> {
        let mut params = Vec::new();
        component.for_each_param(&mut |_, value| params.push(value.clone()));
        params
    }

    #[test]
    fn test_sgd_applies_lr_times_grad() {
        let mut wide = constant_grad_component();
        let before = snapshot(&wide);

        let mut optimizer = Optimizer::sgd(0.1, 0.0);
        optimizer.step(&mut wide);

        let after = snapshot(&wide);
        // grad_weight = x^T g = [1, 2]^T, grad_bias = 1
        assert!((after[0][[0, 0]] - (before[0][[0, 0]] - 0.1)).abs() < 1e-6);
        assert!((after[0][[1, 0]] - (before[0][[1, 0]] - 0.2)).abs() < 1e-6);
        assert!((after[1][[0, 0]] - (before[1][[0, 0]] - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut wide = constant_grad_component();
        let before = snapshot(&wide);

        let mut optimizer = Optimizer::adam(0.01);
        optimizer.step(&mut wide);

        let after = snapshot(&wide);
        for (b, a) in before.iter().zip(after.iter()) {
            for (bv, av) in b.iter().zip(a.iter()) {
                assert!(av < bv, "positive gradient must decrease the parameter");
            }
        }
    }

    #[test]
    fn test_zero_learning_rate_freezes_parameters() {
        let mut wide = constant_grad_component();
        let before = snapshot(&wide);

        let mut optimizer = Optimizer::adam(0.0);
        optimizer.step(&mut wide);

        assert_eq!(snapshot(&wide), before);
    }

    #[test]
    fn test_set_learning_rate() {
        let mut optimizer = Optimizer::adam(0.5);
        assert!((optimizer.learning_rate() - 0.5).abs() < 1e-9);
        optimizer.set_learning_rate(0.05);
        assert!((optimizer.learning_rate() - 0.05).abs() < 1e-9);
    }
}
