use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::model::{Method, ModelError, WideDeep};

use super::callbacks::Callback;
use super::initializer::Initializer;
use super::metrics::Metric;
use super::optimizer::Optimizer;
use super::scheduler::LrSchedule;
use super::trainer::TrainingError;

/// One component's training dynamics: its own optimizer and learning-rate
/// schedule. Independent rates per component are the defining wide & deep
/// training trait.
#[derive(Debug, Clone)]
pub struct ComponentBinding {
    pub component: String,
    pub optimizer: Optimizer,
    pub schedule: LrSchedule,
    pub(crate) base_lr: f32,
}

/// The ready-to-train configuration produced by [`compile`]
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub method: Method,
    pub bindings: Vec<ComponentBinding>,
    pub callbacks: Vec<Callback>,
    pub metrics: Vec<Metric>,
}

/// Everything `compile` needs besides the model. Entries are keyed by
/// component name and validated against the model before anything is bound.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    method: Method,
    initializers: Vec<(String, Initializer)>,
    optimizers: Vec<(String, Optimizer)>,
    schedules: Vec<(String, LrSchedule)>,
    callbacks: Vec<Callback>,
    metrics: Vec<Metric>,
    init_seed: u64,
}

impl CompileOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            initializers: Vec::new(),
            optimizers: Vec::new(),
            schedules: Vec::new(),
            callbacks: Vec::new(),
            metrics: Vec::new(),
            init_seed: 42,
        }
    }

    pub fn initializer(mut self, component: impl Into<String>, init: Initializer) -> Self {
        self.initializers.push((component.into(), init));
        self
    }

    pub fn optimizer(mut self, component: impl Into<String>, optimizer: Optimizer) -> Self {
        self.optimizers.push((component.into(), optimizer));
        self
    }

    pub fn schedule(mut self, component: impl Into<String>, schedule: LrSchedule) -> Self {
        self.schedules.push((component.into(), schedule));
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn init_seed(mut self, seed: u64) -> Self {
        self.init_seed = seed;
        self
    }
}

fn check_known<T>(
    kind: &str,
    entries: &[(String, T)],
    names: &[&str],
) -> Result<(), TrainingError> {
    for (component, _) in entries {
        if !names.contains(&component.as_str()) {
            return Err(TrainingError::Config(format!(
                "{} entry references unknown component '{}'",
                kind, component
            )));
        }
    }
    for (i, (a, _)) in entries.iter().enumerate() {
        if entries.iter().skip(i + 1).any(|(b, _)| a == b) {
            return Err(TrainingError::Config(format!(
                "Duplicate {} entry for component '{}'",
                kind, a
            )));
        }
    }
    Ok(())
}

/// Binds a training method, per-component initializers, optimizers and
/// learning-rate schedules, plus callbacks and metrics, into a
/// [`TrainingConfig`]. Every referenced component must exist in the model.
/// Components without an optimizer entry default to Adam at its stock rate;
/// without a schedule entry, to a constant schedule. Runs no computation
/// beyond re-drawing initialized weights.
pub fn compile(model: &mut WideDeep, options: CompileOptions) -> Result<TrainingConfig, TrainingError> {
    let names = model.component_names();
    check_known("Initializer", &options.initializers, &names)?;
    check_known("Optimizer", &options.optimizers, &names)?;
    check_known("Scheduler", &options.schedules, &names)?;

    // Re-draw the weights of every component with an initializer entry
    let mut rng = SmallRng::seed_from_u64(options.init_seed);
    for (component, init) in &options.initializers {
        let target = model
            .component_mut(component)
            .ok_or_else(|| TrainingError::Config(format!("Unknown component '{}'", component)))?;
        let mut failure: Option<ModelError> = None;
        target.for_each_param_mut(&mut |_, value, grad| {
            if failure.is_none() {
                if let Err(e) = init.apply(value, &mut rng) {
                    failure = Some(e);
                }
                grad.fill(0.0);
            }
        });
        if let Some(e) = failure {
            return Err(e.into());
        }
    }

    let bindings = model
        .component_names()
        .into_iter()
        .map(|name| {
            let optimizer = options
                .optimizers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, o)| o.clone())
                .unwrap_or_else(Optimizer::default_adam);
            let schedule = options
                .schedules
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s.clone())
                .unwrap_or_default();
            ComponentBinding {
                component: name.to_string(),
                base_lr: optimizer.learning_rate(),
                optimizer,
                schedule,
            }
        })
        .collect();

    model.set_method(options.method);

    Ok(TrainingConfig {
        method: options.method,
        bindings,
        callbacks: options.callbacks,
        metrics: options.metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentSpec, Inputs};
    use ndarray::Array2;

    fn wide_model() -> (WideDeep, Array2<f32>) {
        let wide = Array2::<f32>::zeros((4, 3));
        let model = WideDeep::builder(1)
            .component("wide", ComponentSpec::Wide { wide_dim: 3 })
            .build(&Inputs::new().with("wide", wide.view()))
            .unwrap();
        (model, wide)
    }

    #[test]
    fn test_unknown_optimizer_component_is_rejected() {
        let (mut model, _wide) = wide_model();
        let options =
            CompileOptions::new(Method::Binary).optimizer("deepdense", Optimizer::adam(0.01));
        let result = compile(&mut model, options);
        assert!(matches!(result, Err(TrainingError::Config(_))));
    }

    #[test]
    fn test_unknown_initializer_component_is_rejected() {
        let (mut model, _wide) = wide_model();
        let options = CompileOptions::new(Method::Binary)
            .initializer("deepimage", Initializer::XavierNormal);
        let result = compile(&mut model, options);
        assert!(matches!(result, Err(TrainingError::Config(_))));
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let (mut model, _wide) = wide_model();
        let options = CompileOptions::new(Method::Binary)
            .optimizer("wide", Optimizer::adam(0.01))
            .optimizer("wide", Optimizer::adam(0.02));
        let result = compile(&mut model, options);
        assert!(matches!(result, Err(TrainingError::Config(_))));
    }

    #[test]
    fn test_missing_entries_fall_back_to_defaults() {
        let (mut model, _wide) = wide_model();
        let config = compile(&mut model, CompileOptions::new(Method::Binary)).unwrap();

        assert_eq!(config.bindings.len(), 1);
        assert_eq!(config.bindings[0].component, "wide");
        assert!(matches!(config.bindings[0].optimizer, Optimizer::Adam(_)));
        assert!(matches!(config.bindings[0].schedule, LrSchedule::Constant));
        assert_eq!(model.method(), Some(Method::Binary));
    }

    #[test]
    fn test_initializer_redraws_weights_deterministically() {
        let (mut model_a, _w1) = wide_model();
        let (mut model_b, _w2) = wide_model();

        let options = || {
            CompileOptions::new(Method::Binary)
                .initializer("wide", Initializer::Normal { mean: 0.0, std: 0.1 })
                .init_seed(7)
        };
        compile(&mut model_a, options()).unwrap();
        compile(&mut model_b, options()).unwrap();

        let a = model_a.parameter_snapshot();
        let b = model_b.parameter_snapshot();
        assert_eq!(a.get("wide.weight"), b.get("wide.weight"));
        assert_eq!(a.get("wide.bias"), b.get("wide.bias"));
    }
}
