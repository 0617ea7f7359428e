//! Composite wide & deep model: named components plus a combination layer

mod config;
mod deep_dense;
mod error;
pub mod layers;
mod wide;

use std::collections::BTreeMap;
use std::path::Path;

pub use config::{ComponentSpec, Method};
pub use deep_dense::DeepDense;
pub use error::ModelError;
pub use wide::Wide;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};

use crate::data::DatasetBundle;
use crate::utils::io;
use crate::utils::math;

use layers::Linear;

/// A named sub-model. The set is open: anything that can produce an
/// `[batch, output_dim]` activation from its input matrix and backpropagate
/// through it can participate.
pub trait Component {
    /// Number of input-matrix columns the component consumes
    fn input_dim(&self) -> usize;

    /// Number of learnable scalars
    fn param_count(&self) -> usize;

    /// Inference forward pass; no state is recorded
    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError>;

    /// Training forward pass; caches whatever `backward` needs
    fn forward_train(&mut self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError>;

    /// Accumulates parameter gradients from the output gradient
    fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<(), ModelError>;

    fn zero_grad(&mut self);

    fn for_each_param(&self, visit: &mut dyn FnMut(&str, &Array2<f32>));

    fn for_each_param_mut(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut Array2<f32>, &mut Array2<f32>),
    );
}

/// Named input matrices, one per component
#[derive(Default, Clone)]
pub struct Inputs<'a> {
    entries: Vec<(String, ArrayView2<'a, f32>)>,
}

impl<'a> Inputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conventional wiring for a dataset bundle: the wide matrix feeds
    /// "wide", the deep matrix feeds "deepdense"
    pub fn from_bundle(bundle: &'a DatasetBundle) -> Self {
        Self::new()
            .with("wide", bundle.wide.view())
            .with("deepdense", bundle.deep_dense.view())
    }

    pub fn with(mut self, name: impl Into<String>, view: ArrayView2<'a, f32>) -> Self {
        self.entries.push((name.into(), view));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArrayView2<'a, f32>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Shared row count across every input matrix
    pub fn n_rows(&self) -> Result<usize, ModelError> {
        let mut rows = None;
        for (name, view) in &self.entries {
            match rows {
                None => rows = Some(view.nrows()),
                Some(r) if r != view.nrows() => {
                    return Err(ModelError::ShapeMismatch(format!(
                        "Input '{}' has {} rows, expected {}",
                        name,
                        view.nrows(),
                        r
                    )))
                }
                Some(_) => {}
            }
        }
        rows.ok_or_else(|| ModelError::ConfigError("No input matrices supplied".to_string()))
    }

    /// Copies out the given rows of every input matrix
    pub fn select(&self, indices: &[usize]) -> OwnedInputs {
        OwnedInputs {
            entries: self
                .entries
                .iter()
                .map(|(name, view)| (name.clone(), view.select(Axis(0), indices)))
                .collect(),
        }
    }
}

/// Owned row subset of some `Inputs`, e.g. one mini-batch
pub struct OwnedInputs {
    entries: Vec<(String, Array2<f32>)>,
}

impl OwnedInputs {
    pub fn view(&self) -> Inputs<'_> {
        let mut inputs = Inputs::new();
        for (name, matrix) in &self.entries {
            inputs = inputs.with(name.clone(), matrix.view());
        }
        inputs
    }
}

/// Builder collecting named component specs before assembly
pub struct WideDeepBuilder {
    output_dim: usize,
    specs: Vec<(String, ComponentSpec)>,
}

impl WideDeepBuilder {
    pub fn component(mut self, name: impl Into<String>, spec: ComponentSpec) -> Self {
        self.specs.push((name.into(), spec));
        self
    }

    /// Assembles the model, validating every spec against the width of its
    /// input matrix
    pub fn build(self, inputs: &Inputs<'_>) -> Result<WideDeep, ModelError> {
        if self.output_dim == 0 {
            return Err(ModelError::ConfigError(
                "output_dim must be at least 1".to_string(),
            ));
        }
        if self.specs.is_empty() {
            return Err(ModelError::ConfigError(
                "At least one component is required".to_string(),
            ));
        }

        let mut components: Vec<(String, Box<dyn Component>)> = Vec::with_capacity(self.specs.len());
        for (name, spec) in &self.specs {
            if components.iter().any(|(n, _)| n == name) {
                return Err(ModelError::ConfigError(format!(
                    "Duplicate component name '{}'",
                    name
                )));
            }
            let view = inputs.get(name).ok_or_else(|| {
                ModelError::ConfigError(format!("No input stream named '{}'", name))
            })?;
            if view.ncols() != spec.input_dim() {
                return Err(ModelError::ShapeMismatch(format!(
                    "Component '{}' declares {} input columns but its matrix has {}",
                    name,
                    spec.input_dim(),
                    view.ncols()
                )));
            }

            let component: Box<dyn Component> = match spec {
                ComponentSpec::Wide { wide_dim } => {
                    Box::new(Wide::new(*wide_dim, self.output_dim)?)
                }
                ComponentSpec::DeepDense {
                    embeddings,
                    continuous_cols,
                    column_idx,
                    hidden_layers,
                    dropout,
                } => Box::new(DeepDense::new(
                    embeddings,
                    continuous_cols,
                    column_idx,
                    hidden_layers,
                    dropout,
                    self.output_dim,
                )?),
            };
            components.push((name.clone(), component));
        }

        // The combination layer sizes itself to exactly the present
        // components
        let combine = Linear::new(components.len() * self.output_dim, self.output_dim)?;

        Ok(WideDeep {
            components,
            combine,
            output_dim: self.output_dim,
            method: None,
            fitted: false,
        })
    }
}

/// The composite model: named components whose outputs are concatenated and
/// passed through a learned combination layer
pub struct WideDeep {
    components: Vec<(String, Box<dyn Component>)>,
    combine: Linear,
    output_dim: usize,
    method: Option<Method>,
    fitted: bool,
}

impl WideDeep {
    pub fn builder(output_dim: usize) -> WideDeepBuilder {
        WideDeepBuilder {
            output_dim,
            specs: Vec::new(),
        }
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut (dyn Component + 'static)> {
        self.components
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_mut())
    }

    pub fn param_count(&self) -> usize {
        self.components
            .iter()
            .map(|(_, c)| c.param_count())
            .sum::<usize>()
            + self.combine.param_count()
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = Some(method);
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub(crate) fn mark_fitted(&mut self) {
        self.fitted = true;
    }

    /// Raw model outputs (logits for classification, scalars for regression)
    pub fn forward(&self, inputs: &Inputs<'_>) -> Result<Array2<f32>, ModelError> {
        inputs.n_rows()?;
        let mut outputs = Vec::with_capacity(self.components.len());
        for (name, component) in &self.components {
            let view = inputs.get(name).ok_or_else(|| {
                ModelError::ConfigError(format!("No input stream named '{}'", name))
            })?;
            outputs.push(component.forward(*view)?);
        }
        let views: Vec<ArrayView2<f32>> = outputs.iter().map(|o| o.view()).collect();
        let combined = concatenate(Axis(1), &views)
            .map_err(|e| ModelError::ForwardError(e.to_string()))?;
        self.combine.forward(combined.view())
    }

    /// Training-mode forward pass; components cache activations for
    /// `backward`
    pub fn forward_train(&mut self, inputs: &Inputs<'_>) -> Result<Array2<f32>, ModelError> {
        inputs.n_rows()?;
        let mut outputs = Vec::with_capacity(self.components.len());
        for (name, component) in &mut self.components {
            let view = inputs.get(name).ok_or_else(|| {
                ModelError::ConfigError(format!("No input stream named '{}'", name))
            })?;
            outputs.push(component.forward_train(*view)?);
        }
        let views: Vec<ArrayView2<f32>> = outputs.iter().map(|o| o.view()).collect();
        let combined = concatenate(Axis(1), &views)
            .map_err(|e| ModelError::ForwardError(e.to_string()))?;
        self.combine.forward_train(combined.view())
    }

    /// Backpropagates the output gradient into every component. Each
    /// component only ever receives the slice of the combination gradient
    /// that its own output produced.
    pub fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<(), ModelError> {
        let grad_combined = self.combine.backward(grad_output)?;
        for (i, (_, component)) in self.components.iter_mut().enumerate() {
            let start = i * self.output_dim;
            let slice = grad_combined.slice(s![.., start..start + self.output_dim]);
            component.backward(slice)?;
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        for (_, component) in &mut self.components {
            component.zero_grad();
        }
        self.combine.zero_grad();
    }

    fn require_fitted(&self) -> Result<Method, ModelError> {
        if !self.fitted {
            return Err(ModelError::UnfittedModel);
        }
        self.method.ok_or_else(|| {
            ModelError::ConfigError("Model was never compiled with a training method".to_string())
        })
    }

    /// Per-sample predictions: class labels for classification, scalars for
    /// regression
    pub fn predict(&self, inputs: &Inputs<'_>) -> Result<Array1<f32>, ModelError> {
        let method = self.require_fitted()?;
        let outputs = self.forward(inputs)?;
        let result = match method {
            Method::Binary => outputs
                .column(0)
                .mapv(|z| if math::sigmoid(z) >= 0.5 { 1.0 } else { 0.0 }),
            Method::Multiclass => Array1::from_iter(outputs.rows().into_iter().map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best as f32
            })),
            Method::Regression => outputs.column(0).to_owned(),
        };
        Ok(result)
    }

    /// Class probabilities; undefined for regression models
    pub fn predict_proba(&self, inputs: &Inputs<'_>) -> Result<Array2<f32>, ModelError> {
        let method = self.require_fitted()?;
        let outputs = self.forward(inputs)?;
        match method {
            Method::Binary => Ok(math::sigmoid_2d(outputs.view())),
            Method::Multiclass => {
                let mut probs = outputs;
                math::softmax_rows(&mut probs.view_mut());
                Ok(probs)
            }
            Method::Regression => Err(ModelError::ConfigError(
                "predict_proba is undefined for regression".to_string(),
            )),
        }
    }

    /// Clones every parameter into a name -> array map
    pub fn parameter_snapshot(&self) -> BTreeMap<String, Array2<f32>> {
        let mut snapshot = BTreeMap::new();
        for (name, component) in &self.components {
            component.for_each_param(&mut |pname, value| {
                snapshot.insert(format!("{}.{}", name, pname), value.clone());
            });
        }
        snapshot.insert("combine.weight".to_string(), self.combine.weight.clone());
        snapshot.insert("combine.bias".to_string(), self.combine.bias.clone());
        snapshot
    }

    /// Writes the parameter map to disk
    pub fn save_parameters(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        io::serialize_to_file(path, &self.parameter_snapshot())?;
        Ok(())
    }

    /// Restores parameters saved by `save_parameters` into an identically
    /// assembled model. Every parameter must be present with a matching
    /// shape; the restored model counts as fitted.
    pub fn load_parameters(&mut self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let stored: BTreeMap<String, Array2<f32>> = io::deserialize_from_file(path)?;

        let mut shape_problems: Vec<String> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        let mut applied = 0usize;

        {
            let mut restore = |full: String, value: &mut Array2<f32>, grad: &mut Array2<f32>| {
                match stored.get(&full) {
                    Some(saved) if saved.raw_dim() == value.raw_dim() => {
                        value.assign(saved);
                        grad.fill(0.0);
                        applied += 1;
                    }
                    Some(saved) => shape_problems.push(format!(
                        "'{}': checkpoint shape {:?}, model shape {:?}",
                        full,
                        saved.dim(),
                        value.dim()
                    )),
                    None => missing.push(full),
                }
            };

            for (name, component) in &mut self.components {
                component.for_each_param_mut(&mut |pname, value, grad| {
                    restore(format!("{}.{}", name, pname), value, grad);
                });
            }
            restore(
                "combine.weight".to_string(),
                &mut self.combine.weight,
                &mut self.combine.grad_weight,
            );
            restore(
                "combine.bias".to_string(),
                &mut self.combine.bias,
                &mut self.combine.grad_bias,
            );
        }

        if !shape_problems.is_empty() {
            return Err(ModelError::ShapeMismatch(shape_problems.join("; ")));
        }
        if !missing.is_empty() {
            return Err(ModelError::CheckpointError(format!(
                "Checkpoint is missing parameters: {}",
                missing.join(", ")
            )));
        }
        if applied != stored.len() {
            return Err(ModelError::CheckpointError(format!(
                "Checkpoint contains {} entries the model does not have",
                stored.len() - applied
            )));
        }

        self.fitted = true;
        Ok(())
    }
}
