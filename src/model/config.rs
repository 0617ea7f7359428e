use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::data::{DatasetBundle, EmbeddingSpec};
use crate::utils::math::{self, MathError};

/// The training objective. Selects the loss function and the output
/// activation used by `predict`/`predict_proba`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Binary classification: sigmoid output, binary cross-entropy loss
    Binary,
    /// Multiclass classification: softmax output, categorical cross-entropy
    Multiclass,
    /// Regression: raw output, mean-squared-error loss
    Regression,
}

impl Method {
    /// Batch loss over raw model outputs
    pub fn loss(&self, outputs: ArrayView2<f32>, targets: ArrayView1<f32>) -> Result<f32, MathError> {
        match self {
            Method::Binary => math::binary_cross_entropy(outputs, targets),
            Method::Multiclass => math::cross_entropy(outputs, targets),
            Method::Regression => math::mean_squared_error(outputs, targets),
        }
    }

    /// Gradient of the batch loss w.r.t. the raw model outputs
    pub fn loss_grad(
        &self,
        outputs: ArrayView2<f32>,
        targets: ArrayView1<f32>,
    ) -> Result<Array2<f32>, MathError> {
        match self {
            Method::Binary => math::d_binary_cross_entropy(outputs, targets),
            Method::Multiclass => math::d_cross_entropy(outputs, targets),
            Method::Regression => math::d_mean_squared_error(outputs, targets),
        }
    }

    /// Maps raw outputs to the prediction space metrics are computed in:
    /// probabilities for classification, identity for regression
    pub fn activate(&self, outputs: Array2<f32>) -> Array2<f32> {
        match self {
            Method::Binary => math::sigmoid_2d(outputs.view()),
            Method::Multiclass => {
                let mut probs = outputs;
                math::softmax_rows(&mut probs.view_mut());
                probs
            }
            Method::Regression => outputs,
        }
    }
}

/// Configuration for one named sub-model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComponentSpec {
    /// A linear model over the sparse wide features
    Wide { wide_dim: usize },
    /// Embeddings plus continuous columns feeding a feed-forward stack
    DeepDense {
        embeddings: Vec<EmbeddingSpec>,
        continuous_cols: Vec<String>,
        /// Column name -> position in the deep-dense input matrix
        column_idx: HashMap<String, usize>,
        hidden_layers: Vec<usize>,
        /// Dropout rate per hidden layer; missing entries mean no dropout
        dropout: Vec<f32>,
    },
}

impl ComponentSpec {
    /// Wide spec matching a bundle's wide matrix
    pub fn wide_from(bundle: &DatasetBundle) -> Self {
        ComponentSpec::Wide {
            wide_dim: bundle.wide_dim(),
        }
    }

    /// Deep-dense spec built from a bundle's embedding metadata
    pub fn deep_dense_from(
        bundle: &DatasetBundle,
        hidden_layers: Vec<usize>,
        dropout: Vec<f32>,
    ) -> Self {
        ComponentSpec::DeepDense {
            embeddings: bundle.embeddings_input.clone(),
            continuous_cols: bundle.continuous_cols.clone(),
            column_idx: bundle.deep_column_idx.clone(),
            hidden_layers,
            dropout,
        }
    }

    /// Number of input-matrix columns the component expects
    pub fn input_dim(&self) -> usize {
        match self {
            ComponentSpec::Wide { wide_dim } => *wide_dim,
            ComponentSpec::DeepDense { column_idx, .. } => column_idx.len(),
        }
    }
}
