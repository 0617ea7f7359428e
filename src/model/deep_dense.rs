use std::collections::HashMap;

use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::data::EmbeddingSpec;

use super::error::ModelError;
use super::layers::{Embedding, Linear};
use super::Component;

const DROPOUT_SEED: u64 = 42;

/// One embedded categorical column of the deep input matrix
#[derive(Debug)]
struct ColumnEmbedding {
    col: String,
    /// Position of the column in the input matrix
    col_pos: usize,
    table: Embedding,
}

/// Activations cached by `forward_train` for the backward pass
struct DeepCache {
    /// Category indices per embedded column, in embedding order
    indices: Vec<Vec<usize>>,
    /// Combined ReLU/dropout mask per hidden layer
    masks: Vec<Array2<f32>>,
}

/// The deep part: per-column embeddings concatenated with the continuous
/// columns, feeding a ReLU feed-forward stack with dropout, projected to
/// the output dimension.
pub struct DeepDense {
    embeddings: Vec<ColumnEmbedding>,
    continuous_pos: Vec<usize>,
    hidden: Vec<Linear>,
    dropout: Vec<f32>,
    out: Linear,
    input_dim: usize,
    rng: SmallRng,
    cache: Option<DeepCache>,
}

impl DeepDense {
    pub fn new(
        embeddings: &[EmbeddingSpec],
        continuous_cols: &[String],
        column_idx: &HashMap<String, usize>,
        hidden_layers: &[usize],
        dropout: &[f32],
        output_dim: usize,
    ) -> Result<Self, ModelError> {
        if embeddings.is_empty() && continuous_cols.is_empty() {
            return Err(ModelError::ConfigError(
                "DeepDense component needs at least one embedded or continuous column".to_string(),
            ));
        }
        for &rate in dropout {
            if !(0.0..1.0).contains(&rate) {
                return Err(ModelError::ConfigError(format!(
                    "Dropout rate {} outside [0, 1)",
                    rate
                )));
            }
        }

        let lookup = |col: &str| {
            column_idx.get(col).copied().ok_or_else(|| {
                ModelError::ConfigError(format!("Column '{}' missing from column_idx", col))
            })
        };

        let mut column_embeddings = Vec::with_capacity(embeddings.len());
        for spec in embeddings {
            column_embeddings.push(ColumnEmbedding {
                col: spec.col.clone(),
                col_pos: lookup(&spec.col)?,
                table: Embedding::new(spec.n_categories, spec.dim)?,
            });
        }

        let mut continuous_pos = Vec::with_capacity(continuous_cols.len());
        for col in continuous_cols {
            continuous_pos.push(lookup(col)?);
        }

        let concat_dim: usize = column_embeddings
            .iter()
            .map(|ce| ce.table.dim())
            .sum::<usize>()
            + continuous_pos.len();

        let mut hidden = Vec::with_capacity(hidden_layers.len());
        let mut in_dim = concat_dim;
        for &width in hidden_layers {
            hidden.push(Linear::new(in_dim, width)?);
            in_dim = width;
        }
        let out = Linear::new(in_dim, output_dim)?;

        Ok(Self {
            embeddings: column_embeddings,
            continuous_pos,
            hidden,
            dropout: dropout.to_vec(),
            out,
            input_dim: column_idx.len(),
            rng: SmallRng::seed_from_u64(DROPOUT_SEED),
            cache: None,
        })
    }

    fn check_input(&self, input: &ArrayView2<f32>) -> Result<(), ModelError> {
        if input.ncols() != self.input_dim {
            return Err(ModelError::ShapeMismatch(format!(
                "DeepDense expects {} input columns, got {}",
                self.input_dim,
                input.ncols()
            )));
        }
        Ok(())
    }

    fn column_indices(
        input: &ArrayView2<f32>,
        ce: &ColumnEmbedding,
    ) -> Result<Vec<usize>, ModelError> {
        input
            .column(ce.col_pos)
            .iter()
            .map(|&v| {
                let rounded = v.round();
                if rounded < 0.0 || (rounded as usize) >= ce.table.n_categories() {
                    Err(ModelError::ForwardError(format!(
                        "Value {} in column '{}' is not a valid category index (table has {} rows)",
                        v,
                        ce.col,
                        ce.table.n_categories()
                    )))
                } else {
                    Ok(rounded as usize)
                }
            })
            .collect()
    }

    /// Embeds the categorical columns and appends the continuous ones.
    /// Returns the concatenated matrix and the per-column indices.
    fn embed(
        &self,
        input: &ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Vec<Vec<usize>>), ModelError> {
        let batch = input.nrows();

        let mut indices = Vec::with_capacity(self.embeddings.len());
        let mut pieces = Vec::with_capacity(self.embeddings.len() + 1);
        for ce in &self.embeddings {
            let idx = Self::column_indices(input, ce)?;
            pieces.push(ce.table.forward(&idx)?);
            indices.push(idx);
        }

        let mut continuous = Array2::zeros((batch, self.continuous_pos.len()));
        for (j, &pos) in self.continuous_pos.iter().enumerate() {
            continuous.column_mut(j).assign(&input.column(pos));
        }
        pieces.push(continuous);

        let views: Vec<ArrayView2<f32>> = pieces.iter().map(|p| p.view()).collect();
        let concatenated = concatenate(Axis(1), &views)
            .map_err(|e| ModelError::ForwardError(e.to_string()))?;
        Ok((concatenated, indices))
    }
}

impl Component for DeepDense {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn param_count(&self) -> usize {
        self.embeddings
            .iter()
            .map(|ce| ce.table.param_count())
            .sum::<usize>()
            + self.hidden.iter().map(Linear::param_count).sum::<usize>()
            + self.out.param_count()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_input(&input)?;
        let (mut h, _) = self.embed(&input)?;
        for layer in &self.hidden {
            h = layer.forward(h.view())?;
            h.mapv_inplace(|v| v.max(0.0));
        }
        self.out.forward(h.view())
    }

    fn forward_train(&mut self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_input(&input)?;
        let (mut h, indices) = self.embed(&input)?;

        let mut masks = Vec::with_capacity(self.hidden.len());
        for (i, layer) in self.hidden.iter_mut().enumerate() {
            let z = layer.forward_train(h.view())?;
            let rate = self.dropout.get(i).copied().unwrap_or(0.0);
            let keep = 1.0 - rate;

            // Fold ReLU and inverted dropout into one mask so the backward
            // pass is a single elementwise multiply
            let mut mask = Array2::<f32>::zeros(z.raw_dim());
            for (m, &zv) in mask.iter_mut().zip(z.iter()) {
                if zv > 0.0 {
                    *m = if rate > 0.0 {
                        if self.rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    } else {
                        1.0
                    };
                }
            }
            h = &z * &mask;
            masks.push(mask);
        }

        let output = self.out.forward_train(h.view())?;
        self.cache = Some(DeepCache { indices, masks });
        Ok(output)
    }

    fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<(), ModelError> {
        let cache = self.cache.take().ok_or_else(|| {
            ModelError::BackwardError("DeepDense backward called before forward_train".to_string())
        })?;

        let mut g = self.out.backward(grad_output)?;
        for (layer, mask) in self.hidden.iter_mut().zip(cache.masks.iter()).rev() {
            g = &g * mask;
            g = layer.backward(g.view())?;
        }

        // The concatenated gradient splits back into embedding slices;
        // continuous columns carry no learnable parameters
        let mut offset = 0;
        for (ce, idx) in self.embeddings.iter_mut().zip(cache.indices.iter()) {
            let dim = ce.table.dim();
            let slice = g.slice(s![.., offset..offset + dim]);
            ce.table.backward(idx, slice)?;
            offset += dim;
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        for ce in &mut self.embeddings {
            ce.table.zero_grad();
        }
        for layer in &mut self.hidden {
            layer.zero_grad();
        }
        self.out.zero_grad();
    }

    fn for_each_param(&self, visit: &mut dyn FnMut(&str, &Array2<f32>)) {
        for ce in &self.embeddings {
            visit(&format!("emb_{}.weight", ce.col), &ce.table.weight);
        }
        for (i, layer) in self.hidden.iter().enumerate() {
            visit(&format!("dense_{}.weight", i), &layer.weight);
            visit(&format!("dense_{}.bias", i), &layer.bias);
        }
        visit("out.weight", &self.out.weight);
        visit("out.bias", &self.out.bias);
    }

    fn for_each_param_mut(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut Array2<f32>, &mut Array2<f32>),
    ) {
        for ce in &mut self.embeddings {
            visit(
                &format!("emb_{}.weight", ce.col),
                &mut ce.table.weight,
                &mut ce.table.grad,
            );
        }
        for (i, layer) in self.hidden.iter_mut().enumerate() {
            visit(&format!("dense_{}.weight", i), &mut layer.weight, &mut layer.grad_weight);
            visit(&format!("dense_{}.bias", i), &mut layer.bias, &mut layer.grad_bias);
        }
        visit("out.weight", &mut self.out.weight, &mut self.out.grad_weight);
        visit("out.bias", &mut self.out.bias, &mut self.out.grad_bias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_component() -> DeepDense {
        let embeddings = vec![EmbeddingSpec {
            col: "occupation".to_string(),
            n_categories: 4,
            dim: 3,
        }];
        let continuous = vec!["age".to_string(), "hours".to_string()];
        let mut column_idx = HashMap::new();
        column_idx.insert("occupation".to_string(), 0);
        column_idx.insert("age".to_string(), 1);
        column_idx.insert("hours".to_string(), 2);

        DeepDense::new(&embeddings, &continuous, &column_idx, &[8, 4], &[0.0], 1).unwrap()
    }

    #[test]
    fn test_param_count() {
        let component = sample_component();
        // embedding 4*3, dense_0 5*8+8, dense_1 8*4+4, out 4*1+1
        let expected = 12 + (40 + 8) + (32 + 4) + (4 + 1);
        assert_eq!(component.param_count(), expected);
    }

    #[test]
    fn test_forward_shape() {
        let component = sample_component();
        let input = array![[0.0, 25.0, 40.0], [3.0, 52.0, 20.0]];
        let output = component.forward(input.view()).unwrap();
        assert_eq!(output.dim(), (2, 1));
    }

    #[test]
    fn test_forward_rejects_bad_category() {
        let component = sample_component();
        let input = array![[9.0, 25.0, 40.0]];
        let result = component.forward(input.view());
        assert!(matches!(result, Err(ModelError::ForwardError(_))));
    }

    #[test]
    fn test_backward_accumulates_embedding_gradients() {
        let embeddings = vec![EmbeddingSpec {
            col: "occupation".to_string(),
            n_categories: 4,
            dim: 3,
        }];
        let continuous = vec!["age".to_string()];
        let mut column_idx = HashMap::new();
        column_idx.insert("occupation".to_string(), 0);
        column_idx.insert("age".to_string(), 1);

        // No hidden stack, so the embedding gradient is g · W_out^T exactly
        let mut component =
            DeepDense::new(&embeddings, &continuous, &column_idx, &[], &[], 1).unwrap();
        component.out.weight.fill(1.0);

        let input = array![[2.0, 1.0], [2.0, 0.5]];
        let _ = component.forward_train(input.view()).unwrap();
        component.backward(array![[1.0], [1.0]].view()).unwrap();

        // Both rows selected category 2; its row collects 1.0 per sample per dim
        for g in component.embeddings[0].table.grad.row(2).iter() {
            assert!((g - 2.0).abs() < 1e-6);
        }
        for g in component.embeddings[0].table.grad.row(0).iter() {
            assert_eq!(*g, 0.0);
        }
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut component = sample_component();
        let result = component.backward(array![[1.0]].view());
        assert!(matches!(result, Err(ModelError::BackwardError(_))));
    }

    #[test]
    fn test_rejects_dropout_of_one() {
        let embeddings: Vec<EmbeddingSpec> = Vec::new();
        let continuous = vec!["x".to_string()];
        let mut column_idx = HashMap::new();
        column_idx.insert("x".to_string(), 0);

        let result = DeepDense::new(&embeddings, &continuous, &column_idx, &[4], &[1.0], 1);
        assert!(matches!(result, Err(ModelError::ConfigError(_))));
    }
}
