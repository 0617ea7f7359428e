use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::io::{self, IoError};

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),
    #[error("Row count mismatch: wide={wide}, deep={deep}, target={target}")]
    RowCountMismatch {
        wide: usize,
        deep: usize,
        target: usize,
    },
    #[error("Inconsistent bundle metadata: {0}")]
    MetadataMismatch(String),
}

/// Embedding layout for one categorical column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub col: String,
    /// Number of distinct categories (rows of the embedding table)
    pub n_categories: usize,
    /// Width of the learned embedding vector
    pub dim: usize,
}

/// A pre-built tabular dataset: the wide (one-hot/crossed) matrix, the
/// deep-dense matrix (categorical indices + continuous columns), the target
/// vector, and the metadata describing how the deep matrix is laid out.
///
/// Produced at data-preparation time and loaded read-only by the harness.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetBundle {
    pub wide: Array2<f32>,
    pub deep_dense: Array2<f32>,
    pub target: Array1<f32>,
    /// One entry per categorical column of the deep matrix
    pub embeddings_input: Vec<EmbeddingSpec>,
    /// Raw category value -> integer index, per categorical column
    pub embeddings_encoding: HashMap<String, HashMap<String, usize>>,
    /// Names of the continuous columns of the deep matrix
    pub continuous_cols: Vec<String>,
    /// Column name -> position in the deep matrix
    pub deep_column_idx: HashMap<String, usize>,
}

impl DatasetBundle {
    /// Loads a bundle from disk and checks its invariants
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataLoadError> {
        let bundle: DatasetBundle = io::deserialize_from_file(path)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Persists the bundle. The data-preparation side of `load`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DataLoadError> {
        self.validate()?;
        io::serialize_to_file(path, self)?;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn wide_dim(&self) -> usize {
        self.wide.ncols()
    }

    pub fn deep_dim(&self) -> usize {
        self.deep_dense.ncols()
    }

    fn validate(&self) -> Result<(), DataLoadError> {
        let (wide, deep, target) = (self.wide.nrows(), self.deep_dense.nrows(), self.target.len());
        if wide != target || deep != target {
            return Err(DataLoadError::RowCountMismatch { wide, deep, target });
        }

        let deep_cols = self.deep_dense.ncols();
        if self.deep_column_idx.len() != deep_cols {
            return Err(DataLoadError::MetadataMismatch(format!(
                "deep_column_idx names {} columns but the deep matrix has {}",
                self.deep_column_idx.len(),
                deep_cols
            )));
        }
        for (col, &idx) in &self.deep_column_idx {
            if idx >= deep_cols {
                return Err(DataLoadError::MetadataMismatch(format!(
                    "Column '{}' maps to index {} outside the deep matrix",
                    col, idx
                )));
            }
        }
        for spec in &self.embeddings_input {
            if !self.deep_column_idx.contains_key(&spec.col) {
                return Err(DataLoadError::MetadataMismatch(format!(
                    "Embedded column '{}' missing from deep_column_idx",
                    spec.col
                )));
            }
        }
        for col in &self.continuous_cols {
            if !self.deep_column_idx.contains_key(col) {
                return Err(DataLoadError::MetadataMismatch(format!(
                    "Continuous column '{}' missing from deep_column_idx",
                    col
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    fn sample_bundle(rows: usize) -> DatasetBundle {
        let mut deep_column_idx = HashMap::new();
        deep_column_idx.insert("occupation".to_string(), 0);
        deep_column_idx.insert("age".to_string(), 1);

        let mut encoding = HashMap::new();
        let mut occupation = HashMap::new();
        occupation.insert("clerical".to_string(), 0);
        occupation.insert("technical".to_string(), 1);
        encoding.insert("occupation".to_string(), occupation);

        DatasetBundle {
            wide: Array2::zeros((rows, 4)),
            deep_dense: Array2::zeros((rows, 2)),
            target: Array1::zeros(rows),
            embeddings_input: vec![EmbeddingSpec {
                col: "occupation".to_string(),
                n_categories: 2,
                dim: 3,
            }],
            embeddings_encoding: encoding,
            continuous_cols: vec!["age".to_string()],
            deep_column_idx,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.bin");

        let bundle = sample_bundle(8);
        bundle.save(&path).unwrap();

        let loaded = DatasetBundle::load(&path).unwrap();
        assert_eq!(loaded.n_rows(), 8);
        assert_eq!(loaded.wide_dim(), 4);
        assert_eq!(loaded.deep_dim(), 2);
        assert_eq!(loaded.embeddings_input.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = DatasetBundle::load(dir.path().join("nope.bin"));
        assert!(matches!(result, Err(DataLoadError::Io(_))));
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let mut bundle = sample_bundle(8);
        bundle.target = Array1::zeros(5);

        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.bin");
        let result = bundle.save(&path);
        assert!(matches!(result, Err(DataLoadError::RowCountMismatch { .. })));
    }

    #[test]
    fn test_unknown_embedded_column_rejected() {
        let mut bundle = sample_bundle(4);
        bundle.embeddings_input.push(EmbeddingSpec {
            col: "education".to_string(),
            n_categories: 3,
            dim: 2,
        });

        let dir = tempdir().unwrap();
        let result = bundle.save(dir.path().join("bundle.bin"));
        assert!(matches!(result, Err(DataLoadError::MetadataMismatch(_))));
    }
}
