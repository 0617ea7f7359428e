//! Dataset bundle loading and batching

pub mod bundle;
pub mod batch;

pub use bundle::{DataLoadError, DatasetBundle, EmbeddingSpec};
pub use batch::{train_val_split, BatchIterator, SplitIndices};
