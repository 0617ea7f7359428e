use thiserror::Error;

use crate::data::DataLoadError;
use crate::model::ModelError;
use crate::training::TrainingError;
use crate::utils::io::IoError;

/// Top-level error type aggregating every failure the harness can surface
#[derive(Error, Debug)]
pub enum WideDeepError {
    #[error("Data error: {0}")]
    Data(#[from] DataLoadError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),
}
