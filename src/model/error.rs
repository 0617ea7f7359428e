use thiserror::Error;

use crate::utils::io::IoError;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Forward pass error: {0}")]
    ForwardError(String),

    #[error("Backward pass error: {0}")]
    BackwardError(String),

    #[error("Model has not been fitted; train for at least one epoch before predicting")]
    UnfittedModel,

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("IO error: {0}")]
    Io(#[from] IoError),
}
