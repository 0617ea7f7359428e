pub mod data;
pub use data::{DataLoadError, DatasetBundle, EmbeddingSpec};

pub mod model;
pub use model::{Component, ComponentSpec, Inputs, Method, ModelError, WideDeep};

pub mod training;
pub use training::{
    compile, Callback, CompileOptions, FitOptions, Initializer, LrSchedule, Metric, NanPolicy,
    Optimizer, Trainer, TrainingConfig, TrainingError,
};

pub mod utils;

pub mod error;
pub use error::WideDeepError;
