//! Compilation and epoch-based training

pub mod callbacks;
pub mod compile;
pub mod initializer;
pub mod metrics;
pub mod optimizer;
pub mod scheduler;
pub mod trainer;

// Re-export main components
pub use callbacks::{Callback, CallbackSignal, EarlyStopping, ModelCheckpoint};
pub use compile::{compile, CompileOptions, ComponentBinding, TrainingConfig};
pub use initializer::Initializer;
pub use metrics::{EpochRecord, Metric};
pub use optimizer::{Adam, Optimizer, Sgd};
pub use scheduler::LrSchedule;
pub use trainer::{
    FitOptions, FitReport, NanPolicy, Trainer, TrainerPhase, TrainingError, TrainingState,
};
