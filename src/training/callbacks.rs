use std::path::{Path, PathBuf};

use log::info;

use crate::model::{ModelError, WideDeep};

use super::metrics::EpochRecord;

/// What a callback asks the trainer to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSignal {
    Continue,
    Stop,
}

/// Stops training once the validation loss has not improved by at least
/// `min_delta` for `patience` consecutive epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: f32,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    fn on_epoch_end(&mut self, record: &EpochRecord) -> CallbackSignal {
        if record.val_loss < self.best - self.min_delta {
            self.best = record.val_loss;
            self.wait = 0;
            return CallbackSignal::Continue;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            info!(
                "Early stopping at epoch {}: no improvement for {} epochs",
                record.epoch, self.wait
            );
            CallbackSignal::Stop
        } else {
            CallbackSignal::Continue
        }
    }
}

/// Persists the model's parameters whenever the validation loss improves,
/// overwriting the previous best
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    filepath: PathBuf,
    best: f32,
}

impl ModelCheckpoint {
    pub fn new(filepath: impl AsRef<Path>) -> Self {
        Self {
            filepath: filepath.as_ref().to_path_buf(),
            best: f32::INFINITY,
        }
    }

    fn on_epoch_end(
        &mut self,
        model: &WideDeep,
        record: &EpochRecord,
    ) -> Result<CallbackSignal, ModelError> {
        if record.val_loss < self.best {
            self.best = record.val_loss;
            model.save_parameters(&self.filepath)?;
            info!(
                "Epoch {}: saved checkpoint to {} (val_loss {:.6})",
                record.epoch,
                self.filepath.display(),
                record.val_loss
            );
        }
        Ok(CallbackSignal::Continue)
    }
}

/// An observer invoked at epoch boundaries. May stop training or persist
/// state; invoked in registration order.
#[derive(Debug, Clone)]
pub enum Callback {
    EarlyStopping(EarlyStopping),
    ModelCheckpoint(ModelCheckpoint),
}

impl Callback {
    pub fn early_stopping(patience: usize, min_delta: f32) -> Self {
        Callback::EarlyStopping(EarlyStopping::new(patience, min_delta))
    }

    pub fn model_checkpoint(filepath: impl AsRef<Path>) -> Self {
        Callback::ModelCheckpoint(ModelCheckpoint::new(filepath))
    }

    pub fn on_epoch_end(
        &mut self,
        model: &WideDeep,
        record: &EpochRecord,
    ) -> Result<CallbackSignal, ModelError> {
        match self {
            Callback::EarlyStopping(cb) => Ok(cb.on_epoch_end(record)),
            Callback::ModelCheckpoint(cb) => cb.on_epoch_end(model, record),
        }
    }
}
