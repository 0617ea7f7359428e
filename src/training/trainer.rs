use log::{info, warn};
use ndarray::{ArrayView1, Axis};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::data::batch::{train_val_split, BatchIterator};
use crate::model::{Inputs, Method, ModelError, WideDeep};
use crate::utils::math::MathError;

use super::callbacks::CallbackSignal;
use super::compile::TrainingConfig;
use super::metrics::{EpochRecord, Metric};

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Invalid training configuration: {0}")]
    Config(String),
    #[error("Non-finite loss {loss} in epoch {epoch}, batch {batch}")]
    NumericalInstability {
        epoch: usize,
        batch: usize,
        loss: f32,
    },
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// What to do when a batch produces a non-finite loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanPolicy {
    /// Abort the run with [`TrainingError::NumericalInstability`] (default)
    Abort,
    /// Skip the offending batch and log a warning
    SkipBatch,
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub n_epochs: usize,
    pub batch_size: usize,
    /// Fraction of rows held out for validation, in [0, 1)
    pub val_split: f32,
    /// Seeds the train/validation split and the per-epoch batch shuffle.
    /// Fixed by default so runs are reproducible.
    pub seed: u64,
    pub nan_policy: NanPolicy,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            n_epochs: 10,
            batch_size: 32,
            val_split: 0.2,
            seed: 42,
            nan_policy: NanPolicy::Abort,
        }
    }
}

/// Where the trainer is in its epoch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    NotStarted,
    EpochRunning,
    EpochEvaluating,
    Stopped,
}

/// Mutable per-run bookkeeping, updated once per epoch
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub phase: TrainerPhase,
    pub epoch: usize,
    pub running_loss: f32,
    pub best_val_loss: f32,
    pub stopped_early: bool,
}

impl TrainingState {
    fn new() -> Self {
        Self {
            phase: TrainerPhase::NotStarted,
            epoch: 0,
            running_loss: 0.0,
            best_val_loss: f32::INFINITY,
            stopped_early: false,
        }
    }
}

/// Summary of a completed `fit` call
#[derive(Debug, Clone)]
pub struct FitReport {
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub history: Vec<EpochRecord>,
}

/// Runs epoch-based optimization over a compiled model. Owns the model
/// exclusively while fitting; each component is updated only by its own
/// bound optimizer.
pub struct Trainer {
    model: WideDeep,
    config: TrainingConfig,
    state: TrainingState,
}

impl Trainer {
    pub fn new(model: WideDeep, config: TrainingConfig) -> Self {
        Self {
            model,
            config,
            state: TrainingState::new(),
        }
    }

    pub fn model(&self) -> &WideDeep {
        &self.model
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Hands the fitted model back for prediction
    pub fn into_model(self) -> WideDeep {
        self.model
    }

    /// The main training loop
    pub fn fit(
        &mut self,
        inputs: &Inputs<'_>,
        target: ArrayView1<f32>,
        opts: &FitOptions,
    ) -> Result<FitReport, TrainingError> {
        let n_rows = inputs.n_rows()?;
        if n_rows != target.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "Inputs have {} rows but the target has {}",
                n_rows,
                target.len()
            ))
            .into());
        }
        if opts.batch_size == 0 {
            return Err(TrainingError::Config("batch_size must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&opts.val_split) {
            return Err(TrainingError::Config(format!(
                "val_split {} outside [0, 1)",
                opts.val_split
            )));
        }

        let split = train_val_split(n_rows, opts.val_split, opts.seed);
        if split.train.is_empty() && opts.n_epochs > 0 {
            return Err(TrainingError::Config(
                "The validation split leaves no training rows".to_string(),
            ));
        }
        let mut shuffle_rng = SmallRng::seed_from_u64(opts.seed);

        let mut history = Vec::with_capacity(opts.n_epochs);
        for epoch in 0..opts.n_epochs {
            self.state.phase = TrainerPhase::EpochRunning;
            self.state.epoch = epoch;

            for binding in &mut self.config.bindings {
                let lr = binding.schedule.learning_rate(binding.base_lr, epoch);
                binding.optimizer.set_learning_rate(lr);
            }

            let mut loss_sum = 0.0;
            let mut n_batches = 0usize;
            let batches = BatchIterator::new(&split.train, opts.batch_size, &mut shuffle_rng);
            for (batch_idx, batch) in batches.enumerate() {
                let batch_inputs = inputs.select(&batch);
                let batch_view = batch_inputs.view();
                let batch_target = target.select(Axis(0), &batch);

                let outputs = self.model.forward_train(&batch_view)?;
                let loss = self
                    .config
                    .method
                    .loss(outputs.view(), batch_target.view())?;
                if !loss.is_finite() {
                    match opts.nan_policy {
                        NanPolicy::Abort => {
                            return Err(TrainingError::NumericalInstability {
                                epoch,
                                batch: batch_idx,
                                loss,
                            })
                        }
                        NanPolicy::SkipBatch => {
                            warn!(
                                "Skipping batch {} of epoch {}: non-finite loss {}",
                                batch_idx, epoch, loss
                            );
                            continue;
                        }
                    }
                }

                let grad = self
                    .config
                    .method
                    .loss_grad(outputs.view(), batch_target.view())?;
                self.model.zero_grad();
                self.model.backward(grad.view())?;

                // Each optimizer only ever sees the component it is bound to
                for binding in &mut self.config.bindings {
                    if let Some(component) = self.model.component_mut(&binding.component) {
                        binding.optimizer.step(component);
                    }
                }

                loss_sum += loss;
                n_batches += 1;
            }

            let train_loss = loss_sum / n_batches.max(1) as f32;
            self.state.running_loss = train_loss;
            self.state.phase = TrainerPhase::EpochEvaluating;

            // With no held-out rows, evaluation falls back to the training
            // partition so callbacks still see a monitored value
            let eval_indices: &[usize] = if split.val.is_empty() {
                &split.train
            } else {
                &split.val
            };
            let (val_loss, metric_values) = evaluate(
                &self.model,
                self.config.method,
                &self.config.metrics,
                inputs,
                target,
                eval_indices,
            )?;

            self.model.mark_fitted();
            if val_loss < self.state.best_val_loss {
                self.state.best_val_loss = val_loss;
            }

            let record = EpochRecord {
                epoch,
                train_loss,
                val_loss,
                metrics: metric_values,
            };
            info!(
                "Epoch {}/{}: train_loss {:.6}, val_loss {:.6}",
                epoch + 1,
                opts.n_epochs,
                train_loss,
                val_loss
            );

            let mut stop = false;
            for callback in &mut self.config.callbacks {
                if callback.on_epoch_end(&self.model, &record)? == CallbackSignal::Stop {
                    stop = true;
                }
            }
            history.push(record);

            if stop {
                self.state.stopped_early = true;
                break;
            }
        }

        self.state.phase = TrainerPhase::Stopped;
        Ok(FitReport {
            epochs_run: history.len(),
            stopped_early: self.state.stopped_early,
            history,
        })
    }
}

fn evaluate(
    model: &WideDeep,
    method: Method,
    metrics: &[Metric],
    inputs: &Inputs<'_>,
    target: ArrayView1<f32>,
    indices: &[usize],
) -> Result<(f32, Vec<(String, f32)>), TrainingError> {
    let subset = inputs.select(indices);
    let subset_view = subset.view();
    let subset_target = target.select(Axis(0), indices);

    let outputs = model.forward(&subset_view)?;
    let loss = method.loss(outputs.view(), subset_target.view())?;

    let predictions = method.activate(outputs);
    let values = metrics
        .iter()
        .map(|m| {
            (
                m.name().to_string(),
                m.compute(predictions.view(), subset_target.view()),
            )
        })
        .collect();
    Ok((loss, values))
}
