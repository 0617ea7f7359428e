use std::env;

use anyhow::Context;

use widedeep::{
    compile, Callback, CompileOptions, ComponentSpec, DatasetBundle, FitOptions, Initializer,
    Inputs, LrSchedule, Method, Metric, Optimizer, Trainer, WideDeep,
};

/// Run configuration for the adult-income style training run
#[derive(Clone, Debug)]
struct RunConfig {
    bundle_path: String,
    weights_path: String,
    n_epochs: usize,
    batch_size: usize,
    val_split: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            bundle_path: "data/wd_bundle.bin".to_string(),
            weights_path: "model_weights/wd_out.bin".to_string(),
            n_epochs: 4,
            batch_size: 256,
            val_split: 0.2,
        }
    }
}

fn assemble(bundle: &DatasetBundle, inputs: &Inputs<'_>) -> anyhow::Result<WideDeep> {
    let model = WideDeep::builder(1)
        .component("wide", ComponentSpec::wide_from(bundle))
        .component(
            "deepdense",
            ComponentSpec::deep_dense_from(bundle, vec![64, 32], vec![0.5]),
        )
        .build(inputs)?;
    Ok(model)
}

fn train(run: &RunConfig) -> anyhow::Result<()> {
    let bundle = DatasetBundle::load(&run.bundle_path)
        .with_context(|| format!("loading dataset bundle from {}", run.bundle_path))?;
    let inputs = Inputs::from_bundle(&bundle);

    let mut model = assemble(&bundle, &inputs)?;
    let options = CompileOptions::new(Method::Binary)
        .initializer("wide", Initializer::Normal { mean: 0.0, std: 0.02 })
        .initializer("deepdense", Initializer::Normal { mean: 0.0, std: 0.02 })
        .optimizer("wide", Optimizer::adam(0.001))
        .optimizer("deepdense", Optimizer::adam(0.001))
        .schedule("wide", LrSchedule::step(5))
        .schedule("deepdense", LrSchedule::step(5))
        .callback(Callback::early_stopping(3, 0.0))
        .callback(Callback::model_checkpoint(&run.weights_path))
        .metric(Metric::BinaryAccuracy);
    let config = compile(&mut model, options)?;

    let mut trainer = Trainer::new(model, config);
    let report = trainer.fit(
        &inputs,
        bundle.target.view(),
        &FitOptions {
            n_epochs: run.n_epochs,
            batch_size: run.batch_size,
            val_split: run.val_split,
            ..FitOptions::default()
        },
    )?;

    for record in &report.history {
        println!(
            "epoch {}: train_loss {:.6}, val_loss {:.6}{}",
            record.epoch,
            record.train_loss,
            record.val_loss,
            record
                .metrics
                .iter()
                .map(|(name, value)| format!(", {} {:.4}", name, value))
                .collect::<String>()
        );
    }

    let model = trainer.into_model();
    model.save_parameters(&run.weights_path)?;
    println!("Saved weights to {}", run.weights_path);
    Ok(())
}

fn predict(run: &RunConfig) -> anyhow::Result<()> {
    let bundle = DatasetBundle::load(&run.bundle_path)
        .with_context(|| format!("loading dataset bundle from {}", run.bundle_path))?;
    let inputs = Inputs::from_bundle(&bundle);

    let mut model = assemble(&bundle, &inputs)?;
    let _ = compile(&mut model, CompileOptions::new(Method::Binary))?;
    model
        .load_parameters(&run.weights_path)
        .with_context(|| format!("loading weights from {}", run.weights_path))?;

    let probs = model.predict_proba(&inputs)?;
    for (i, p) in probs.column(0).iter().take(10).enumerate() {
        println!("sample {}: p = {:.4}", i, p);
    }
    println!("Predicted {} samples", probs.nrows());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let mut run = RunConfig::default();

    match args.get(1).map(|s| s.as_str()) {
        Some("train") => {
            if let Some(epochs) = args.get(2).and_then(|s| s.parse().ok()) {
                run.n_epochs = epochs;
            }
            train(&run)
        }
        Some("predict") => predict(&run),
        _ => {
            println!("Usage: widedeep [train|predict]");
            println!("Example commands:");
            println!("  widedeep train 4");
            println!("  widedeep predict");
            Ok(())
        }
    }
}
