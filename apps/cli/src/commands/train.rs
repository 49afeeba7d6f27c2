//! Training command implementation.

use crate::commands::types::TrainArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use ferrule_training::{ArtifactKind, LocalStore, LocalTrainer, StdoutProgressSink, Trainer};

pub fn execute(args: &TrainArgs, json_output: bool) -> Result<()> {
    let entry = args.resolve().context("Failed to resolve training configuration")?;
    let job = entry.job().context("Invalid training configuration")?;

    tracing::info!(
        context = %entry.context,
        job_id = %job.job_id,
        train = %job.channels.train,
        model_dir = %job.outputs.model_dir,
        epochs = job.hyperparams.epochs,
        "starting training"
    );

    let trainer = LocalTrainer::new(LocalStore::new());
    trainer.prepare(&job).context("Failed to prepare training job")?;
    let manifest =
        trainer.run(&job, &StdoutProgressSink::default()).context("Training failed")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Job: {}", manifest.job_id.0.cyan());
    match manifest.artifacts.iter().find(|a| a.kind == ArtifactKind::Model) {
        Some(model) => println!("  Model: {}", model.path.dimmed()),
        None => println!("  Model: {}", "not written (non-primary host)".dimmed()),
    }
    if let (Some(loss), Some(acc)) = (manifest.metrics.eval_loss, manifest.metrics.eval_acc) {
        println!("  Eval: eval_loss={loss:.4} eval_acc={acc:.4}");
    }
    println!();
    Ok(())
}
