//! `metrics` command: metric definitions for hyperparameter tuning jobs.

use anyhow::Result;
use ferrule_training::metric_definitions;

pub fn execute() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&metric_definitions())?);
    Ok(())
}
