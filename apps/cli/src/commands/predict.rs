//! `predict` command: offline scoring in the serving request/response shape.

use crate::commands::types::PredictArgs;
use anyhow::{Context, Result};
use ferrule_training::serving::request_from_examples;
use ferrule_training::{
    accuracy, load_channel, load_latest_model, predict, LocalStore, PredictRequest,
};
use serde_json::json;

pub fn execute(args: &PredictArgs) -> Result<()> {
    let store = LocalStore::new();
    let (version, model) = load_latest_model(&store, &args.model_dir)
        .with_context(|| format!("Failed to load model from {}", args.model_dir))?;
    tracing::info!(model_dir = %args.model_dir, version, job_id = %model.job_id, "loaded model");

    let (request, labels) = if args.input.to_ascii_lowercase().ends_with(".json") {
        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("Failed to read {}", args.input))?;
        let request: PredictRequest = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a {{\"instances\": [...]}} request", args.input))?;
        (request, None)
    } else {
        let examples = load_channel(&store, "input", &args.input)
            .with_context(|| format!("Failed to read labeled input {}", args.input))?;
        let (request, labels) = request_from_examples(&examples);
        (request, Some(labels))
    };

    let response = predict(&model, &request).context("Prediction failed")?;
    let mut out = serde_json::to_value(&response)?;
    if let Some(labels) = labels {
        out["accuracy"] = json!(accuracy(&response, &labels));
    }

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{out}");
    }
    Ok(())
}
