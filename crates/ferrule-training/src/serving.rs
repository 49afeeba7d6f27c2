//! Offline scoring with the same request/response shape as the hosted
//! prediction endpoint: `{"instances": [...]}` in, `{"predictions": [...]}`
//! out, one probability vector per instance.

use crate::artifacts::SavedModel;
use crate::dataset::Example;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{ModelLayout, MODEL_FILE};
use crate::model::argmax;
use crate::store::{join, DataStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub instances: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<Vec<f64>>,
}

impl PredictResponse {
    /// Most likely class per prediction.
    #[must_use]
    pub fn classes(&self) -> Vec<usize> {
        self.predictions.iter().map(|p| argmax(p)).collect()
    }
}

/// Load the highest model version under `model_dir`.
pub fn load_latest_model(
    store: &dyn DataStore,
    model_dir: &str,
) -> TrainingResult<(u32, SavedModel)> {
    let layout = ModelLayout::new(model_dir);
    let version = layout
        .latest_version(store)?
        .ok_or_else(|| {
            TrainingError::failure(format!("no model versions found under {model_dir}"))
        })?;

    let path = join(&layout.version_dir(version), MODEL_FILE);
    let saved: SavedModel = serde_json::from_slice(&store.read(&path)?)
        .map_err(|e| TrainingError::failure(format!("invalid model file {path}: {e}")))?;
    if saved.format_version != SavedModel::FORMAT_VERSION {
        return Err(TrainingError::failure(format!(
            "{path} has format version {}, expected {}",
            saved.format_version,
            SavedModel::FORMAT_VERSION
        )));
    }
    Ok((version, saved))
}

pub fn predict(model: &SavedModel, request: &PredictRequest) -> TrainingResult<PredictResponse> {
    let predictions = request
        .instances
        .iter()
        .enumerate()
        .map(|(idx, x)| {
            model
                .model
                .probabilities(x)
                .map_err(|e| TrainingError::failure(format!("instance {idx}: {e}")))
        })
        .collect::<TrainingResult<Vec<_>>>()?;
    Ok(PredictResponse { predictions })
}

/// Fraction of predictions whose top class equals the label.
#[must_use]
pub fn accuracy(response: &PredictResponse, labels: &[u32]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let classes = response.classes();
    let correct = classes.iter().zip(labels).filter(|(c, l)| **c == **l as usize).count();
    #[allow(clippy::cast_precision_loss)]
    let acc = correct as f64 / labels.len() as f64;
    acc
}

/// Split labeled examples into a request and its labels.
#[must_use]
pub fn request_from_examples(examples: &[Example]) -> (PredictRequest, Vec<u32>) {
    let instances = examples.iter().map(|e| e.features.clone()).collect();
    let labels = examples.iter().map(|e| e.label).collect();
    (PredictRequest { instances }, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TrainingJobId;
    use crate::model::SoftmaxClassifier;
    use crate::store::LocalStore;
    use tempfile::TempDir;

    fn saved() -> SavedModel {
        SavedModel {
            format_version: SavedModel::FORMAT_VERSION,
            job_id: TrainingJobId("job".to_string()),
            model: SoftmaxClassifier {
                num_features: 2,
                num_classes: 2,
                weights: vec![1.0, 0.0, 0.0, 1.0],
                bias: vec![0.0, 0.0],
            },
        }
    }

    #[test]
    fn test_predict_response_shape() {
        let body = r#"{"instances": [[3.0, 0.0], [0.0, 3.0]]}"#;
        let req: PredictRequest = serde_json::from_str(body).unwrap();
        let resp = predict(&saved(), &req).unwrap();

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["predictions"].as_array().unwrap().len(), 2);
        assert_eq!(resp.classes(), vec![0, 1]);
        assert!((accuracy(&resp, &[0, 1]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_predict_names_bad_instance() {
        let req = PredictRequest { instances: vec![vec![1.0, 1.0], vec![1.0]] };
        let err = predict(&saved(), &req).unwrap_err();
        assert!(err.to_string().contains("instance 1"));
    }

    #[test]
    fn test_load_latest_model_picks_highest_version() {
        let temp = TempDir::new().unwrap();
        for v in ["1", "2"] {
            let dir = temp.path().join(v);
            std::fs::create_dir_all(&dir).unwrap();
            let mut m = saved();
            m.job_id = TrainingJobId(format!("job-{v}"));
            std::fs::write(dir.join(MODEL_FILE), serde_json::to_vec(&m).unwrap()).unwrap();
        }

        let (version, model) =
            load_latest_model(&LocalStore, &temp.path().to_string_lossy()).unwrap();
        assert_eq!(version, 2);
        assert_eq!(model.job_id.0, "job-2");
    }

    #[test]
    fn test_load_latest_model_empty_dir() {
        let temp = TempDir::new().unwrap();
        assert!(load_latest_model(&LocalStore, &temp.path().to_string_lossy()).is_err());
    }
}
