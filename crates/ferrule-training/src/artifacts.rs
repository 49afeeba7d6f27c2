use crate::dataset::DatasetId;
use crate::job::{TrainingHyperParams, TrainingJobId};
use crate::model::SoftmaxClassifier;
use crate::progress::EpochMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    Checkpoint,
    Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TrainingMetrics {
    pub epochs: u32,
    pub loss: Option<f64>,
    pub acc: Option<f64>,
    pub val_loss: Option<f64>,
    pub val_acc: Option<f64>,
    pub eval_loss: Option<f64>,
    pub eval_acc: Option<f64>,
}

impl TrainingMetrics {
    #[must_use]
    pub fn from_history(history: &[EpochMetrics], eval_loss: f64, eval_acc: f64) -> Self {
        let last = history.last();
        Self {
            epochs: last.map_or(0, |m| m.epoch),
            loss: last.map(|m| m.loss),
            acc: last.map(|m| m.acc),
            val_loss: last.map(|m| m.val_loss),
            val_acc: last.map(|m| m.val_acc),
            eval_loss: Some(eval_loss),
            eval_acc: Some(eval_acc),
        }
    }
}

/// The serialized model as loaded by the serving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub job_id: TrainingJobId,
    pub model: SoftmaxClassifier,
}

impl SavedModel {
    pub const FORMAT_VERSION: u32 = 1;
}

/// Per-epoch training state for restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: u32,
    pub model: SoftmaxClassifier,
    pub history: Vec<EpochMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub dataset_id: DatasetId,
    /// `None` on non-primary hosts, which do not persist a model.
    pub model_version: Option<u32>,
    pub hyperparams: TrainingHyperParams,
    #[serde(default)]
    pub metrics: TrainingMetrics,
    pub artifacts: Vec<TrainingArtifact>,
}

/// Contents of `metrics.json` in the output data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub job_id: TrainingJobId,
    pub history: Vec<EpochMetrics>,
    pub final_metrics: TrainingMetrics,
}

#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[must_use]
pub fn make_artifact(kind: ArtifactKind, path: String, bytes: &[u8]) -> TrainingArtifact {
    TrainingArtifact { kind, path, sha256: sha256_bytes(bytes) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_metrics_from_history_uses_last_epoch() {
        let history = [
            EpochMetrics { epoch: 1, epochs: 2, loss: 0.9, acc: 0.4, val_loss: 1.0, val_acc: 0.3 },
            EpochMetrics { epoch: 2, epochs: 2, loss: 0.5, acc: 0.8, val_loss: 0.6, val_acc: 0.7 },
        ];
        let m = TrainingMetrics::from_history(&history, 0.55, 0.75);
        assert_eq!(m.epochs, 2);
        assert_eq!(m.loss, Some(0.5));
        assert_eq!(m.eval_acc, Some(0.75));
    }
}
