use crate::artifacts::{
    make_artifact, ArtifactKind, Checkpoint, MetricsReport, SavedModel, TrainingArtifact,
    TrainingManifest, TrainingMetrics,
};
use crate::dataset::{compute_dataset_id, load_channel, ChannelData, Example};
use crate::error::{TrainingError, TrainingResult};
use crate::job::TrainingJobSpec;
use crate::layout::{CheckpointLayout, ModelLayout, MANIFEST_FILE, METRICS_FILE, MODEL_FILE};
use crate::model::{BatchStats, SoftmaxClassifier};
use crate::optimizer::Optimizer;
use crate::progress::{EpochMetrics, ProgressEvent, ProgressSink};
use crate::store::{join, DataStore, LocalStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;

/// A training backend. Runs synchronously to completion or failure.
pub trait Trainer {
    fn id(&self) -> &'static str;

    fn prepare(&self, job: &TrainingJobSpec) -> TrainingResult<()>;

    fn run(
        &self,
        job: &TrainingJobSpec,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingManifest>;
}

/// Trains a softmax classifier from the job's channels through a `DataStore`.
#[derive(Debug, Clone, Default)]
pub struct LocalTrainer<S: DataStore = LocalStore> {
    store: S,
}

impl<S: DataStore> LocalTrainer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn load_channels(&self, job: &TrainingJobSpec) -> TrainingResult<ChannelData> {
        let load = |name: &str, uri: &str| {
            load_channel(&self.store, name, uri)
                .map_err(|e| e.during(&format!("loading {name} channel")))
        };
        let data = ChannelData {
            train: load("train", &job.channels.train)?,
            validation: load("validation", &job.channels.validation)?,
            eval: load("eval", &job.channels.eval)?,
        };

        let width = data.num_features();
        for (name, ds) in [("validation", &data.validation), ("eval", &data.eval)] {
            let other = ds.first().map_or(width, |e| e.features.len());
            if other != width {
                return Err(TrainingError::failure(format!(
                    "{name} channel has {other} features, train channel has {width}"
                )));
            }
        }
        Ok(data)
    }

    /// Latest checkpoint usable by this job, if any. Checkpoints with a
    /// different model shape, or already at the requested epoch count, are
    /// skipped.
    fn restore(
        &self,
        job: &TrainingJobSpec,
        fresh: &SoftmaxClassifier,
    ) -> TrainingResult<Option<Checkpoint>> {
        let layout = CheckpointLayout::new(job.outputs.checkpoint_dir.as_str());
        let Some((epoch, path)) = layout.latest(&self.store)? else {
            return Ok(None);
        };

        let ckpt: Checkpoint = serde_json::from_slice(&self.store.read(&path)?)
            .map_err(|e| TrainingError::failure(format!("corrupt checkpoint {path}: {e}")))?;
        if ckpt.model.num_features != fresh.num_features
            || ckpt.model.num_classes != fresh.num_classes
        {
            tracing::warn!(
                checkpoint = %path,
                "checkpoint shape does not match the data; starting from scratch"
            );
            return Ok(None);
        }
        if ckpt.epoch >= job.hyperparams.epochs {
            tracing::warn!(
                checkpoint = %path,
                epoch = ckpt.epoch,
                epochs = job.hyperparams.epochs,
                "checkpoint is at or past the requested epochs; starting from scratch"
            );
            return Ok(None);
        }
        tracing::info!(checkpoint = %path, epoch, "resuming from checkpoint");
        Ok(Some(ckpt))
    }

    fn clear_checkpoints(&self, job: &TrainingJobSpec) -> TrainingResult<()> {
        let dir = job.outputs.checkpoint_dir.as_str();
        let removed = CheckpointLayout::new(dir).clear(&self.store)?;
        if removed > 0 {
            tracing::info!(dir, removed, "removed checkpoints from an earlier run");
        }
        Ok(())
    }

    fn write_checkpoint(
        &self,
        job: &TrainingJobSpec,
        ckpt: &Checkpoint,
    ) -> TrainingResult<TrainingArtifact> {
        let layout = CheckpointLayout::new(job.outputs.checkpoint_dir.as_str());
        let path = layout.checkpoint_path(ckpt.epoch);
        let bytes = serde_json::to_vec(ckpt)?;
        self.store.write(&path, &bytes)?;
        tracing::debug!(checkpoint = %path, "wrote checkpoint");
        Ok(make_artifact(ArtifactKind::Checkpoint, path, &bytes))
    }

    /// Write the model version directory. Files go to a staging directory
    /// first and are renamed into place; the staging directory is removed on
    /// any failure so nothing partial remains. `metrics.json` is written only
    /// once the version directory exists.
    fn persist(
        &self,
        job: &TrainingJobSpec,
        model: &SoftmaxClassifier,
        manifest: &mut TrainingManifest,
        report: &MetricsReport,
    ) -> TrainingResult<()> {
        let layout = ModelLayout::new(job.outputs.model_dir.as_str());
        let staging = layout.staging_dir(&job.job_id);

        let metrics = match &job.outputs.output_data_dir {
            Some(dir) => {
                let bytes = serde_json::to_vec_pretty(report)
                    .map_err(|e| TrainingError::from(e).during("encoding metrics"))?;
                Some((join(dir, METRICS_FILE), bytes))
            }
            None => None,
        };
        if let Some((path, bytes)) = &metrics {
            manifest.artifacts.push(make_artifact(ArtifactKind::Metrics, path.clone(), bytes));
        }

        let result = self.persist_staged(job, &layout, &staging, model, manifest);
        if result.is_err() {
            if let Err(cleanup) = self.store.remove_dir_all(&staging) {
                tracing::warn!(
                    staging = %staging,
                    error = %cleanup,
                    "failed to remove staging directory"
                );
            }
            manifest.artifacts.clear();
            manifest.model_version = None;
        }
        result.map_err(|e| e.during("writing model artifact"))?;

        if let Some((path, bytes)) = metrics {
            self.store.write(&path, &bytes).map_err(|e| e.during("writing metrics"))?;
        }
        Ok(())
    }

    fn persist_staged(
        &self,
        job: &TrainingJobSpec,
        layout: &ModelLayout,
        staging: &str,
        model: &SoftmaxClassifier,
        manifest: &mut TrainingManifest,
    ) -> TrainingResult<()> {
        self.store.remove_dir_all(staging)?;
        self.store.create_dir_all(staging)?;

        let version = layout.next_version(&self.store)?;
        let final_dir = layout.version_dir(version);

        let saved = SavedModel {
            format_version: SavedModel::FORMAT_VERSION,
            job_id: job.job_id.clone(),
            model: model.clone(),
        };
        let model_bytes = serde_json::to_vec_pretty(&saved)?;
        self.store.write(&join(staging, MODEL_FILE), &model_bytes)?;

        manifest.model_version = Some(version);
        let model_path = join(&final_dir, MODEL_FILE);
        manifest.artifacts.push(make_artifact(ArtifactKind::Model, model_path, &model_bytes));

        let manifest_bytes = serde_json::to_vec_pretty(manifest)?;
        self.store.write(&join(staging, MANIFEST_FILE), &manifest_bytes)?;
        self.store.rename(staging, &final_dir)?;
        tracing::info!(dir = %final_dir, version, "model written");
        Ok(())
    }
}

fn train_epoch(
    model: &mut SoftmaxClassifier,
    optimizer: &mut Optimizer,
    train: &[Example],
    batch_size: usize,
    rng: &mut StdRng,
) -> TrainingResult<BatchStats> {
    let mut order: Vec<usize> = (0..train.len()).collect();
    order.shuffle(rng);

    let mut loss_sum = 0.0;
    let mut acc_sum = 0.0;
    for chunk in order.chunks(batch_size.max(1)) {
        let batch: Vec<&Example> = chunk.iter().map(|&i| &train[i]).collect();
        let (stats, grads) = model.loss_and_gradient(&batch)?;
        optimizer.apply(model, &grads);

        #[allow(clippy::cast_precision_loss)]
        let weight = batch.len() as f64;
        loss_sum += stats.loss * weight;
        acc_sum += stats.accuracy * weight;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = train.len().max(1) as f64;
    Ok(BatchStats { loss: loss_sum / n, accuracy: acc_sum / n })
}

fn check_finite(epoch: u32, model: &SoftmaxClassifier, stats: &[BatchStats]) -> TrainingResult<()> {
    if model.is_finite() && stats.iter().all(|s| s.loss.is_finite()) {
        return Ok(());
    }
    Err(TrainingError::failure(format!(
        "training diverged at epoch {epoch} (non-finite loss or weights); lower learning_rate"
    )))
}

impl<S: DataStore> Trainer for LocalTrainer<S> {
    fn id(&self) -> &'static str {
        "local-softmax"
    }

    fn prepare(&self, job: &TrainingJobSpec) -> TrainingResult<()> {
        job.validate()?;
        self.store
            .create_dir_all(&job.outputs.checkpoint_dir)
            .map_err(|e| e.during("creating checkpoint directory"))?;
        Ok(())
    }

    fn run(
        &self,
        job: &TrainingJobSpec,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingManifest> {
        job.validate()?;

        let job_id = job.job_id.clone();
        let params = &job.hyperparams;
        progress.on_event(ProgressEvent::Started { job_id: job_id.clone() });

        if job.resources.num_gpus > 0 {
            tracing::warn!(
                num_gpus = job.resources.num_gpus,
                "GPUs reported but this trainer runs on CPU"
            );
        }
        let resources = &job.resources;
        let primary = resources.hosts.first().is_some_and(|h| *h == resources.current_host);

        let data = self.load_channels(job)?;
        let dataset_id = compute_dataset_id(&data.train)?;

        let mut init_rng = StdRng::seed_from_u64(params.seed);
        let mut model =
            SoftmaxClassifier::new(data.num_features(), data.num_classes(), &mut init_rng)?;
        progress.on_event(ProgressEvent::Message {
            job_id: job_id.clone(),
            message: format!(
                "built {} model: {} features, {} classes, optimizer {}",
                self.id(),
                model.num_features,
                model.num_classes,
                params.optimizer
            ),
        });

        let restored = if params.resume {
            self.restore(job, &model).map_err(|e| e.during("reading checkpoint"))?
        } else {
            None
        };
        let mut history = Vec::new();
        let mut start_epoch = 1;
        if let Some(ckpt) = restored {
            start_epoch = ckpt.epoch.saturating_add(1);
            model = ckpt.model;
            history = ckpt.history;
        } else {
            self.clear_checkpoints(job).map_err(|e| e.during("clearing checkpoints"))?;
        }

        let mut optimizer = Optimizer::new(params, model.weights.len() + model.bias.len());
        let mut last_checkpoint = None;
        for epoch in start_epoch..=params.epochs {
            let started = Instant::now();
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(u64::from(epoch)));
            let batch_size = params.batch_size as usize;
            let train = train_epoch(&mut model, &mut optimizer, &data.train, batch_size, &mut rng)?;
            let val = model.evaluate(&data.validation)?;
            check_finite(epoch, &model, &[train, val])?;

            let metrics = EpochMetrics {
                epoch,
                epochs: params.epochs,
                loss: train.loss,
                acc: train.accuracy,
                val_loss: val.loss,
                val_acc: val.accuracy,
            };
            progress.on_event(ProgressEvent::Epoch { job_id: job_id.clone(), metrics });
            history.push(metrics);
            tracing::debug!(epoch, elapsed_ms = started.elapsed().as_millis(), "epoch complete");

            let ckpt = Checkpoint { epoch, model: model.clone(), history: history.clone() };
            let artifact =
                self.write_checkpoint(job, &ckpt).map_err(|e| e.during("writing checkpoint"))?;
            last_checkpoint = Some(artifact);
        }

        let eval = model.evaluate(&data.eval)?;
        progress.on_event(ProgressEvent::Evaluated {
            job_id: job_id.clone(),
            loss: eval.loss,
            acc: eval.accuracy,
        });

        let metrics = TrainingMetrics::from_history(&history, eval.loss, eval.accuracy);
        let mut manifest = TrainingManifest {
            job_id: job_id.clone(),
            created_at: chrono::Utc::now(),
            dataset_id,
            model_version: None,
            hyperparams: params.clone(),
            metrics: metrics.clone(),
            artifacts: Vec::new(),
        };

        if primary {
            manifest.artifacts.extend(last_checkpoint);
            let report = MetricsReport { job_id: job_id.clone(), history, final_metrics: metrics };
            self.persist(job, &model, &mut manifest, &report)?;
        } else {
            tracing::info!(
                host = %job.resources.current_host,
                "not the primary host; skipping model output"
            );
        }

        progress.on_event(ProgressEvent::Finished { job_id });
        Ok(manifest)
    }
}
