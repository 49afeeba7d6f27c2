use crate::error::TrainingResult;
use crate::job::TrainingJobId;
use crate::store::{join, DataStore};

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "training_manifest.json";
pub const METRICS_FILE: &str = "metrics.json";

/// Layout of a model directory.
///
/// Each successful run lands in its own numbered version directory so a
/// serving runtime can pick the highest one:
/// `<model_dir>/<version>/{model.json,training_manifest.json}`.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    root: String,
}

impl ModelLayout {
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn version_dir(&self, version: u32) -> String {
        join(&self.root, &version.to_string())
    }

    #[must_use]
    pub fn staging_dir(&self, job_id: &TrainingJobId) -> String {
        join(&self.root, &format!(".staging-{job_id}"))
    }

    /// Existing version numbers, ascending. Non-numeric entries are ignored.
    pub fn versions(&self, store: &dyn DataStore) -> TrainingResult<Vec<u32>> {
        let mut versions: Vec<u32> = store
            .child_dirs(&self.root)?
            .iter()
            .filter_map(|name| name.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self, store: &dyn DataStore) -> TrainingResult<Option<u32>> {
        Ok(self.versions(store)?.last().copied())
    }

    pub fn next_version(&self, store: &dyn DataStore) -> TrainingResult<u32> {
        Ok(self.latest_version(store)?.map_or(1, |v| v.saturating_add(1)))
    }
}

/// Checkpoint files: `<checkpoint_dir>/checkpoint-<epoch:04>.json`.
#[derive(Debug, Clone)]
pub struct CheckpointLayout {
    root: String,
}

impl CheckpointLayout {
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn checkpoint_path(&self, epoch: u32) -> String {
        join(&self.root, &format!("checkpoint-{epoch:04}.json"))
    }

    /// Every `checkpoint-NNNN.json` present, as `(epoch, path)`.
    pub fn checkpoints(&self, store: &dyn DataStore) -> TrainingResult<Vec<(u32, String)>> {
        if !store.exists(&self.root)? {
            return Ok(Vec::new());
        }
        let found = store
            .list(&self.root)?
            .into_iter()
            .filter_map(|path| {
                let name = path.rsplit('/').next()?;
                let epoch = name.strip_prefix("checkpoint-")?.strip_suffix(".json")?;
                Some((epoch.parse::<u32>().ok()?, path))
            })
            .collect();
        Ok(found)
    }

    /// Highest-epoch checkpoint present, if any.
    pub fn latest(&self, store: &dyn DataStore) -> TrainingResult<Option<(u32, String)>> {
        Ok(self.checkpoints(store)?.into_iter().max_by_key(|(epoch, _)| *epoch))
    }

    /// Remove every checkpoint file, leaving other files alone. Returns the count removed.
    pub fn clear(&self, store: &dyn DataStore) -> TrainingResult<usize> {
        let found = self.checkpoints(store)?;
        for (_, path) in &found {
            store.remove_file(path)?;
        }
        Ok(found.len())
    }
}
