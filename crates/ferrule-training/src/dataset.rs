use crate::error::{TrainingError, TrainingResult};
use crate::store::DataStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub features: Vec<f64>,
    pub label: u32,
}

pub type Dataset = Vec<Example>;

/// Labels must be below this; the classifier allocates one weight row per class.
pub const MAX_CLASSES: u32 = 10_000;

/// The three channels after loading.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub train: Dataset,
    pub validation: Dataset,
    pub eval: Dataset,
}

impl ChannelData {
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.train.first().map_or(0, |e| e.features.len())
    }

    /// Class count covering every label seen in any channel.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.train
            .iter()
            .chain(&self.validation)
            .chain(&self.eval)
            .map(|e| e.label as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

pub fn compute_dataset_id(examples: &[Example]) -> TrainingResult<DatasetId> {
    let mut hasher = Sha256::new();

    for ex in examples {
        let bytes = serde_json::to_vec(ex)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

pub fn validate_examples(channel: &str, examples: &[Example]) -> TrainingResult<()> {
    let Some(first) = examples.first() else {
        return Err(TrainingError::failure(format!("{channel} channel has no examples")));
    };
    let width = first.features.len();
    if width == 0 {
        return Err(TrainingError::failure(format!("{channel} channel example[0] has no features")));
    }
    for (idx, ex) in examples.iter().enumerate() {
        if ex.features.len() != width {
            return Err(TrainingError::failure(format!(
                "{channel} channel example[{idx}] has {} features, expected {width}",
                ex.features.len()
            )));
        }
        if ex.features.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::failure(format!(
                "{channel} channel example[{idx}] has a non-finite feature"
            )));
        }
        if ex.label >= MAX_CLASSES {
            return Err(TrainingError::failure(format!(
                "{channel} channel example[{idx}] has label {}, labels must be below {MAX_CLASSES}",
                ex.label
            )));
        }
    }
    Ok(())
}

/// Parse JSONL records of the form `{"features": [...], "label": n}`.
pub fn parse_jsonl(source: &str, contents: &str) -> TrainingResult<Dataset> {
    let mut dataset = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ex: Example = serde_json::from_str(line).map_err(|e| {
            TrainingError::failure(format!("failed to parse {source} line {}: {e}", idx + 1))
        })?;
        dataset.push(ex);
    }

    Ok(dataset)
}

/// Parse CSV with a header row; column 0 is the label.
pub fn parse_csv(source: &str, contents: &[u8]) -> TrainingResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(contents);
    let mut dataset = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        // header is line 1
        let line = idx + 2;
        let mut fields = record.iter();
        let label = fields
            .next()
            .and_then(|f| f.parse::<u32>().ok())
            .ok_or_else(|| {
                TrainingError::failure(format!(
                    "{source} line {line}: label must be a non-negative integer"
                ))
            })?;
        let features = fields
            .map(|f| f.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrainingError::failure(format!("{source} line {line}: {e}")))?;
        dataset.push(Example { features, label });
    }

    Ok(dataset)
}

/// Load every `*.jsonl` and `*.csv` file under a channel location.
pub fn load_channel(store: &dyn DataStore, channel: &str, uri: &str) -> TrainingResult<Dataset> {
    let mut dataset = Vec::new();
    let mut files_read = 0usize;

    for file in store.list(uri)? {
        let lower = file.to_ascii_lowercase();
        if lower.ends_with(".jsonl") {
            let bytes = store.read(&file)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| TrainingError::failure(format!("{file} is not valid UTF-8")))?;
            dataset.extend(parse_jsonl(&file, &text)?);
        } else if lower.ends_with(".csv") {
            dataset.extend(parse_csv(&file, &store.read(&file)?)?);
        } else {
            tracing::debug!(channel, file = %file, "skipping unsupported file");
            continue;
        }
        files_read += 1;
    }

    if files_read == 0 {
        return Err(TrainingError::failure(format!(
            "{channel} channel at {uri} contains no .jsonl or .csv files"
        )));
    }

    validate_examples(channel, &dataset)?;
    tracing::info!(channel, uri, examples = dataset.len(), files = files_read, "loaded channel");
    Ok(dataset)
}
