use crate::error::{TrainingError, TrainingResult};
use crate::param::RunConfiguration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Input data locations, one per channel role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChannels {
    pub train: String,
    pub validation: String,
    pub eval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Final model location, collected by the external upload step.
    pub model_dir: String,
    pub checkpoint_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
    Rmsprop,
}

impl OptimizerKind {
    pub const NAMES: &'static [&'static str] = &["sgd", "adam", "rmsprop"];

    pub fn parse(name: &str) -> TrainingResult<Self> {
        match name {
            "sgd" => Ok(Self::Sgd),
            "adam" => Ok(Self::Adam),
            "rmsprop" => Ok(Self::Rmsprop),
            other => {
                let expected = format!("one of {}", Self::NAMES.join("|"));
                Err(TrainingError::invalid("optimizer", other, expected))
            }
        }
    }
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sgd => "sgd",
            Self::Adam => "adam",
            Self::Rmsprop => "rmsprop",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHyperParams {
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub optimizer: OptimizerKind,
    pub momentum: f64,
    pub weight_decay: f64,
    pub seed: u64,
    #[serde(default)]
    pub resume: bool,
}

impl Default for TrainingHyperParams {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 0.01,
            batch_size: 128,
            optimizer: OptimizerKind::Adam,
            momentum: 0.9,
            weight_decay: 2e-4,
            seed: 42,
            resume: false,
        }
    }
}

impl TrainingHyperParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.epochs == 0 {
            return Err(TrainingError::invalid("epochs", self.epochs.to_string(), "integer >= 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::invalid(
                "learning_rate",
                self.learning_rate.to_string(),
                "number > 0",
            ));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::invalid(
                "batch_size",
                self.batch_size.to_string(),
                "integer >= 1",
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(TrainingError::invalid(
                "momentum",
                self.momentum.to_string(),
                "number in [0, 1)",
            ));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(TrainingError::invalid(
                "weight_decay",
                self.weight_decay.to_string(),
                "number >= 0",
            ));
        }
        Ok(())
    }
}

/// Host resources reported by the execution context. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingResources {
    pub num_gpus: u32,
    pub num_cpus: u32,
    pub hosts: Vec<String>,
    pub current_host: String,
}

impl Default for TrainingResources {
    fn default() -> Self {
        Self {
            num_gpus: 0,
            num_cpus: 1,
            hosts: vec!["localhost".to_string()],
            current_host: "localhost".to_string(),
        }
    }
}

impl TrainingResources {
    pub fn validate(&self) -> TrainingResult<()> {
        if !self.hosts.iter().any(|h| h == &self.current_host) {
            return Err(TrainingError::invalid(
                "current_host",
                self.current_host.clone(),
                format!("one of the configured hosts ({})", self.hosts.join(",")),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub channels: DataChannels,
    pub outputs: OutputPaths,
    pub hyperparams: TrainingHyperParams,
    pub resources: TrainingResources,
}

fn non_negative<T: TryFrom<i64>>(name: &str, value: i64) -> TrainingResult<T> {
    T::try_from(value)
        .map_err(|_| TrainingError::invalid(name, value.to_string(), "non-negative integer"))
}

impl TrainingJobSpec {
    #[must_use]
    pub fn new(channels: DataChannels, outputs: OutputPaths) -> Self {
        Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            channels,
            outputs,
            hyperparams: TrainingHyperParams::default(),
            resources: TrainingResources::default(),
        }
    }

    /// Build a validated job from a resolved configuration.
    pub fn from_config(config: &RunConfiguration) -> TrainingResult<Self> {
        let channels = DataChannels {
            train: config.path("train")?.to_string(),
            validation: config.path("validation")?.to_string(),
            eval: config.path("eval")?.to_string(),
        };
        let outputs = OutputPaths {
            model_dir: config.path("model_dir")?.to_string(),
            checkpoint_dir: config.path("checkpoint_dir")?.to_string(),
            output_data_dir: config.optional_path("output_data_dir")?.map(str::to_string),
        };
        let hyperparams = TrainingHyperParams {
            epochs: non_negative("epochs", config.integer("epochs")?)?,
            learning_rate: config.float("learning_rate")?,
            batch_size: non_negative("batch_size", config.integer("batch_size")?)?,
            optimizer: OptimizerKind::parse(config.choice("optimizer")?)?,
            momentum: config.float("momentum")?,
            weight_decay: config.float("weight_decay")?,
            seed: non_negative("seed", config.integer("seed")?)?,
            resume: config.flag("resume")?,
        };
        let resources = TrainingResources {
            num_gpus: non_negative("num_gpus", config.integer("num_gpus")?)?,
            num_cpus: non_negative("num_cpus", config.integer("num_cpus")?)?,
            hosts: config.list("hosts")?.to_vec(),
            current_host: config.text("current_host")?.to_string(),
        };

        let job = Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            channels,
            outputs,
            hyperparams,
            resources,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        self.hyperparams.validate()?;
        self.resources.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TrainingJobSpec {
        TrainingJobSpec::new(
            DataChannels {
                train: "t".to_string(),
                validation: "v".to_string(),
                eval: "e".to_string(),
            },
            OutputPaths {
                model_dir: "m".to_string(),
                checkpoint_dir: "c".to_string(),
                output_data_dir: None,
            },
        )
    }

    #[test]
    fn test_default_job_validates() {
        assert!(job().validate().is_ok());
    }

    #[test]
    fn test_zero_epochs_rejected_with_parameter_name() {
        let mut spec = job();
        spec.hyperparams.epochs = 0;
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("epochs"));
    }

    #[test]
    fn test_momentum_range() {
        let mut spec = job();
        spec.hyperparams.momentum = 1.0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_current_host_must_be_listed() {
        let mut spec = job();
        spec.resources.current_host = "algo-2".to_string();
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("current_host"));
    }

    #[test]
    fn test_optimizer_parse() {
        assert_eq!(OptimizerKind::parse("rmsprop").unwrap(), OptimizerKind::Rmsprop);
        assert!(OptimizerKind::parse("lbfgs").is_err());
    }
}
