//! Entry point declarations for local and managed execution.
//!
//! This is the only module that knows the managed platform's conventions:
//! the fixed environment variable names, the hyperparameter file location
//! and the context-dependent defaults. Everything downstream receives a
//! plain `RunConfiguration` / `TrainingJobSpec`.

use crate::error::TrainingResult;
use crate::job::{OptimizerKind, TrainingJobSpec};
use crate::param::{
    resolve, ArgumentSource, EnvironmentSource, FileSource, ParamKind, ParamSpec, RunConfiguration,
    SourceChain,
};
use std::path::{Path, PathBuf};

pub const ENV_CHANNEL_TRAIN: &str = "SM_CHANNEL_TRAIN";
pub const ENV_CHANNEL_VALIDATION: &str = "SM_CHANNEL_VALIDATION";
pub const ENV_CHANNEL_EVAL: &str = "SM_CHANNEL_EVAL";
pub const ENV_MODEL_DIR: &str = "SM_MODEL_DIR";
pub const ENV_OUTPUT_DATA_DIR: &str = "SM_OUTPUT_DATA_DIR";
pub const ENV_NUM_GPUS: &str = "SM_NUM_GPUS";
pub const ENV_NUM_CPUS: &str = "SM_NUM_CPUS";
pub const ENV_HOSTS: &str = "SM_HOSTS";
pub const ENV_CURRENT_HOST: &str = "SM_CURRENT_HOST";
/// Set by the platform in every managed container; only used for detection.
pub const ENV_TRAINING_ENV: &str = "SM_TRAINING_ENV";

/// Every environment variable the entry point reads.
pub const RECOGNIZED_ENV_VARS: &[&str] = &[
    ENV_CHANNEL_TRAIN,
    ENV_CHANNEL_VALIDATION,
    ENV_CHANNEL_EVAL,
    ENV_MODEL_DIR,
    ENV_OUTPUT_DATA_DIR,
    ENV_NUM_GPUS,
    ENV_NUM_CPUS,
    ENV_HOSTS,
    ENV_CURRENT_HOST,
];

pub const MANAGED_HYPERPARAMETERS_FILE: &str = "/opt/ml/input/config/hyperparameters.json";
const MANAGED_CHECKPOINT_DIR: &str = "/opt/ml/checkpoints";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Configuration arrives as explicit arguments.
    Local,
    /// Launched by the platform; configuration arrives mostly via environment.
    Managed,
}

impl ExecutionContext {
    #[must_use]
    pub fn detect(env: &EnvironmentSource) -> Self {
        if env.contains(ENV_TRAINING_ENV) || env.contains(ENV_CURRENT_HOST) {
            Self::Managed
        } else {
            Self::Local
        }
    }
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Managed => "managed",
        })
    }
}

/// The full parameter table for `context`.
#[must_use]
pub fn declarations(context: ExecutionContext) -> Vec<ParamSpec> {
    let checkpoint_default = match context {
        ExecutionContext::Local => "checkpoints",
        ExecutionContext::Managed => MANAGED_CHECKPOINT_DIR,
    };

    vec![
        ParamSpec::path("train", "train").env(ENV_CHANNEL_TRAIN).help("training data channel"),
        ParamSpec::path("validation", "validation")
            .env(ENV_CHANNEL_VALIDATION)
            .help("validation data channel"),
        ParamSpec::path("eval", "eval").env(ENV_CHANNEL_EVAL).help("held-out evaluation channel"),
        ParamSpec::path("model_dir", "model-dir")
            .env(ENV_MODEL_DIR)
            .default_value("model")
            .help("final model output directory"),
        ParamSpec::path("checkpoint_dir", "checkpoint-dir")
            .default_value(checkpoint_default)
            .help("per-epoch checkpoint directory"),
        ParamSpec::path("output_data_dir", "output-data-dir")
            .env(ENV_OUTPUT_DATA_DIR)
            .optional()
            .help("directory for metrics.json"),
        ParamSpec::new("epochs", "epochs", ParamKind::Integer)
            .default_value("10")
            .help("number of epochs"),
        ParamSpec::new("learning_rate", "learning-rate", ParamKind::Float)
            .default_value("0.01")
            .help("optimizer learning rate"),
        ParamSpec::new("batch_size", "batch-size", ParamKind::Integer)
            .default_value("128")
            .help("mini-batch size"),
        ParamSpec::new("optimizer", "optimizer", ParamKind::Choice(OptimizerKind::NAMES))
            .default_value("adam")
            .help("optimizer"),
        ParamSpec::new("momentum", "momentum", ParamKind::Float)
            .default_value("0.9")
            .help("sgd momentum"),
        ParamSpec::new("weight_decay", "weight-decay", ParamKind::Float)
            .default_value("0.0002")
            .help("L2 weight decay"),
        ParamSpec::new("seed", "seed", ParamKind::Integer).default_value("42").help("random seed"),
        ParamSpec::new("resume", "resume", ParamKind::Flag)
            .default_value("false")
            .help("continue from the latest checkpoint"),
        ParamSpec::new("num_gpus", "num-gpus", ParamKind::Integer)
            .env(ENV_NUM_GPUS)
            .default_value("0")
            .help("GPUs on this host"),
        ParamSpec::new("num_cpus", "num-cpus", ParamKind::Integer)
            .env(ENV_NUM_CPUS)
            .default_value("1")
            .help("CPUs on this host"),
        ParamSpec::new("hosts", "hosts", ParamKind::List)
            .env(ENV_HOSTS)
            .default_value("localhost")
            .help("hosts in the job"),
        ParamSpec::new("current_host", "current-host", ParamKind::Text)
            .env(ENV_CURRENT_HOST)
            .default_value("localhost")
            .help("this host's name"),
    ]
}

/// Hyperparameter file to consult: the explicit one, or the platform's
/// file when running managed and it exists.
#[must_use]
pub fn hyperparameter_file(context: ExecutionContext, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let managed = Path::new(MANAGED_HYPERPARAMETERS_FILE);
    (context == ExecutionContext::Managed && managed.exists()).then(|| managed.to_path_buf())
}

/// Arguments, then environment, then the hyperparameter file.
pub fn build_chain(
    args: ArgumentSource,
    env: EnvironmentSource,
    file: Option<&Path>,
) -> TrainingResult<SourceChain> {
    let mut chain = SourceChain::new().with(args).with(env);
    if let Some(path) = file {
        chain = chain.with(FileSource::load(path)?);
    }
    Ok(chain)
}

/// Everything the entry point resolved for one invocation.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub context: ExecutionContext,
    pub config: RunConfiguration,
}

impl EntryPoint {
    /// Detect the context, build the source chain and resolve the table.
    pub fn resolve(
        args: ArgumentSource,
        env: EnvironmentSource,
        config_file: Option<&Path>,
    ) -> TrainingResult<Self> {
        let context = ExecutionContext::detect(&env);
        let file = hyperparameter_file(context, config_file);
        let chain = build_chain(args, env, file.as_deref())?;
        tracing::debug!(%context, sources = ?chain.source_names(), "resolving configuration");

        let config = resolve(&declarations(context), &chain)?;
        for (name, resolved) in config.iter() {
            tracing::debug!(
                parameter = name,
                value = %resolved.value,
                origin = %resolved.origin,
                "resolved"
            );
        }
        Ok(Self { context, config })
    }

    pub fn job(&self) -> TrainingResult<TrainingJobSpec> {
        TrainingJobSpec::from_config(&self.config)
    }
}
