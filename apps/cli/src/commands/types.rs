//! Command argument types shared between main.rs and the commands.

use clap::Args;
use ferrule_training::{ArgumentSource, EnvironmentSource, EntryPoint};
use std::path::PathBuf;

/// Training flags. Every value is optional here: anything not given falls
/// through to the environment, the hyperparameter file, then defaults.
/// Values are kept as text so type errors are reported by the resolver
/// with the parameter name.
#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// Training data channel (file or directory)
    #[arg(long)]
    pub train: Option<String>,

    /// Validation data channel (file or directory)
    #[arg(long)]
    pub validation: Option<String>,

    /// Held-out evaluation channel (file or directory)
    #[arg(long)]
    pub eval: Option<String>,

    /// Directory the versioned model is written to
    #[arg(long, alias = "model_dir")]
    pub model_dir: Option<String>,

    /// Directory for per-epoch checkpoints
    #[arg(long, alias = "checkpoint_dir")]
    pub checkpoint_dir: Option<String>,

    /// Directory for metrics.json
    #[arg(long, alias = "output_data_dir")]
    pub output_data_dir: Option<String>,

    /// Number of epochs
    #[arg(long)]
    pub epochs: Option<String>,

    /// Learning rate
    #[arg(long, alias = "learning_rate")]
    pub learning_rate: Option<String>,

    /// Mini-batch size
    #[arg(long, alias = "batch_size")]
    pub batch_size: Option<String>,

    /// Optimizer (sgd, adam, rmsprop)
    #[arg(long)]
    pub optimizer: Option<String>,

    /// SGD momentum
    #[arg(long)]
    pub momentum: Option<String>,

    /// L2 weight decay
    #[arg(long, alias = "weight_decay")]
    pub weight_decay: Option<String>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<String>,

    /// Continue from the latest checkpoint in the checkpoint directory
    #[arg(long)]
    pub resume: bool,

    /// GPUs on this host (overrides SM_NUM_GPUS)
    #[arg(long, alias = "num_gpus")]
    pub num_gpus: Option<String>,

    /// CPUs on this host (overrides SM_NUM_CPUS)
    #[arg(long, alias = "num_cpus")]
    pub num_cpus: Option<String>,

    /// Hosts in the job, JSON array or comma-separated (overrides SM_HOSTS)
    #[arg(long)]
    pub hosts: Option<String>,

    /// This host's name (overrides SM_CURRENT_HOST)
    #[arg(long, alias = "current_host")]
    pub current_host: Option<String>,

    /// Hyperparameter file (JSON or TOML), consulted after the environment
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TrainArgs {
    #[must_use]
    pub fn to_arguments(&self) -> ArgumentSource {
        let mut args = ArgumentSource::new();
        args.set_opt("train", self.train.as_deref());
        args.set_opt("validation", self.validation.as_deref());
        args.set_opt("eval", self.eval.as_deref());
        args.set_opt("model_dir", self.model_dir.as_deref());
        args.set_opt("checkpoint_dir", self.checkpoint_dir.as_deref());
        args.set_opt("output_data_dir", self.output_data_dir.as_deref());
        args.set_opt("epochs", self.epochs.as_deref());
        args.set_opt("learning_rate", self.learning_rate.as_deref());
        args.set_opt("batch_size", self.batch_size.as_deref());
        args.set_opt("optimizer", self.optimizer.as_deref());
        args.set_opt("momentum", self.momentum.as_deref());
        args.set_opt("weight_decay", self.weight_decay.as_deref());
        args.set_opt("seed", self.seed.as_deref());
        args.set_opt("resume", self.resume.then_some("true"));
        args.set_opt("num_gpus", self.num_gpus.as_deref());
        args.set_opt("num_cpus", self.num_cpus.as_deref());
        args.set_opt("hosts", self.hosts.as_deref());
        args.set_opt("current_host", self.current_host.as_deref());
        args
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> ferrule_training::TrainingResult<EntryPoint> {
        EntryPoint::resolve(
            self.to_arguments(),
            EnvironmentSource::from_process(),
            self.config.as_deref(),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Model directory containing numbered versions
    #[arg(long, alias = "model_dir", env = "SM_MODEL_DIR", default_value = "model")]
    pub model_dir: String,

    /// Request file (`{"instances": [...]}`) or a labeled .jsonl/.csv channel
    #[arg(long)]
    pub input: String,

    /// Pretty-print the response
    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_training::{declarations, ExecutionContext, ParameterSource};

    #[test]
    fn test_unset_flags_are_not_arguments() {
        let args = TrainArgs { train: Some("./data/train".to_string()), ..Default::default() };
        assert_eq!(args.to_arguments().len(), 1);
    }

    #[test]
    fn test_argument_names_match_declarations() {
        let args = TrainArgs {
            train: Some("t".into()),
            validation: Some("v".into()),
            eval: Some("e".into()),
            model_dir: Some("m".into()),
            checkpoint_dir: Some("c".into()),
            output_data_dir: Some("o".into()),
            epochs: Some("1".into()),
            learning_rate: Some("0.1".into()),
            batch_size: Some("2".into()),
            optimizer: Some("sgd".into()),
            momentum: Some("0.5".into()),
            weight_decay: Some("0".into()),
            seed: Some("1".into()),
            resume: true,
            num_gpus: Some("0".into()),
            num_cpus: Some("2".into()),
            hosts: Some("a".into()),
            current_host: Some("a".into()),
            config: None,
        };
        let source = args.to_arguments();
        for spec in declarations(ExecutionContext::Local) {
            assert!(source.lookup(&spec).is_some(), "no flag for {}", spec.name);
        }
    }
}
