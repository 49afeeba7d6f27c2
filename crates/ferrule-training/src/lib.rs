//! Ferrule Training
//!
//! Adapts a training routine to its invocation context:
//! - Resolving run configuration from arguments, environment and defaults (`param`)
//! - Declaring the local / managed entry point surface (`entrypoint`)
//! - Loading data channels and training a classifier (`dataset`, `trainer`)
//! - Emitting per-epoch metrics for external tuners (`progress`)
//! - Writing versioned model artifacts and scoring with them (`artifacts`, `serving`)

pub mod artifacts;
pub mod dataset;
pub mod entrypoint;
pub mod error;
pub mod job;
pub mod layout;
pub mod model;
pub mod optimizer;
pub mod param;
pub mod progress;
pub mod serving;
pub mod store;
pub mod trainer;

pub use artifacts::{
    ArtifactKind, MetricsReport, SavedModel, TrainingArtifact, TrainingManifest, TrainingMetrics,
};
pub use dataset::{load_channel, Dataset, DatasetId, Example};
pub use entrypoint::{declarations, EntryPoint, ExecutionContext, RECOGNIZED_ENV_VARS};
pub use error::{MissingParameter, TrainingError, TrainingResult};
pub use job::{
    DataChannels, OptimizerKind, OutputPaths, TrainingHyperParams, TrainingJobId, TrainingJobSpec,
    TrainingResources,
};
pub use layout::{CheckpointLayout, ModelLayout};
pub use param::{
    resolve, ArgumentSource, EnvironmentSource, FileSource, Origin, ParamKind, ParamSpec,
    ParamValue, ParameterSource, RunConfiguration, SourceChain,
};
pub use progress::{
    format_epoch_line, metric_definitions, EpochMetrics, MetricDefinition, ProgressEvent,
    ProgressSink, RecordingProgressSink, StdoutProgressSink,
};
pub use serving::{accuracy, load_latest_model, predict, PredictRequest, PredictResponse};
pub use store::{DataStore, LocalStore};
pub use trainer::{LocalTrainer, Trainer};
