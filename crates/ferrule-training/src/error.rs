use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// A required parameter that no source supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingParameter {
    pub name: String,
    pub flag: String,
    pub env: Option<String>,
}

impl std::fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env {
            Some(env) => write!(f, "{} (--{} or {})", self.name, self.flag, env),
            None => write!(f, "{} (--{})", self.name, self.flag),
        }
    }
}

fn join_missing(params: &[MissingParameter]) -> String {
    params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("missing required configuration: {}", join_missing(.0))]
    MissingConfiguration(Vec<MissingParameter>),

    #[error("invalid value {value:?} for {parameter}: expected {expected}")]
    InvalidConfigurationValue { parameter: String, value: String, expected: String },

    #[error("training failed: {0}")]
    TrainingFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl TrainingError {
    pub fn invalid(parameter: &str, value: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidConfigurationValue {
            parameter: parameter.to_string(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::TrainingFailure(message.into())
    }

    /// Fold I/O and decode errors raised while training into
    /// `TrainingFailure`, prefixed with `what`.
    #[must_use]
    pub fn during(self, what: &str) -> Self {
        match self {
            Self::Io(e) => Self::TrainingFailure(format!("{what}: {e}")),
            Self::Json(e) => Self::TrainingFailure(format!("{what}: {e}")),
            Self::Csv(e) => Self::TrainingFailure(format!("{what}: {e}")),
            Self::TrainingFailure(msg) => Self::TrainingFailure(format!("{what}: {msg}")),
            other => other,
        }
    }

    /// True for errors raised before training starts.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::MissingConfiguration(_) | Self::InvalidConfigurationValue { .. })
    }

    /// Names of every missing parameter, empty for other kinds.
    #[must_use]
    pub fn missing_parameters(&self) -> Vec<&str> {
        match self {
            Self::MissingConfiguration(params) => params.iter().map(|p| p.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_names_every_parameter() {
        let err = TrainingError::MissingConfiguration(vec![
            MissingParameter {
                name: "train".to_string(),
                flag: "train".to_string(),
                env: Some("SM_CHANNEL_TRAIN".to_string()),
            },
            MissingParameter { name: "eval".to_string(), flag: "eval".to_string(), env: None },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("train (--train or SM_CHANNEL_TRAIN)"));
        assert!(msg.contains("eval (--eval)"));
        assert_eq!(err.missing_parameters(), vec!["train", "eval"]);
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_during_wraps_io_as_training_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TrainingError::from(io).during("reading train channel");
        assert!(matches!(err, TrainingError::TrainingFailure(_)));
        assert_eq!(err.to_string(), "training failed: reading train channel: gone");

        let cfg = TrainingError::invalid("epochs", "x", "integer").during("ignored");
        assert!(cfg.is_configuration_error());
    }

    #[test]
    fn test_invalid_value_message() {
        let err = TrainingError::invalid("epochs", "ten", "integer");
        assert_eq!(err.to_string(), "invalid value \"ten\" for epochs: expected integer");
    }
}
