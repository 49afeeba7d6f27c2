//! Training progress events.
//!
//! Sinks receive typed events. `StdoutProgressSink` additionally renders each
//! epoch as a fixed-format text line that external tuners scrape with the
//! regular expressions from [`metric_definitions`]; the key names and the
//! 4-decimal formatting must not change.

use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch index.
    pub epoch: u32,
    pub epochs: u32,
    pub loss: f64,
    pub acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId },
    Message { job_id: TrainingJobId, message: String },
    Epoch { job_id: TrainingJobId, metrics: EpochMetrics },
    Evaluated { job_id: TrainingJobId, loss: f64, acc: f64 },
    Finished { job_id: TrainingJobId },
}

pub trait ProgressSink {
    fn on_event(&self, event: ProgressEvent);
}

/// `Epoch 1/10 - loss: 0.6931 - acc: 0.5000 - val_loss: 0.6902 - val_acc: 0.5200`
#[must_use]
pub fn format_epoch_line(m: &EpochMetrics) -> String {
    format!(
        "Epoch {}/{} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
        m.epoch, m.epochs, m.loss, m.acc, m.val_loss, m.val_acc
    )
}

/// Name/regex pair in the shape tuning jobs expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDefinition {
    pub name: String,
    pub regex: String,
}

#[must_use]
pub fn metric_definitions() -> Vec<MetricDefinition> {
    ["loss", "acc", "val_loss", "val_acc"]
        .iter()
        .map(|key| MetricDefinition {
            name: (*key).to_string(),
            regex: format!(r"\b{key}: ([0-9\.]+)"),
        })
        .collect()
}

/// Writes epoch lines to a writer (stdout by default) and routes the rest
/// of the events to the tracing log.
pub struct StdoutProgressSink<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl Default for StdoutProgressSink {
    fn default() -> Self {
        Self { out: Mutex::new(std::io::stdout()) }
    }
}

impl<W: Write + Send> StdoutProgressSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressSink for StdoutProgressSink<W> {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => tracing::info!(%job_id, "training started"),
            ProgressEvent::Message { job_id, message } => tracing::info!(%job_id, "{message}"),
            ProgressEvent::Epoch { metrics, .. } => {
                if let Ok(mut out) = self.out.lock() {
                    let _ = writeln!(out, "{}", format_epoch_line(&metrics));
                    let _ = out.flush();
                }
            }
            ProgressEvent::Evaluated { job_id, loss, acc } => {
                tracing::info!(%job_id, eval_loss = loss, eval_acc = acc, "evaluation complete");
            }
            ProgressEvent::Finished { job_id } => tracing::info!(%job_id, "training finished"),
        }
    }
}

/// Keeps every event in memory; used by callers that want the structured
/// stream instead of scraping text.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn epochs(&self) -> Vec<EpochMetrics> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Epoch { metrics, .. } => Some(metrics),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn metrics() -> EpochMetrics {
        EpochMetrics {
            epoch: 3,
            epochs: 10,
            loss: 0.693_147,
            acc: 0.5,
            val_loss: 1.25,
            val_acc: 0.123_456,
        }
    }

    #[test]
    fn test_epoch_line_format_is_stable() {
        assert_eq!(
            format_epoch_line(&metrics()),
            "Epoch 3/10 - loss: 0.6931 - acc: 0.5000 - val_loss: 1.2500 - val_acc: 0.1235"
        );
    }

    #[test]
    fn test_metric_regexes_extract_each_value() {
        let line = format_epoch_line(&metrics());
        let extracted: Vec<(String, String)> = metric_definitions()
            .into_iter()
            .map(|def| {
                let re = Regex::new(&def.regex).unwrap();
                let caps = re.captures(&line).unwrap();
                (def.name, caps[1].to_string())
            })
            .collect();

        assert_eq!(extracted, vec![
            ("loss".to_string(), "0.6931".to_string()),
            ("acc".to_string(), "0.5000".to_string()),
            ("val_loss".to_string(), "1.2500".to_string()),
            ("val_acc".to_string(), "0.1235".to_string()),
        ]);
    }

    #[test]
    fn test_metric_definitions_serialize_in_tuner_shape() {
        let json = serde_json::to_value(metric_definitions()).unwrap();
        assert_eq!(json[0]["Name"], "loss");
        assert!(json[0]["Regex"].as_str().unwrap().contains("loss: "));
    }

    #[test]
    fn test_stdout_sink_writes_one_line_per_epoch() {
        let sink = StdoutProgressSink::with_writer(Vec::new());
        let job_id = TrainingJobId("job".to_string());
        sink.on_event(ProgressEvent::Started { job_id: job_id.clone() });
        sink.on_event(ProgressEvent::Epoch { job_id: job_id.clone(), metrics: metrics() });
        sink.on_event(ProgressEvent::Finished { job_id });

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("Epoch 3/10 - loss: "));
    }
}
