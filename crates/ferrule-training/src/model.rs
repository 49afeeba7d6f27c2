//! Linear softmax classifier.

use crate::dataset::{Example, MAX_CLASSES};
use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub num_features: usize,
    pub num_classes: usize,
    /// Row-major `num_classes x num_features`.
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

/// Gradients with the same layout as the model parameters.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

/// Mean loss and accuracy over a set of examples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchStats {
    pub loss: f64,
    pub accuracy: f64,
}

impl SoftmaxClassifier {
    /// Small random initialisation (Glorot-uniform bound).
    pub fn new(num_features: usize, num_classes: usize, rng: &mut StdRng) -> TrainingResult<Self> {
        if num_features == 0 || num_classes < 2 || num_classes > MAX_CLASSES as usize {
            return Err(TrainingError::failure(format!(
                "cannot build a classifier with {num_features} features and {num_classes} classes \
                 (need >= 1 feature, 2..={MAX_CLASSES} classes)"
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let limit = (6.0 / (num_features + num_classes) as f64).sqrt();
        let weights =
            (0..num_features * num_classes).map(|_| rng.gen_range(-limit..limit)).collect();
        Ok(Self { num_features, num_classes, weights, bias: vec![0.0; num_classes] })
    }

    fn check_width(&self, features: &[f64]) -> TrainingResult<()> {
        if features.len() != self.num_features {
            return Err(TrainingError::failure(format!(
                "input has {} features, model expects {}",
                features.len(),
                self.num_features
            )));
        }
        Ok(())
    }

    fn logits(&self, features: &[f64]) -> Vec<f64> {
        self.weights
            .chunks(self.num_features)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    /// Class probabilities for a single input.
    pub fn probabilities(&self, features: &[f64]) -> TrainingResult<Vec<f64>> {
        self.check_width(features)?;
        Ok(softmax(&self.logits(features)))
    }

    pub fn predict(&self, features: &[f64]) -> TrainingResult<usize> {
        Ok(argmax(&self.probabilities(features)?))
    }

    fn check_label(&self, label: u32) -> TrainingResult<usize> {
        let label = label as usize;
        if label >= self.num_classes {
            return Err(TrainingError::failure(format!(
                "label {label} out of range for {} classes",
                self.num_classes
            )));
        }
        Ok(label)
    }

    /// Mean cross-entropy loss, accuracy and gradients over `batch`.
    pub fn loss_and_gradient(&self, batch: &[&Example]) -> TrainingResult<(BatchStats, Gradients)> {
        let mut grads = Gradients {
            weights: vec![0.0; self.weights.len()],
            bias: vec![0.0; self.num_classes],
        };
        if batch.is_empty() {
            return Ok((BatchStats::default(), grads));
        }

        let mut loss = 0.0;
        let mut correct = 0usize;
        for ex in batch {
            self.check_width(&ex.features)?;
            let label = self.check_label(ex.label)?;
            let probs = softmax(&self.logits(&ex.features));

            loss -= probs[label].max(f64::MIN_POSITIVE).ln();
            if argmax(&probs) == label {
                correct += 1;
            }

            for (class, p) in probs.iter().enumerate() {
                let delta = p - if class == label { 1.0 } else { 0.0 };
                grads.bias[class] += delta;
                let start = class * self.num_features;
                let row = &mut grads.weights[start..start + self.num_features];
                for (g, x) in row.iter_mut().zip(&ex.features) {
                    *g += delta * x;
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let n = batch.len() as f64;
        grads.weights.iter_mut().chain(grads.bias.iter_mut()).for_each(|g| *g /= n);

        #[allow(clippy::cast_precision_loss)]
        let accuracy = correct as f64 / n;
        Ok((BatchStats { loss: loss / n, accuracy }, grads))
    }

    /// Loss and accuracy over a whole dataset without gradients.
    pub fn evaluate(&self, examples: &[Example]) -> TrainingResult<BatchStats> {
        if examples.is_empty() {
            return Ok(BatchStats::default());
        }
        let mut loss = 0.0;
        let mut correct = 0usize;
        for ex in examples {
            let label = self.check_label(ex.label)?;
            let probs = self.probabilities(&ex.features)?;
            loss -= probs[label].max(f64::MIN_POSITIVE).ln();
            if argmax(&probs) == label {
                correct += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = examples.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let accuracy = correct as f64 / n;
        Ok(BatchStats { loss: loss / n, accuracy })
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(&self.bias).all(|v| v.is_finite())
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if *v > bv { (i, *v) } else { (bi, bv) })
        .0
}
