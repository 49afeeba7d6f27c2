use crate::job::{OptimizerKind, TrainingHyperParams};
use crate::model::{Gradients, SoftmaxClassifier};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const RHO: f64 = 0.9;
const EPSILON: f64 = 1e-7;

/// Per-parameter optimizer state over the flattened `weights ++ bias` vector.
#[derive(Debug, Clone)]
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f64,
    momentum: f64,
    weight_decay: f64,
    first: Vec<f64>,
    second: Vec<f64>,
    step: i32,
}

impl Optimizer {
    #[must_use]
    pub fn new(params: &TrainingHyperParams, num_params: usize) -> Self {
        Self {
            kind: params.optimizer,
            learning_rate: params.learning_rate,
            momentum: params.momentum,
            weight_decay: params.weight_decay,
            first: vec![0.0; num_params],
            second: vec![0.0; num_params],
            step: 0,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    /// Apply one update. Weight decay is an L2 term on weights only.
    pub fn apply(&mut self, model: &mut SoftmaxClassifier, grads: &Gradients) {
        self.step = self.step.saturating_add(1);
        let n_weights = model.weights.len();
        let params = model.weights.iter_mut().chain(model.bias.iter_mut());
        let raw = grads.weights.iter().chain(&grads.bias);

        let bias1 = 1.0 - BETA1.powi(self.step);
        let bias2 = 1.0 - BETA2.powi(self.step);

        for (i, (p, g)) in params.zip(raw).enumerate() {
            let g = if i < n_weights { g + self.weight_decay * *p } else { *g };
            match self.kind {
                OptimizerKind::Sgd => {
                    self.first[i] = self.momentum * self.first[i] - self.learning_rate * g;
                    *p += self.first[i];
                }
                OptimizerKind::Adam => {
                    self.first[i] = BETA1 * self.first[i] + (1.0 - BETA1) * g;
                    self.second[i] = BETA2 * self.second[i] + (1.0 - BETA2) * g * g;
                    let m_hat = self.first[i] / bias1;
                    let v_hat = self.second[i] / bias2;
                    *p -= self.learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
                }
                OptimizerKind::Rmsprop => {
                    self.second[i] = RHO * self.second[i] + (1.0 - RHO) * g * g;
                    *p -= self.learning_rate * g / (self.second[i].sqrt() + EPSILON);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Example;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fit(kind: OptimizerKind) -> (f64, f64) {
        let data = [
            Example { features: vec![2.0, 0.1], label: 0 },
            Example { features: vec![0.1, 2.0], label: 1 },
            Example { features: vec![1.5, 0.3], label: 0 },
            Example { features: vec![0.2, 1.7], label: 1 },
        ];
        let batch: Vec<&Example> = data.iter().collect();
        let mut model = SoftmaxClassifier::new(2, 2, &mut StdRng::seed_from_u64(1)).unwrap();
        let params =
            TrainingHyperParams { optimizer: kind, learning_rate: 0.05, ..Default::default() };
        let mut opt = Optimizer::new(&params, model.weights.len() + model.bias.len());

        let start = model.evaluate(&data).unwrap().loss;
        for _ in 0..50 {
            let (_, grads) = model.loss_and_gradient(&batch).unwrap();
            opt.apply(&mut model, &grads);
        }
        (start, model.evaluate(&data).unwrap().loss)
    }

    #[test]
    fn test_every_optimizer_reduces_loss() {
        for kind in [OptimizerKind::Sgd, OptimizerKind::Adam, OptimizerKind::Rmsprop] {
            let (start, end) = fit(kind);
            assert!(end < start, "{kind}: {end} !< {start}");
        }
    }
}
