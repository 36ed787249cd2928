use std::collections::HashMap;

use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;
use crate::network::model::ParamMut;
use crate::optim::{check_grad_shapes, Optimizer};

/// Adam with L2 weight decay folded into the gradient (not decoupled).
///
/// Moment buffers are keyed by parameter name and created lazily on the
/// first step that sees a parameter.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    steps: i32,
    moments: HashMap<String, (Matrix, Matrix)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            steps: 0,
            moments: HashMap::new(),
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Adam {
        self.weight_decay = weight_decay;
        self
    }

    pub fn steps(&self) -> i32 {
        self.steps
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [ParamMut<'_>]) -> Result<()> {
        check_grad_shapes(params)?;
        for param in params.iter() {
            if let Some((m, _)) = self.moments.get(&param.name) {
                if m.shape() != param.value.shape() {
                    return Err(TrainError::shape(format!(
                        "`{}` is {:?} but its moments were built for {:?}",
                        param.name,
                        param.value.shape(),
                        m.shape()
                    )));
                }
            }
        }

        self.steps = self.steps.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.steps);
        let bias2 = 1.0 - self.beta2.powi(self.steps);

        for param in params.iter_mut() {
            let (rows, cols) = param.value.shape();
            let (m, v) = self
                .moments
                .entry(param.name.clone())
                .or_insert_with(|| (Matrix::zeros(rows, cols), Matrix::zeros(rows, cols)));

            let grads = param.grad.data();
            let values = param.value.data_mut();
            let ms = m.data_mut();
            let vs = v.data_mut();
            for i in 0..values.len() {
                let g = grads[i] + self.weight_decay * values[i];
                ms[i] = self.beta1 * ms[i] + (1.0 - self.beta1) * g;
                vs[i] = self.beta2 * vs[i] + (1.0 - self.beta2) * g * g;
                let m_hat = ms[i] / bias1;
                let v_hat = vs[i] / bias2;
                values[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}
