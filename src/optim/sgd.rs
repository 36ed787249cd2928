use crate::error::Result;
use crate::network::model::ParamMut;
use crate::optim::{check_grad_shapes, Optimizer};

/// Plain stochastic gradient descent with optional L2 weight decay.
pub struct Sgd {
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, weight_decay: 0.0 }
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    /// p ← p - lr · (g + wd · p)
    fn step(&mut self, params: &mut [ParamMut<'_>]) -> Result<()> {
        check_grad_shapes(params)?;
        for param in params.iter_mut() {
            let grad = param.grad.data();
            for (p, g) in param.value.data_mut().iter_mut().zip(grad) {
                *p -= self.learning_rate * (g + self.weight_decay * *p);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}
