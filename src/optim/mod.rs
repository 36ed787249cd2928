pub mod sgd;
pub mod adam;

pub use sgd::Sgd;
pub use adam::Adam;

use serde::{Serialize, Deserialize};

use crate::error::{Result, TrainError};
use crate::network::model::ParamMut;

/// Gradient-based parameter update.
pub trait Optimizer {
    /// Applies one update to every parameter using its accumulated gradient.
    ///
    /// Fails with a shape error, before touching any value, when a
    /// gradient does not match its parameter.
    fn step(&mut self, params: &mut [ParamMut<'_>]) -> Result<()>;

    fn learning_rate(&self) -> f64;
}

/// Optimizer named by the run settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64, weight_decay: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate).with_weight_decay(weight_decay)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate).with_weight_decay(weight_decay)),
        }
    }
}

/// Every gradient must have the shape of the value it updates.
pub(crate) fn check_grad_shapes(params: &[ParamMut<'_>]) -> Result<()> {
    for param in params {
        if param.grad.shape() != param.value.shape() {
            return Err(TrainError::shape(format!(
                "gradient of `{}` is {:?} but the parameter is {:?}",
                param.name,
                param.grad.shape(),
                param.value.shape()
            )));
        }
    }
    Ok(())
}
