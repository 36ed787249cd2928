pub mod mse;
pub mod cross_entropy;
pub mod loss_type;

pub use mse::MseLoss;
pub use cross_entropy::CrossEntropyLoss;
pub use loss_type::LossType;

use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;

/// Scalar loss of a batch and its gradient with respect to the logits.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f64,
    pub grad: Matrix,
}

/// Loss between per-voxel logits and per-voxel class indices.
pub trait LossFunction {
    /// Loss value and gradient; used on training batches.
    fn forward(&self, logits: &Matrix, targets: &[usize]) -> Result<LossOutput>;

    /// Loss value only; used on validation batches where no gradient is needed.
    fn value(&self, logits: &Matrix, targets: &[usize]) -> Result<f64> {
        self.forward(logits, targets).map(|out| out.value)
    }
}

impl LossType {
    /// Instantiates the loss this variant names.
    pub fn build(self) -> Box<dyn LossFunction> {
        match self {
            LossType::CrossEntropy => Box::new(CrossEntropyLoss),
            LossType::Mse => Box::new(MseLoss),
        }
    }
}

/// Checks that there is exactly one in-range class index per logit row.
pub(crate) fn check_targets(logits: &Matrix, targets: &[usize]) -> Result<()> {
    if logits.rows() == 0 {
        return Err(TrainError::shape("loss over an empty batch"));
    }
    if logits.rows() != targets.len() {
        return Err(TrainError::shape(format!(
            "{} prediction rows but {} targets",
            logits.rows(),
            targets.len()
        )));
    }
    if let Some(&bad) = targets.iter().find(|&&t| t >= logits.cols()) {
        return Err(TrainError::shape(format!(
            "target class {bad} out of range for {} classes",
            logits.cols()
        )));
    }
    Ok(())
}
