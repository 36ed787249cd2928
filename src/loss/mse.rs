use crate::error::Result;
use crate::loss::{check_targets, LossFunction, LossOutput};
use crate::math::matrix::Matrix;

/// Mean-squared error between logits and one-hot encoded targets.
pub struct MseLoss;

impl LossFunction for MseLoss {
    /// L = mean((predicted - onehot)²) over every element;
    /// ∂L/∂predicted = 2 (predicted - onehot) / (rows * cols).
    fn forward(&self, logits: &Matrix, targets: &[usize]) -> Result<LossOutput> {
        check_targets(logits, targets)?;
        let n = (logits.rows() * logits.cols()) as f64;

        let mut grad = logits.clone();
        for (r, &t) in targets.iter().enumerate() {
            grad.set(r, t, grad.get(r, t) - 1.0);
        }
        let value = grad.data().iter().map(|d| d * d).sum::<f64>() / n;
        let grad = grad.map(|d| 2.0 * d / n);

        Ok(LossOutput { value, grad })
    }
}
