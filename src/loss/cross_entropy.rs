use crate::error::Result;
use crate::loss::{check_targets, LossFunction, LossOutput};
use crate::math::matrix::Matrix;

/// Softmax cross-entropy over per-voxel class logits, averaged over voxels.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Row-wise softmax, shifted by the row maximum to keep exp() finite.
    pub fn softmax(logits: &Matrix) -> Matrix {
        let mut probs = logits.clone();
        let cols = logits.cols().max(1);
        for row in probs.data_mut().chunks_mut(cols) {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mut sum = 0.0;
            for x in row.iter_mut() {
                *x = (*x - max).exp();
                sum += *x;
            }
            row.iter_mut().for_each(|x| *x /= sum);
        }
        probs
    }
}

impl LossFunction for CrossEntropyLoss {
    /// L = mean over rows of -log softmax(z)[target].
    ///
    /// Softmax and cross-entropy composed give the gradient
    ///   ∂L/∂z = (softmax(z) - onehot(target)) / rows
    fn forward(&self, logits: &Matrix, targets: &[usize]) -> Result<LossOutput> {
        check_targets(logits, targets)?;
        let n = logits.rows() as f64;

        let mut grad = CrossEntropyLoss::softmax(logits);
        let mut total = 0.0;
        for (r, &t) in targets.iter().enumerate() {
            let row = logits.row(r);
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum_exp = max + row.iter().map(|z| (z - max).exp()).sum::<f64>().ln();
            total += log_sum_exp - row[t];

            grad.set(r, t, grad.get(r, t) - 1.0);
        }
        let grad = grad.map(|g| g / n);

        Ok(LossOutput { value: total / n, grad })
    }
}
